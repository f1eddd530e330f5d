use crate::error::{AppError, Result};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Daily precipitation (mm) for one site's date span.
///
/// A date without an entry means no rain was reported, not that the amount is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RainfallMap {
    daily: BTreeMap<NaiveDate, f64>,
}

impl RainfallMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, amount: f64) {
        self.daily.insert(date, amount);
    }

    /// Precipitation for `date`, 0.0 when absent
    pub fn amount_on(&self, date: NaiveDate) -> f64 {
        self.daily.get(&date).copied().unwrap_or(0.0)
    }

    pub fn len(&self) -> usize {
        self.daily.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty()
    }
}

impl FromIterator<(NaiveDate, f64)> for RainfallMap {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, f64)>>(iter: I) -> Self {
        Self {
            daily: iter.into_iter().collect(),
        }
    }
}

/// Anything that can report daily rainfall for a coordinate and closed date range
pub trait RainfallSource {
    fn fetch_rainfall(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> impl Future<Output = Result<RainfallMap>> + Send;
}

#[derive(Debug, Deserialize)]
struct DailyResponse {
    daily: Option<DailySeries>,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    precipitation_sum: Vec<Option<f64>>,
}

/// HTTP client for an Open-Meteo compatible daily precipitation endpoint
pub struct RainfallClient {
    client: Client,
    base_url: String,
    timezone: String,
}

impl RainfallClient {
    pub fn new(base_url: &str, timezone: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("wqi-forecast/0.1.0")
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timezone: timezone.to_string(),
        })
    }

    pub fn from_config(config: &crate::config::RainfallConfig) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.timezone,
            Duration::from_secs(config.timeout_seconds),
        )
    }

    fn request_url(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<url::Url> {
        let start = start_date.format("%Y-%m-%d").to_string();
        let end = end_date.format("%Y-%m-%d").to_string();

        url::Url::parse_with_params(
            &self.base_url,
            &[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("start_date", start),
                ("end_date", end),
                ("daily", "precipitation_sum".to_string()),
                ("timezone", self.timezone.clone()),
            ],
        )
        .map_err(|e| AppError::Config(format!("Invalid rainfall base_url '{}': {}", self.base_url, e)))
    }

    async fn fetch_impl(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<RainfallMap> {
        if start_date > end_date {
            return Err(AppError::InvalidInput(format!(
                "rainfall start date {} is after end date {}",
                start_date, end_date
            )));
        }

        let url = self.request_url(latitude, longitude, start_date, end_date)?;
        debug!("Fetching rainfall from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::UpstreamFetch {
                message: e.to_string(),
                body: None,
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| AppError::UpstreamFetch {
            message: format!("failed to read response body: {}", e),
            body: None,
        })?;

        if !status.is_success() {
            return Err(AppError::UpstreamFetch {
                message: format!("rainfall source returned {}", status),
                body: Some(body),
            });
        }

        let parsed: DailyResponse =
            serde_json::from_str(&body).map_err(|e| AppError::UpstreamFetch {
                message: format!("malformed rainfall response: {}", e),
                body: Some(body.clone()),
            })?;

        let rainfall = build_rainfall_map(parsed);
        info!(
            "Fetched rainfall for ({}, {}) {}..={}: {} day(s)",
            latitude,
            longitude,
            start_date,
            end_date,
            rainfall.len()
        );
        Ok(rainfall)
    }
}

impl RainfallSource for RainfallClient {
    async fn fetch_rainfall(
        &self,
        latitude: f64,
        longitude: f64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<RainfallMap> {
        self.fetch_impl(latitude, longitude, start_date, end_date)
            .await
    }
}

/// Pair dates with amounts positionally; extra entries on either side are dropped.
fn build_rainfall_map(response: DailyResponse) -> RainfallMap {
    let Some(series) = response.daily else {
        warn!("Rainfall response has no daily block, treating every day as dry");
        return RainfallMap::new();
    };

    if series.time.len() != series.precipitation_sum.len() {
        warn!(
            "Rainfall response has {} dates but {} amounts, using the common prefix",
            series.time.len(),
            series.precipitation_sum.len()
        );
    }

    series
        .time
        .iter()
        .zip(series.precipitation_sum)
        .filter_map(|(day, amount)| {
            let date = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
            Some((date, amount?))
        })
        .collect()
}
