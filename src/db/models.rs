use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Seabed substrate of a site, stored as the `substrate` Postgres enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "substrate")]
pub enum Substrate {
    #[serde(rename = "Pasir")]
    #[sqlx(rename = "Pasir")]
    Sand,
    #[serde(rename = "Lumpur Halus")]
    #[sqlx(rename = "Lumpur Halus")]
    FineMud,
    #[serde(rename = "Kerikil dan Batu")]
    #[sqlx(rename = "Kerikil dan Batu")]
    GravelAndRock,
    #[serde(rename = "Campuran")]
    #[sqlx(rename = "Campuran")]
    Mixed,
}

impl Substrate {
    /// Label used by the forecasting model and the database
    pub fn label(&self) -> &'static str {
        match self {
            Substrate::Sand => "Pasir",
            Substrate::FineMud => "Lumpur Halus",
            Substrate::GravelAndRock => "Kerikil dan Batu",
            Substrate::Mixed => "Campuran",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Site {
    pub id: i32,
    pub name: String,
    pub substrate: Substrate,
    pub depth: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSite {
    pub name: String,
    pub substrate: Substrate,
    pub depth: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub note: Option<String>,
}

/// One sensor reading for a site. Measurements may be missing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WaterQualityRecord {
    pub id: i64,
    pub site_id: i32,
    pub recorded_at: DateTime<Utc>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub turbidity: Option<f64>,
    pub salinity: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WaterQualityRecord {
    /// UTC calendar date of the reading
    pub fn date(&self) -> NaiveDate {
        self.recorded_at.date_naive()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWaterQualityRecord {
    pub site_id: i32,
    pub recorded_at: DateTime<Utc>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub turbidity: Option<f64>,
    pub salinity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Optional filters for listing records
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordFilter {
    pub site_id: Option<i32>,
    pub limit: Option<i64>,
    pub sort: Option<SortOrder>,
}

/// A stored forecast run, listed together with the name of its site
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ForecastHistory {
    pub id: i32,
    pub site_id: Option<i32>,
    pub site_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: i32,
    pub wqi_data: serde_json::Value,
    pub parameter_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewForecastHistory {
    pub site_id: Option<i32>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_count: i32,
    pub wqi_data: serde_json::Value,
    pub parameter_data: Option<serde_json::Value>,
}
