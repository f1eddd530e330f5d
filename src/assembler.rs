use crate::db::models::{Site, Substrate, WaterQualityRecord};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::features::{month_label, ph_fluctuation, Season};
use crate::rainfall::RainfallSource;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// One row of the training/inference dataset, keyed the way the forecasting model expects
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    #[serde(rename = "tanggal", serialize_with = "serialize_date")]
    pub date: NaiveDate,
    #[serde(rename = "kedalaman")]
    pub depth: f64,
    #[serde(rename = "substrat")]
    pub substrate: Substrate,
    pub ph: Option<f64>,
    #[serde(rename = "suhu")]
    pub temperature: Option<f64>,
    #[serde(rename = "kekeruhan")]
    pub turbidity: Option<f64>,
    #[serde(rename = "salinitas")]
    pub salinity: Option<f64>,
    #[serde(rename = "curah_hujan")]
    pub rainfall: f64,
    #[serde(rename = "bulan")]
    pub month: String,
    #[serde(rename = "musim")]
    pub season: Season,
    #[serde(rename = "fluktuasi_ph")]
    pub ph_fluctuation: f64,
}

fn serialize_date<S>(date: &NaiveDate, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&date.format("%Y-%m-%d"))
}

/// Builds the flat feature dataset from raw readings and site metadata
pub struct DatasetAssembler<R> {
    rainfall: R,
}

impl<R: RainfallSource> DatasetAssembler<R> {
    pub fn new(rainfall: R) -> Self {
        Self { rainfall }
    }

    /// Turn every reading into a [`FeatureRecord`].
    ///
    /// Output is grouped by site in order of each site's first appearance in
    /// `records`, and chronological within a site. Rainfall is fetched once per
    /// site for that site's full date span. Any failure aborts the whole
    /// dataset; partial output is never returned.
    pub async fn assemble(
        &self,
        records: &[WaterQualityRecord],
        sites: &[Site],
    ) -> Result<Vec<FeatureRecord>> {
        if records.is_empty() {
            return Err(AppError::EmptyInput);
        }

        let sites_by_id: HashMap<i32, &Site> = sites.iter().map(|site| (site.id, site)).collect();
        let groups = group_by_site(records);

        let mut dataset = Vec::with_capacity(records.len());

        for (site_id, group) in groups {
            let site = sites_by_id
                .get(&site_id)
                .copied()
                .ok_or(AppError::UnknownSite(site_id))?;

            // Groups are never empty and are sorted by time
            let start_date = group[0].date();
            let end_date = group[group.len() - 1].date();

            debug!(
                "Assembling {} record(s) for site {} ({}..={})",
                group.len(),
                site.id,
                start_date,
                end_date
            );

            let rainfall = self
                .rainfall
                .fetch_rainfall(site.latitude, site.longitude, start_date, end_date)
                .await?;

            let readings: Vec<Option<f64>> = group.iter().map(|record| record.ph).collect();

            for (index, record) in group.iter().enumerate() {
                let date = record.date();
                dataset.push(FeatureRecord {
                    date,
                    depth: site.depth,
                    substrate: site.substrate,
                    ph: record.ph,
                    temperature: record.temperature,
                    turbidity: record.turbidity,
                    salinity: record.salinity,
                    rainfall: rainfall.amount_on(date),
                    month: month_label(date),
                    season: Season::from_month(date.month()),
                    ph_fluctuation: ph_fluctuation(&readings, index),
                });
            }
        }

        info!("Assembled dataset with {} feature record(s)", dataset.len());
        Ok(dataset)
    }

    /// Read every stored reading and the sites it references, then [`assemble`](Self::assemble).
    pub async fn assemble_from_repository(
        &self,
        repository: &Repository,
    ) -> Result<Vec<FeatureRecord>> {
        let records = repository.list_records_for_dataset().await?;
        if records.is_empty() {
            return Err(AppError::EmptyInput);
        }

        let site_ids: Vec<i32> = group_by_site(&records)
            .into_iter()
            .map(|(site_id, _)| site_id)
            .collect();
        let sites = repository.get_sites_by_ids(&site_ids).await?;

        self.assemble(&records, &sites).await
    }
}

/// Group readings by site in first-occurrence order, each group sorted by time (stable).
fn group_by_site(records: &[WaterQualityRecord]) -> Vec<(i32, Vec<&WaterQualityRecord>)> {
    let mut groups: Vec<(i32, Vec<&WaterQualityRecord>)> = Vec::new();
    let mut positions: HashMap<i32, usize> = HashMap::new();

    for record in records {
        match positions.get(&record.site_id) {
            Some(&position) => groups[position].1.push(record),
            None => {
                positions.insert(record.site_id, groups.len());
                groups.push((record.site_id, vec![record]));
            }
        }
    }

    for (_, group) in &mut groups {
        group.sort_by_key(|record| record.recorded_at);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rainfall::RainfallMap;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Mutex;

    /// Serves canned rainfall per latitude and records every request
    #[derive(Default)]
    struct StubRainfall {
        by_latitude: Vec<(f64, Vec<(NaiveDate, f64)>)>,
        calls: Mutex<Vec<(f64, NaiveDate, NaiveDate)>>,
        fail: bool,
    }

    impl RainfallSource for StubRainfall {
        async fn fetch_rainfall(
            &self,
            latitude: f64,
            _longitude: f64,
            start_date: NaiveDate,
            end_date: NaiveDate,
        ) -> Result<RainfallMap> {
            self.calls
                .lock()
                .unwrap()
                .push((latitude, start_date, end_date));

            if self.fail {
                return Err(AppError::UpstreamFetch {
                    message: "connection reset".to_string(),
                    body: None,
                });
            }

            Ok(self
                .by_latitude
                .iter()
                .find(|(lat, _)| *lat == latitude)
                .map(|(_, days)| days.iter().copied().collect())
                .unwrap_or_default())
        }
    }

    fn at(month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, month, day, 6, 0, 0).unwrap()
    }

    fn day(month: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, month, d).unwrap()
    }

    fn site(id: i32, latitude: f64, substrate: Substrate, depth: f64) -> Site {
        Site {
            id,
            name: format!("Tambak {}", id),
            substrate,
            depth,
            latitude,
            longitude: 112.7,
            note: None,
            created_at: at(1, 1),
            updated_at: at(1, 1),
        }
    }

    fn record(id: i64, site_id: i32, recorded_at: DateTime<Utc>, ph: Option<f64>) -> WaterQualityRecord {
        WaterQualityRecord {
            id,
            site_id,
            recorded_at,
            ph,
            temperature: Some(29.0),
            turbidity: Some(12.0),
            salinity: Some(30.0),
            created_at: recorded_at,
            updated_at: recorded_at,
        }
    }

    #[tokio::test]
    async fn test_empty_records_rejected() {
        let assembler = DatasetAssembler::new(StubRainfall::default());
        let result = assembler.assemble(&[], &[site(1, -7.0, Substrate::Sand, 1.5)]).await;
        assert!(matches!(result, Err(AppError::EmptyInput)));
    }

    #[tokio::test]
    async fn test_unknown_site_rejected() {
        let assembler = DatasetAssembler::new(StubRainfall::default());
        let records = vec![record(1, 9, at(3, 1), Some(7.8))];
        let result = assembler.assemble(&records, &[site(1, -7.0, Substrate::Sand, 1.5)]).await;
        assert!(matches!(result, Err(AppError::UnknownSite(9))));
    }

    #[tokio::test]
    async fn test_two_sites_grouped_and_enriched() {
        let rainfall = StubRainfall {
            by_latitude: vec![
                (-7.0, vec![(day(1, 10), 5.5), (day(1, 12), 1.0)]),
                (-8.0, vec![(day(6, 1), 0.4), (day(6, 2), 2.0)]),
            ],
            ..Default::default()
        };
        let assembler = DatasetAssembler::new(rainfall);

        let sites = vec![
            site(1, -7.0, Substrate::FineMud, 1.2),
            site(2, -8.0, Substrate::Mixed, 2.5),
        ];
        let records = vec![
            record(1, 1, at(1, 10), Some(7.5)),
            record(2, 1, at(1, 11), Some(8.0)),
            record(3, 1, at(1, 12), Some(7.75)),
            record(4, 2, at(6, 1), Some(8.1)),
            record(5, 2, at(6, 2), None),
            record(6, 2, at(6, 3), Some(7.9)),
        ];

        let dataset = assembler.assemble(&records, &sites).await.unwrap();
        assert_eq!(dataset.len(), 6);

        let fluctuations: Vec<f64> = dataset.iter().map(|f| f.ph_fluctuation).collect();
        let expected = [0.0, 0.5, 0.25, 0.0, 8.1, 7.9];
        for (actual, expected) in fluctuations.iter().zip(expected) {
            assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
        }

        let rain: Vec<f64> = dataset.iter().map(|f| f.rainfall).collect();
        assert_eq!(rain, vec![5.5, 0.0, 1.0, 0.4, 2.0, 0.0]);

        assert!(dataset[..3].iter().all(|f| f.substrate == Substrate::FineMud && f.depth == 1.2));
        assert!(dataset[3..].iter().all(|f| f.substrate == Substrate::Mixed && f.depth == 2.5));
        assert_eq!(dataset[0].month, "01");
        assert_eq!(dataset[0].season, Season::Rain);
        assert_eq!(dataset[4].season, Season::Dry);

        let calls = assembler.rainfall.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![(-7.0, day(1, 10), day(1, 12)), (-8.0, day(6, 1), day(6, 3))]
        );
    }

    #[tokio::test]
    async fn test_groups_follow_first_occurrence_and_sort_by_time() {
        let assembler = DatasetAssembler::new(StubRainfall::default());
        let sites = vec![
            site(1, -7.0, Substrate::Sand, 1.0),
            site(2, -8.0, Substrate::Sand, 1.0),
        ];
        let records = vec![
            record(1, 2, at(2, 5), Some(7.0)),
            record(2, 1, at(2, 3), Some(7.0)),
            record(3, 2, at(2, 1), Some(8.0)),
        ];

        let dataset = assembler.assemble(&records, &sites).await.unwrap();
        let dates: Vec<NaiveDate> = dataset.iter().map(|f| f.date).collect();
        assert_eq!(dates, vec![day(2, 1), day(2, 5), day(2, 3)]);
        assert_eq!(dataset[1].ph_fluctuation, 1.0);
        assert_eq!(dataset[2].ph_fluctuation, 0.0);
    }

    #[tokio::test]
    async fn test_rainfall_failure_aborts_dataset() {
        let assembler = DatasetAssembler::new(StubRainfall {
            fail: true,
            ..Default::default()
        });
        let records = vec![record(1, 1, at(3, 1), Some(7.8))];
        let result = assembler
            .assemble(&records, &[site(1, -7.0, Substrate::Sand, 1.5)])
            .await;
        assert!(matches!(result, Err(AppError::UpstreamFetch { .. })));
    }

    #[test]
    fn test_feature_record_wire_format() {
        let feature = FeatureRecord {
            date: day(4, 9),
            depth: 1.5,
            substrate: Substrate::GravelAndRock,
            ph: Some(7.9),
            temperature: Some(28.5),
            turbidity: None,
            salinity: Some(31.0),
            rainfall: 0.0,
            month: "04".to_string(),
            season: Season::FirstTransition,
            ph_fluctuation: 0.0,
        };

        let value = serde_json::to_value(&feature).unwrap();
        assert_eq!(value["tanggal"], "2024-04-09");
        assert_eq!(value["substrat"], "Kerikil dan Batu");
        assert_eq!(value["musim"], "Peralihan 1");
        assert_eq!(value["bulan"], "04");
        assert_eq!(value["curah_hujan"], 0.0);
        assert!(value["kekeruhan"].is_null());
        assert_eq!(value.as_object().unwrap().len(), 11);
    }
}
