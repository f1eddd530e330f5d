use crate::db::models::{
    ForecastHistory, NewForecastHistory, NewWaterQualityRecord, WaterQualityRecord,
};
use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::notifier::{
    Notifier, HISTORY_CREATED, HISTORY_UPDATED, SENSOR_DATA_CREATED, SENSOR_DATA_UPDATED,
};
use std::sync::Arc;
use tracing::info;

/// Writes that live clients need to hear about
pub struct MonitoringService {
    repository: Arc<Repository>,
    notifier: Notifier,
}

impl MonitoringService {
    pub fn new(repository: Arc<Repository>, notifier: Notifier) -> Self {
        Self {
            repository,
            notifier,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub async fn create_record(&self, record: &NewWaterQualityRecord) -> Result<WaterQualityRecord> {
        let created = self.repository.create_record(record).await?;
        info!("Stored water quality record {} for site {}", created.id, created.site_id);
        self.notifier.emit(SENSOR_DATA_CREATED, &created);
        Ok(created)
    }

    pub async fn update_record(
        &self,
        id: i64,
        record: &NewWaterQualityRecord,
    ) -> Result<WaterQualityRecord> {
        let updated = self
            .repository
            .update_record(id, record)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("water quality record {}", id)))?;
        self.notifier.emit(SENSOR_DATA_UPDATED, &updated);
        Ok(updated)
    }

    pub async fn create_history(&self, entry: &NewForecastHistory) -> Result<ForecastHistory> {
        let created = self.repository.create_history(entry).await?;
        info!(
            "Stored forecast history {} ({}..={})",
            created.id, created.start_date, created.end_date
        );
        self.notifier.emit(HISTORY_CREATED, &created);
        Ok(created)
    }

    pub async fn update_history(
        &self,
        id: i32,
        entry: &NewForecastHistory,
    ) -> Result<ForecastHistory> {
        let updated = self
            .repository
            .update_history(id, entry)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("forecast history {}", id)))?;
        self.notifier.emit(HISTORY_UPDATED, &updated);
        Ok(updated)
    }
}
