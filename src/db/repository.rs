use crate::db::models::{
    ForecastHistory, NewForecastHistory, NewSite, NewWaterQualityRecord, RecordFilter, Site,
    WaterQualityRecord,
};
use crate::error::{AppError, Result};
use chrono::{NaiveDate, NaiveTime};
use sqlx::PgPool;
use tracing::{debug, info};

const SITE_COLUMNS: &str =
    "id, name, substrate, depth, latitude, longitude, note, created_at, updated_at";

const RECORD_COLUMNS: &str =
    "id, site_id, recorded_at, ph, temperature, turbidity, salinity, created_at, updated_at";

const HISTORY_SELECT: &str = "SELECT h.id, h.site_id, s.name AS site_name, h.start_date, \
     h.end_date, h.day_count, h.wqi_data, h.parameter_data, h.created_at, h.updated_at \
     FROM forecast_history h LEFT JOIN sites s ON s.id = h.site_id";

pub struct Repository {
    pool: PgPool,
}

impl Repository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }

    // ---- sites ----

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        let sites = sqlx::query_as::<_, Site>(&format!(
            "SELECT {} FROM sites ORDER BY id",
            SITE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sites)
    }

    pub async fn get_site(&self, id: i32) -> Result<Option<Site>> {
        let site = sqlx::query_as::<_, Site>(&format!(
            "SELECT {} FROM sites WHERE id = $1",
            SITE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(site)
    }

    /// Fetch every site whose id is in `ids`, in a single query
    pub async fn get_sites_by_ids(&self, ids: &[i32]) -> Result<Vec<Site>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sites = sqlx::query_as::<_, Site>(&format!(
            "SELECT {} FROM sites WHERE id = ANY($1) ORDER BY id",
            SITE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(sites)
    }

    pub async fn create_site(&self, site: &NewSite) -> Result<Site> {
        let created = sqlx::query_as::<_, Site>(&format!(
            r#"
            INSERT INTO sites (name, substrate, depth, latitude, longitude, note)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            SITE_COLUMNS
        ))
        .bind(&site.name)
        .bind(site.substrate)
        .bind(site.depth)
        .bind(site.latitude)
        .bind(site.longitude)
        .bind(&site.note)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn update_site(&self, id: i32, site: &NewSite) -> Result<Option<Site>> {
        let updated = sqlx::query_as::<_, Site>(&format!(
            r#"
            UPDATE sites SET
                name = $2,
                substrate = $3,
                depth = $4,
                latitude = $5,
                longitude = $6,
                note = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SITE_COLUMNS
        ))
        .bind(id)
        .bind(&site.name)
        .bind(site.substrate)
        .bind(site.depth)
        .bind(site.latitude)
        .bind(site.longitude)
        .bind(&site.note)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    /// Returns whether a row was deleted
    pub async fn delete_site(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM sites WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- water quality records ----

    /// List records with optional site filter, limit and date ordering
    ///
    /// Without an explicit sort the rows come back in insertion order.
    pub async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<WaterQualityRecord>> {
        let mut query_builder =
            sqlx::QueryBuilder::new(format!("SELECT {} FROM water_quality_records", RECORD_COLUMNS));

        if let Some(site_id) = filter.site_id {
            query_builder.push(" WHERE site_id = ").push_bind(site_id);
        }

        match filter.sort {
            Some(order) => {
                query_builder.push(format!(" ORDER BY recorded_at {}, id", order.as_sql()));
            }
            None => {
                query_builder.push(" ORDER BY id");
            }
        }

        if let Some(limit) = filter.limit {
            query_builder.push(" LIMIT ").push_bind(limit);
        }

        let records = query_builder
            .build_query_as::<WaterQualityRecord>()
            .fetch_all(&self.pool)
            .await?;

        debug!("Listed {} water quality records", records.len());
        Ok(records)
    }

    /// Records whose calendar date (UTC) falls within `start..=end`, oldest first
    pub async fn list_records_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        site_id: Option<i32>,
    ) -> Result<Vec<WaterQualityRecord>> {
        if start > end {
            return Err(AppError::InvalidInput(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }

        let lower = start.and_time(NaiveTime::MIN).and_utc();
        let upper = end
            .succ_opt()
            .ok_or_else(|| AppError::InvalidInput(format!("end date {} is out of range", end)))?
            .and_time(NaiveTime::MIN)
            .and_utc();

        let mut query_builder = sqlx::QueryBuilder::new(format!(
            "SELECT {} FROM water_quality_records WHERE recorded_at >= ",
            RECORD_COLUMNS
        ));
        query_builder
            .push_bind(lower)
            .push(" AND recorded_at < ")
            .push_bind(upper);

        if let Some(site_id) = site_id {
            query_builder.push(" AND site_id = ").push_bind(site_id);
        }

        query_builder.push(" ORDER BY recorded_at ASC, id");

        let records = query_builder
            .build_query_as::<WaterQualityRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Every record ordered by site then time, the order the dataset assembler expects
    pub async fn list_records_for_dataset(&self) -> Result<Vec<WaterQualityRecord>> {
        let records = sqlx::query_as::<_, WaterQualityRecord>(&format!(
            "SELECT {} FROM water_quality_records ORDER BY site_id ASC, recorded_at ASC, id ASC",
            RECORD_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_record(&self, id: i64) -> Result<Option<WaterQualityRecord>> {
        let record = sqlx::query_as::<_, WaterQualityRecord>(&format!(
            "SELECT {} FROM water_quality_records WHERE id = $1",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create_record(&self, record: &NewWaterQualityRecord) -> Result<WaterQualityRecord> {
        let created = sqlx::query_as::<_, WaterQualityRecord>(&format!(
            r#"
            INSERT INTO water_quality_records
                (site_id, recorded_at, ph, temperature, turbidity, salinity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(record.site_id)
        .bind(record.recorded_at)
        .bind(record.ph)
        .bind(record.temperature)
        .bind(record.turbidity)
        .bind(record.salinity)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    pub async fn update_record(
        &self,
        id: i64,
        record: &NewWaterQualityRecord,
    ) -> Result<Option<WaterQualityRecord>> {
        let updated = sqlx::query_as::<_, WaterQualityRecord>(&format!(
            r#"
            UPDATE water_quality_records SET
                site_id = $2,
                recorded_at = $3,
                ph = $4,
                temperature = $5,
                turbidity = $6,
                salinity = $7,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .bind(record.site_id)
        .bind(record.recorded_at)
        .bind(record.ph)
        .bind(record.temperature)
        .bind(record.turbidity)
        .bind(record.salinity)
        .fetch_optional(&self.pool)
        .await?;

        Ok(updated)
    }

    pub async fn delete_record(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM water_quality_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- forecast history ----

    /// Newest first, optionally restricted to one site
    pub async fn list_history(&self, site_id: Option<i32>) -> Result<Vec<ForecastHistory>> {
        let mut query_builder = sqlx::QueryBuilder::new(HISTORY_SELECT);

        if let Some(site_id) = site_id {
            query_builder.push(" WHERE h.site_id = ").push_bind(site_id);
        }

        query_builder.push(" ORDER BY h.created_at DESC, h.id DESC");

        let history = query_builder
            .build_query_as::<ForecastHistory>()
            .fetch_all(&self.pool)
            .await?;

        Ok(history)
    }

    pub async fn get_history(&self, id: i32) -> Result<Option<ForecastHistory>> {
        let entry = sqlx::query_as::<_, ForecastHistory>(&format!("{} WHERE h.id = $1", HISTORY_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    pub async fn create_history(&self, entry: &NewForecastHistory) -> Result<ForecastHistory> {
        let id = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO forecast_history
                (site_id, start_date, end_date, day_count, wqi_data, parameter_data)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(entry.site_id)
        .bind(entry.start_date)
        .bind(entry.end_date)
        .bind(entry.day_count)
        .bind(&entry.wqi_data)
        .bind(&entry.parameter_data)
        .fetch_one(&self.pool)
        .await?;

        self.get_history(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("forecast history {}", id)))
    }

    pub async fn update_history(
        &self,
        id: i32,
        entry: &NewForecastHistory,
    ) -> Result<Option<ForecastHistory>> {
        let result = sqlx::query(
            r#"
            UPDATE forecast_history SET
                site_id = $2,
                start_date = $3,
                end_date = $4,
                day_count = $5,
                wqi_data = $6,
                parameter_data = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(entry.site_id)
        .bind(entry.start_date)
        .bind(entry.end_date)
        .bind(entry.day_count)
        .bind(&entry.wqi_data)
        .bind(&entry.parameter_data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_history(id).await
    }

    pub async fn delete_history(&self, id: i32) -> Result<bool> {
        let result = sqlx::query("DELETE FROM forecast_history WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
