pub mod protocol;

use crate::config::WorkerConfig;
use crate::error::{AppError, Result};
use crate::features::canonical_date;
use crate::notifier::{Notifier, FORECAST_READY};
use crate::worker::WorkerCommand;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Field holding each history entry's date
const DATE_FIELD: &str = "tanggal";

/// Whatever the inference worker returned between the result markers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ForecastResult(pub Value);

impl ForecastResult {
    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Runs the inference worker over a record history
pub struct ForecastGateway {
    worker: WorkerCommand,
    limit: Duration,
    notifier: Notifier,
}

impl ForecastGateway {
    pub fn new(worker: WorkerCommand, limit: Duration, notifier: Notifier) -> Self {
        Self {
            worker,
            limit,
            notifier,
        }
    }

    pub fn from_config(config: &WorkerConfig, notifier: Notifier) -> Self {
        let worker = WorkerCommand::python_script(&config.python, &config.forecast_script)
            .working_dir(config.working_dir.clone());
        Self::new(worker, config.forecast_timeout(), notifier)
    }

    /// Forecast from `history`, a non-empty JSON array of record objects.
    ///
    /// Each record's date is rewritten as `YYYY-MM-DD`; other fields are passed
    /// through as given. The worker's exit code is logged but does not decide
    /// the outcome: a well-formed result block is accepted either way.
    pub async fn invoke(&self, history: &Value) -> Result<ForecastResult> {
        let cleaned = normalize_history(history)?;
        let payload = serde_json::to_vec(&cleaned)?;

        info!(
            "Running forecast worker {} over {} record(s)",
            self.worker.display_name(),
            cleaned.len()
        );

        let output = self.worker.run(Some(payload), self.limit).await?;

        debug!("Forecast worker stdout:\n{}", output.stdout);
        if !output.stderr.is_empty() {
            debug!("Forecast worker stderr:\n{}", output.stderr);
        }

        let result = protocol::extract_result(&output.stdout)?;

        if !output.success() {
            warn!(
                "Forecast worker exited with {:?} but produced a result block, accepting it",
                output.exit_code
            );
        }

        self.notifier.emit(FORECAST_READY, &result);
        Ok(ForecastResult(result))
    }
}

fn normalize_history(history: &Value) -> Result<Vec<Value>> {
    let entries = history.as_array().ok_or_else(|| {
        AppError::InvalidInput("forecast history must be a JSON array".to_string())
    })?;

    if entries.is_empty() {
        return Err(AppError::InvalidInput(
            "forecast history must not be empty".to_string(),
        ));
    }

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let mut object = entry.as_object().cloned().ok_or_else(|| {
                AppError::InvalidInput(format!("history entry {} is not an object", index))
            })?;

            let date = object
                .get(DATE_FIELD)
                .and_then(canonical_date)
                .ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "history entry {} has a missing or invalid '{}'",
                        index, DATE_FIELD
                    ))
                })?;

            object.insert(
                DATE_FIELD.to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
            Ok(Value::Object(object))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_rewrites_dates_only() {
        let history = json!([
            { "tanggal": "2024-06-01T00:00:00.000Z", "ph": 7.9, "is_future": 0 },
            { "tanggal": "2024-06-02", "ph": null, "is_future": 1 }
        ]);

        let cleaned = normalize_history(&history).unwrap();
        assert_eq!(
            cleaned,
            vec![
                json!({ "tanggal": "2024-06-01", "ph": 7.9, "is_future": 0 }),
                json!({ "tanggal": "2024-06-02", "ph": null, "is_future": 1 }),
            ]
        );
    }

    #[test]
    fn test_normalize_rejects_non_array_and_empty() {
        assert!(matches!(
            normalize_history(&json!({ "tanggal": "2024-06-01" })),
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_history(&json!([])),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_bad_date() {
        let err = normalize_history(&json!([{ "tanggal": "soon" }])).unwrap_err();
        assert!(err.to_string().contains("tanggal"));
    }
}
