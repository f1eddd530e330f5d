use crate::assembler::FeatureRecord;
use crate::config::{TrainingConfig, WorkerConfig};
use crate::error::{AppError, Result};
use crate::notifier::{Notifier, TRAINING_COMPLETED};
use crate::timestamp::TimestampStore;
use crate::worker::WorkerCommand;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub trained_at: DateTime<Utc>,
    /// Worker stdout
    pub log: String,
}

/// Runs the training worker and records when it last succeeded
pub struct TrainingGateway {
    worker: WorkerCommand,
    limit: Duration,
    store: TimestampStore,
    notifier: Notifier,
}

impl TrainingGateway {
    pub fn new(
        worker: WorkerCommand,
        limit: Duration,
        store: TimestampStore,
        notifier: Notifier,
    ) -> Self {
        Self {
            worker,
            limit,
            store,
            notifier,
        }
    }

    pub fn from_config(worker: &WorkerConfig, training: &TrainingConfig, notifier: Notifier) -> Self {
        let command = WorkerCommand::python_script(&worker.python, &worker.training_script)
            .working_dir(worker.working_dir.clone());
        Self::new(
            command,
            worker.training_timeout(),
            TimestampStore::new(&training.timestamp_path),
            notifier,
        )
    }

    /// Train on `dataset`; success means the worker exited with code 0.
    pub async fn train(&self, dataset: &[FeatureRecord]) -> Result<TrainingOutcome> {
        if dataset.is_empty() {
            return Err(AppError::EmptyInput);
        }

        let payload = serde_json::to_vec(dataset)?;
        info!(
            "Running training worker {} on {} feature record(s)",
            self.worker.display_name(),
            dataset.len()
        );

        let output = self.worker.run(Some(payload), self.limit).await?;

        if !output.success() {
            error!(
                "Training worker exited with {:?}:\n{}",
                output.exit_code, output.stderr
            );
            return Err(AppError::WorkerFailed {
                program: self.worker.display_name(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        debug!("Training worker stdout:\n{}", output.stdout);

        let trained_at = Utc::now();
        // A model that trained fine is still usable when the timestamp cannot be kept
        if let Err(e) = self.store.write(trained_at).await {
            error!(
                "Failed to store training timestamp in {}: {}",
                self.store.path().display(),
                e
            );
        }

        self.notifier.emit(
            TRAINING_COMPLETED,
            &serde_json::json!({
                "timestamp": trained_at.to_rfc3339_opts(SecondsFormat::Millis, true)
            }),
        );

        info!("Training completed at {}", trained_at);
        Ok(TrainingOutcome {
            trained_at,
            log: output.stdout,
        })
    }

    /// When the model was last trained successfully
    pub async fn last_trained_at(&self) -> Result<DateTime<Utc>> {
        self.store.read().await
    }
}
