use crate::assembler::DatasetAssembler;
use crate::config::TrainingConfig;
use crate::db::Repository;
use crate::error::Result;
use crate::rainfall::RainfallSource;
use crate::training::TrainingGateway;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Periodically rebuilds the dataset and retrains the model
pub struct Scheduler<R> {
    config: TrainingConfig,
    repository: Arc<Repository>,
    assembler: DatasetAssembler<R>,
    trainer: TrainingGateway,
    shutdown_rx: watch::Receiver<bool>,
}

impl<R: RainfallSource> Scheduler<R> {
    pub fn new(
        config: TrainingConfig,
        repository: Arc<Repository>,
        assembler: DatasetAssembler<R>,
        trainer: TrainingGateway,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            repository,
            assembler,
            trainer,
            shutdown_rx,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        if !self.config.enabled {
            info!("Scheduled training disabled, waiting for shutdown");
            let _ = self.shutdown_rx.changed().await;
            return Ok(());
        }

        let initial_delay = Duration::from_secs(self.config.initial_delay_seconds);
        let poll_interval = Duration::from_secs(self.config.interval_minutes * 60);

        info!(
            "Scheduler starting with {}s initial delay, {}m interval",
            self.config.initial_delay_seconds, self.config.interval_minutes
        );

        match self.trainer.last_trained_at().await {
            Ok(at) => info!("Model last trained at {}", at),
            Err(e) => info!("No previous training recorded ({})", e),
        }

        tokio::select! {
            _ = tokio::time::sleep(initial_delay) => {},
            _ = self.shutdown_rx.changed() => {
                info!("Shutdown received during initial delay");
                return Ok(());
            }
        }

        // Run immediately, then on interval
        if let Err(e) = self.run_training().await {
            error!("Training run failed: {}", e);
        }

        let mut ticker = interval(poll_interval);
        ticker.tick().await; // First tick is immediate, skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_training().await {
                        error!("Training run failed: {}", e);
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn run_training(&self) -> Result<()> {
        info!("Starting scheduled training run");

        let dataset = self
            .assembler
            .assemble_from_repository(&self.repository)
            .await?;
        let outcome = self.trainer.train(&dataset).await?;

        info!(
            "Scheduled training finished at {} on {} record(s)",
            outcome.trained_at,
            dataset.len()
        );
        Ok(())
    }
}
