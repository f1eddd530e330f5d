//! Farmer-facing narrative summary of a forecast, written by a local LLM.

use crate::config::SummaryConfig;
use crate::error::{AppError, Result};
use crate::features::canonical_date;
use crate::notifier::{Notifier, SUMMARY_READY};
use crate::worker::WorkerCommand;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// One forecast day
#[derive(Debug, Clone, Deserialize)]
pub struct ForecastPoint {
    pub tanggal: Value,
    pub wqi: f64,
    pub ph: f64,
    pub suhu: f64,
    pub salinitas: f64,
    pub kekeruhan: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub kesimpulan: String,
}

pub struct SummaryGateway {
    worker: WorkerCommand,
    limit: Duration,
    notifier: Notifier,
}

impl SummaryGateway {
    pub fn new(worker: WorkerCommand, limit: Duration, notifier: Notifier) -> Self {
        Self {
            worker,
            limit,
            notifier,
        }
    }

    pub fn from_config(config: &SummaryConfig, notifier: Notifier) -> Self {
        let worker = WorkerCommand::new(&config.program).args(config.args.iter().cloned());
        Self::new(worker, Duration::from_secs(config.timeout_seconds), notifier)
    }

    pub async fn summarize(&self, points: &[ForecastPoint]) -> Result<Summary> {
        let prompt = build_prompt(points)?;

        info!(
            "Requesting summary of {} forecast day(s) from {}",
            points.len(),
            self.worker.display_name()
        );
        let output = self
            .worker
            .run(Some(prompt.into_bytes()), self.limit)
            .await?;

        let text = output.stdout.trim().to_string();
        if !output.success() {
            if text.is_empty() {
                return Err(AppError::WorkerFailed {
                    program: self.worker.display_name(),
                    exit_code: output.exit_code,
                    stderr: output.stderr,
                });
            }
            warn!(
                "Summary worker exited with {:?}, keeping its output",
                output.exit_code
            );
        }

        let summary = Summary { kesimpulan: text };
        self.notifier.emit(SUMMARY_READY, &summary);
        Ok(summary)
    }
}

/// Instructions for the LLM plus one bullet line per forecast day
pub fn build_prompt(points: &[ForecastPoint]) -> Result<String> {
    if points.is_empty() {
        return Err(AppError::InvalidInput(
            "summary needs at least one forecast day".to_string(),
        ));
    }

    let lines = points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let date = canonical_date(&point.tanggal).ok_or_else(|| {
                AppError::InvalidInput(format!("forecast day {} has an invalid date", index))
            })?;
            Ok(format!(
                "- {}: WQI {:.1}, pH {:.1}, Suhu {:.1}°C, Salinitas {:.1} ppt, Kekeruhan {:.1} NTU",
                date.format("%Y-%m-%d"),
                point.wqi,
                point.ph,
                point.suhu,
                point.salinitas,
                point.kekeruhan
            ))
        })
        .collect::<Result<Vec<String>>>()?;

    Ok(format!(
        "Berikut adalah hasil prediksi kualitas air selama {} hari ke depan:\n\
         {}\n\n\
         Tulis satu paragraf yang menjelaskan:\n\
         - Kondisi umum kualitas air selama periode tersebut.\n\
         - Tanggal terbaik untuk menebar ikan kerapu cantang.\n\
         - Tanggal yang sebaiknya dihindari karena kualitas air kurang baik.\n\
         - Apakah ada tren penurunan atau peningkatan kualitas air selama beberapa hari terakhir.\n\n\
         Gunakan bahasa Indonesia yang sederhana dan jelas untuk petani tambak. \
         Jangan sertakan format daftar, angka, atau judul seperti \"Kualitas Air\", \
         cukup tulis langsung satu paragraf narasi yang alami dan mudah dibaca. \
         Hindari gaya tulisan seperti artikel ilmiah atau laporan teknis.",
        points.len(),
        lines.join("\n")
    ))
}
