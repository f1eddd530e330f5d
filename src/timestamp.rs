use crate::error::{AppError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Single-file store for the instant the model was last trained
#[derive(Debug, Clone)]
pub struct TimestampStore {
    path: PathBuf,
}

impl TimestampStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the stored instant (RFC 3339, millisecond precision)
    pub async fn write(&self, instant: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let text = instant.to_rfc3339_opts(SecondsFormat::Millis, true);
        tokio::fs::write(&self.path, &text).await?;
        debug!("Stored timestamp {} in {}", text, self.path.display());
        Ok(())
    }

    /// `NotFound` until something has been written
    pub async fn read(&self) -> Result<DateTime<Utc>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::NotFound(
                    "no model has been trained yet".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        DateTime::parse_from_rfc3339(text.trim())
            .map(|instant| instant.with_timezone(&Utc))
            .map_err(|e| {
                AppError::InvalidInput(format!(
                    "stored timestamp '{}' in {} is not RFC 3339: {}",
                    text.trim(),
                    self.path.display(),
                    e
                ))
            })
    }
}
