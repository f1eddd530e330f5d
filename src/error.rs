use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No water quality records available")]
    EmptyInput,

    #[error("Site {0} referenced by water quality records does not exist")]
    UnknownSite(i32),

    /// Rainfall source unreachable, rejected the request, or returned an unreadable body.
    #[error("Rainfall source request failed: {message}")]
    UpstreamFetch {
        message: String,
        body: Option<String>,
    },

    #[error("Failed to start worker process '{program}': {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker output contained no result block")]
    MissingResultMarker { raw_output: String },

    #[error("Failed to parse worker result block: {source}")]
    ResultParse {
        #[source]
        source: serde_json::Error,
        raw_output: String,
    },

    #[error("Worker process '{program}' did not finish within {limit:?}")]
    Timeout { program: String, limit: Duration },

    #[error("Worker process '{program}' failed with exit code {exit_code:?}")]
    WorkerFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },
}

impl AppError {
    /// Whether a caller may reasonably try the same operation again.
    ///
    /// Nothing in this crate retries on its own; the classification is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::UpstreamFetch { .. } | AppError::Timeout { .. } | AppError::Io(_) => true,
            AppError::Http(reqwest_err) => {
                reqwest_err.is_timeout()
                    || reqwest_err.is_connect()
                    || reqwest_err
                        .status()
                        .map(|s| s.is_server_error())
                        .unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Raw worker output carried by protocol failures, for offline debugging.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            AppError::MissingResultMarker { raw_output }
            | AppError::ResultParse { raw_output, .. } => Some(raw_output),
            AppError::WorkerFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
