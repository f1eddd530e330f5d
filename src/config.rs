use crate::error::{AppError, Result};
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rainfall: RainfallConfig,
    pub worker: WorkerConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    #[serde(default = "default_db_port", deserialize_with = "deserialize_port")]
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

/// Custom deserializer that handles port as both number and string
///
/// Accepts:
/// - `port: 5432` (number)
/// - `port: "5432"` (string that parses to number)
/// - `port: ${DB_PORT}` (env var substituted to either)
fn deserialize_port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Number(u16),
        String(String),
    }

    match PortValue::deserialize(deserializer)? {
        PortValue::Number(n) => Ok(n),
        PortValue::String(s) => s
            .parse::<u16>()
            .map_err(|_| serde::de::Error::custom(format!("Invalid port number: '{}'", s))),
    }
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Daily precipitation source (Open-Meteo compatible)
#[derive(Debug, Deserialize, Clone)]
pub struct RainfallConfig {
    #[serde(default = "default_rainfall_url")]
    pub base_url: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_rainfall_timeout")]
    pub timeout_seconds: u64,
}

fn default_rainfall_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_timezone() -> String {
    "Asia/Jakarta".to_string()
}

fn default_rainfall_timeout() -> u64 {
    30
}

impl Default for RainfallConfig {
    fn default() -> Self {
        Self {
            base_url: default_rainfall_url(),
            timezone: default_timezone(),
            timeout_seconds: default_rainfall_timeout(),
        }
    }
}

/// External forecasting model processes
#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    pub python: PathBuf,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    pub forecast_script: PathBuf,
    pub training_script: PathBuf,
    #[serde(default = "default_forecast_timeout")]
    pub forecast_timeout_seconds: u64,
    #[serde(default = "default_training_timeout")]
    pub training_timeout_seconds: u64,
}

fn default_forecast_timeout() -> u64 {
    300
}

fn default_training_timeout() -> u64 {
    3600
}

impl WorkerConfig {
    pub fn forecast_timeout(&self) -> Duration {
        Duration::from_secs(self.forecast_timeout_seconds)
    }

    pub fn training_timeout(&self) -> Duration {
        Duration::from_secs(self.training_timeout_seconds)
    }
}

/// Narrative summary generator (local LLM runner)
#[derive(Debug, Deserialize, Clone)]
pub struct SummaryConfig {
    #[serde(default = "default_summary_program")]
    pub program: PathBuf,
    #[serde(default = "default_summary_args")]
    pub args: Vec<String>,
    #[serde(default = "default_summary_timeout")]
    pub timeout_seconds: u64,
}

fn default_summary_program() -> PathBuf {
    PathBuf::from("ollama")
}

fn default_summary_args() -> Vec<String> {
    vec!["run".to_string(), "gemma:2b".to_string()]
}

fn default_summary_timeout() -> u64 {
    120
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            program: default_summary_program(),
            args: default_summary_args(),
            timeout_seconds: default_summary_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_training_enabled")]
    pub enabled: bool,
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_seconds: u64,
    #[serde(default = "default_timestamp_path")]
    pub timestamp_path: PathBuf,
}

fn default_training_enabled() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    24 * 60
}

fn default_initial_delay() -> u64 {
    10
}

fn default_timestamp_path() -> PathBuf {
    PathBuf::from("tft/last_model_timestamp.txt")
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: default_training_enabled(),
            interval_minutes: default_interval_minutes(),
            initial_delay_seconds: default_initial_delay(),
            timestamp_path: default_timestamp_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default = "default_notifier_capacity")]
    pub capacity: usize,
}

fn default_notifier_capacity() -> usize {
    256
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            capacity: default_notifier_capacity(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, substituting `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    ///
    /// Checks for:
    /// - Unexpanded environment variables
    /// - Non-empty required fields
    /// - Positive timeouts and intervals
    /// - Valid HTTPS rainfall URL
    fn validate(&self) -> Result<()> {
        let fields_to_check = [
            ("DB_HOST", &self.database.host),
            ("DB_NAME", &self.database.name),
            ("DB_USER", &self.database.user),
            ("DB_PASSWORD", &self.database.password),
        ];

        for (field_name, value) in &fields_to_check {
            if value.contains("${") {
                return Err(AppError::Config(format!(
                    "{} environment variable is not set. \
                     Please set it or create a .env file. \
                     See .env.example for required variables.",
                    field_name
                )));
            }
        }

        if self.database.host.is_empty() {
            return Err(AppError::Config(
                "Database host cannot be empty".to_string(),
            ));
        }

        if self.database.name.is_empty() {
            return Err(AppError::Config(
                "Database name cannot be empty".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(AppError::Config(
                "Database max_connections must be at least 1".to_string(),
            ));
        }

        match url::Url::parse(&self.rainfall.base_url) {
            Ok(parsed) if parsed.scheme() != "https" => {
                return Err(AppError::Config(format!(
                    "Rainfall base_url must use HTTPS, got: {}",
                    parsed.scheme()
                )));
            }
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::Config(format!(
                    "Invalid rainfall base_url '{}': {}",
                    self.rainfall.base_url, e
                )));
            }
        }

        if self.rainfall.timezone.trim().is_empty() {
            return Err(AppError::Config(
                "Rainfall timezone cannot be empty".to_string(),
            ));
        }

        let timeouts = [
            ("rainfall.timeout_seconds", self.rainfall.timeout_seconds),
            (
                "worker.forecast_timeout_seconds",
                self.worker.forecast_timeout_seconds,
            ),
            (
                "worker.training_timeout_seconds",
                self.worker.training_timeout_seconds,
            ),
            ("summary.timeout_seconds", self.summary.timeout_seconds),
        ];

        for (field_name, value) in &timeouts {
            if *value == 0 {
                return Err(AppError::Config(format!(
                    "{} must be greater than 0",
                    field_name
                )));
            }
        }

        if self.training.enabled && self.training.interval_minutes == 0 {
            return Err(AppError::Config(
                "Training interval_minutes must be greater than 0".to_string(),
            ));
        }

        if self.notifier.capacity == 0 {
            return Err(AppError::Config(
                "Notifier capacity must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| AppError::Config(format!("Invalid substitution pattern: {}", e)))?;

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}\n\n\
             To fix this:\n\
             1. Create a .env file in the project root (copy .env.example)\n\
             2. Set the missing variable{}: export {}=<value>\n\
             3. Or set {} in your environment before running",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", "),
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars[0],
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
