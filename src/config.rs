use std::env;
use std::path::Path;
use std::time::Duration;

use crate::models::{
    ApplicationAccounts, DirectSendSetting, GraphSetting, MailSettings, ProviderType,
    RetrySetting, SmtpSetting,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
    /// Path of the JSON delivery-settings file
    pub settings_path: String,
    /// Directory used by the filesystem queue gateway
    pub queue_dir: String,
    /// Poll interval for the queue worker
    pub worker_poll_interval: Duration,
}

/// Database connection pool configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            database: DatabaseConfig::from_env()?,
            settings_path: env::var("SETTINGS_PATH")
                .map_err(|_| ConfigError::MissingSettingsPath)?,
            queue_dir: env::var("QUEUE_DIR")
                .unwrap_or_else(|_| "/tmp/mailrelay/queue".to_string()),
            worker_poll_interval: Duration::from_secs(
                env::var("WORKER_POLL_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),
        })
    }
}

impl DatabaseConfig {
    /// Load database configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        Ok(Self {
            url,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),
            acquire_timeout: Duration::from_secs(
                env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            ),
            idle_timeout: Duration::from_secs(
                env::var("DATABASE_IDLE_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                env::var("DATABASE_MAX_LIFETIME_SECS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()
                    .unwrap_or(1800),
            ),
        })
    }
}

// =============================================================================
// Delivery Settings Snapshot
// =============================================================================

/// Immutable delivery settings snapshot, loaded once from a JSON file at
/// startup. A reload requires a restart.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AppSettings {
    pub provider: ProviderType,
    #[serde(default)]
    pub mail_settings: Vec<MailSettings>,
    #[serde(default)]
    pub application_accounts: Vec<ApplicationAccounts>,
    #[serde(default)]
    pub retry: RetrySetting,
    #[serde(default)]
    pub graph: Option<GraphSetting>,
    #[serde(default)]
    pub smtp: Option<SmtpSetting>,
    #[serde(default)]
    pub direct_send: Option<DirectSendSetting>,
}

impl AppSettings {
    /// Loads and validates the settings file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::SettingsFile(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&raw)
    }

    /// Parses and validates a settings JSON document
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let settings: AppSettings = serde_json::from_str(raw)
            .map_err(|e| ConfigError::SettingsFile(format!("invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.provider {
            ProviderType::Graph => {
                let graph = self
                    .graph
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingSection("graph"))?;
                if graph.batch_request_limit == 0 {
                    return Err(ConfigError::SettingsFile(
                        "graph.batch_request_limit must be positive".to_string(),
                    ));
                }
                validate_url("graph.base_url", &graph.base_url)?;
                validate_url("graph.token_url", &graph.token_url)?;
            }
            ProviderType::Smtp => {
                self.smtp
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingSection("smtp"))?;
            }
            ProviderType::DirectSend => {
                let direct = self
                    .direct_send
                    .as_ref()
                    .ok_or_else(|| ConfigError::MissingSection("direct_send"))?;
                validate_url("direct_send.relay_url", &direct.relay_url)?;
            }
        }

        Ok(())
    }

    /// Mail policy for an application, if configured
    pub fn mail_settings_for(&self, application: &str) -> Option<&MailSettings> {
        self.mail_settings
            .iter()
            .find(|s| s.application.eq_ignore_ascii_case(application))
    }

    /// Account pool for an application, if configured
    pub fn accounts_for(&self, application: &str) -> Option<&ApplicationAccounts> {
        self.application_accounts
            .iter()
            .find(|a| a.application.eq_ignore_ascii_case(application))
    }

    /// Chunk size used when splitting entities for queueing and batch calls.
    /// Graph uses its batch request limit; other providers queue one combined chunk.
    pub fn batch_limit(&self) -> usize {
        match (&self.provider, &self.graph) {
            (ProviderType::Graph, Some(graph)) => graph.batch_request_limit,
            _ => usize::MAX,
        }
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value)
        .map_err(|_| ConfigError::SettingsFile(format!("{} is not a valid URL", field)))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::SettingsFile(format!(
            "{} must use HTTP or HTTPS",
            field
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    MissingDatabaseUrl,
    MissingSettingsPath,
    MissingSection(&'static str),
    SettingsFile(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "PORT must be a valid number"),
            ConfigError::MissingDatabaseUrl => {
                write!(f, "DATABASE_URL environment variable is required")
            }
            ConfigError::MissingSettingsPath => {
                write!(f, "SETTINGS_PATH environment variable is required")
            }
            ConfigError::MissingSection(section) => {
                write!(
                    f,
                    "settings section '{}' is required for the selected provider",
                    section
                )
            }
            ConfigError::SettingsFile(msg) => write!(f, "settings error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
