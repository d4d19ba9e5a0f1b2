use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub trello: TrelloConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

impl DatabaseConfig {
    pub fn connection_string(&self) -> String {
        if let Some(ref url) = self.url {
            url.clone()
        } else if let Some(ref file) = self.filename {
            format!("sqlite://{}", file)
        } else {
            String::new()
        }
    }

    pub fn sqlite_path(&self) -> Option<String> {
        let url = self.connection_string();
        if url.is_empty() {
            None
        } else {
            Some(url.strip_prefix("sqlite://").unwrap_or(&url).to_string())
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrelloConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for TrelloConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        Self::load_from_file(&config_path)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "server.port must be between 1 and 65535".to_string(),
            ));
        }

        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database connection string cannot be empty".to_string(),
            ));
        }

        if self.trello.api_base_url.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "trello.api_base_url cannot be empty".to_string(),
            ));
        }

        if self.trello.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidConfig(
                "trello.rate_limit.max_requests must be at least 1".to_string(),
            ));
        }

        if self.trello.rate_limit.window_seconds == 0 {
            return Err(ConfigError::InvalidConfig(
                "trello.rate_limit.window_seconds must be at least 1".to_string(),
            ));
        }

        if self.trello.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "trello.retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.queue.workers == 0 {
            return Err(ConfigError::InvalidConfig(
                "queue.workers must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TRELLO_RELAY_DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Ok(value) = std::env::var("TRELLO_RELAY_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("TRELLO_RELAY_API_BASE_URL") {
            self.trello.api_base_url = value;
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_api_base_url() -> String {
    "https://api.trello.com/1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_requests() -> usize {
    90
}

fn default_window_seconds() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).expect("config parses")
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse(
            r#"
server:
  port: 5000
database:
  filename: relay.db
"#,
        );

        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.trello.api_base_url, "https://api.trello.com/1");
        assert_eq!(config.trello.rate_limit.max_requests, 90);
        assert_eq!(config.trello.rate_limit.window_seconds, 10);
        assert_eq!(config.trello.retry.max_attempts, 3);
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sqlite_path_strips_scheme() {
        let config = parse(
            r#"
server:
  port: 5000
database:
  url: sqlite:///var/lib/relay/relay.db
"#,
        );

        assert_eq!(
            config.database.sqlite_path().as_deref(),
            Some("/var/lib/relay/relay.db")
        );
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let config = parse(
            r#"
server:
  port: 5000
database:
  filename: relay.db
trello:
  rate_limit:
    max_requests: 0
"#,
        );

        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_database_is_rejected() {
        let config = parse(
            r#"
server:
  port: 5000
database: {}
"#,
        );

        assert!(config.validate().is_err());
    }
}
