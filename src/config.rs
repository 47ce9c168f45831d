use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (HTTP API and WebSocket)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// JWT secret key for identity tokens
    pub auth_jwt_secret: Option<String>,

    /// Database URL; the in-memory store is used when absent
    pub db_url: Option<String>,

    /// Base URL of the user service used to resolve display names
    pub user_service_url: Option<String>,

    #[serde(default = "default_persistence_timeout_ms")]
    pub persistence_timeout_ms: u64,

    #[serde(default = "default_max_scene_bytes")]
    pub max_scene_bytes: usize,

    #[serde(default = "default_max_comment_chars")]
    pub max_comment_chars: usize,

    #[serde(default = "default_session_outbox_capacity")]
    pub session_outbox_capacity: usize,

    #[serde(default = "default_session_idle_timeout_secs")]
    pub session_idle_timeout_secs: u64,

    /// Versions returned when a request does not give a limit
    #[serde(default = "default_history_page_limit")]
    pub history_page_limit: usize,

    /// Users allowed to read diagnostics, comma separated
    pub admin_user_ids: Option<String>,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        match envy::from_env::<Config>() {
            Ok(config) => {
                info!("✅ Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.persistence_timeout_ms.max(1))
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs.max(1))
    }

    /// Parsed CORS origins, empty when none are configured
    pub fn cors_origin_list(&self) -> Vec<String> {
        split_list(self.cors_origins.as_deref())
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        split_list(self.admin_user_ids.as_deref()).iter().any(|id| id == user_id)
    }

    /// Tracing filter used when RUST_LOG is not set
    pub fn tracing_filter(&self) -> String {
        format!("canvas_sync={},tower_http=debug,axum::rejection=trace,info", self.log_level)
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            service_name: default_service_name(),
            auth_jwt_secret: None,
            db_url: None,
            user_service_url: None,
            persistence_timeout_ms: default_persistence_timeout_ms(),
            max_scene_bytes: default_max_scene_bytes(),
            max_comment_chars: default_max_comment_chars(),
            session_outbox_capacity: default_session_outbox_capacity(),
            session_idle_timeout_secs: default_session_idle_timeout_secs(),
            history_page_limit: default_history_page_limit(),
            admin_user_ids: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "canvas-sync".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_persistence_timeout_ms() -> u64 {
    5_000
}

fn default_max_scene_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_max_comment_chars() -> usize {
    4_000
}

fn default_session_outbox_capacity() -> usize {
    256
}

fn default_session_idle_timeout_secs() -> u64 {
    120
}

fn default_history_page_limit() -> usize {
    100
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envy_fills_defaults_and_parses_overrides() {
        let vars = vec![
            ("PORT".to_string(), "8081".to_string()),
            ("MAX_SCENE_BYTES".to_string(), "1024".to_string()),
            ("CORS_ORIGINS".to_string(), "https://a.test, https://b.test,".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.max_scene_bytes, 1024);
        assert_eq!(config.persistence_timeout(), Duration::from_millis(5_000));
        assert_eq!(config.cors_origin_list(), vec!["https://a.test", "https://b.test"]);
        assert!(config.db_url.is_none());
        assert!(config.is_development());
    }

    #[test]
    fn log_level_drives_the_default_filter() {
        let vars = vec![("LOG_LEVEL".to_string(), "warn".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.tracing_filter(), "canvas_sync=warn,tower_http=debug,axum::rejection=trace,info");
        assert!(Config::default().tracing_filter().starts_with(&format!("canvas_sync={},", default_log_level())));
    }

    #[test]
    fn admins_come_from_a_comma_separated_list() {
        let vars = vec![("ADMIN_USER_IDS".to_string(), "ops, root".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert!(config.is_admin("ops"));
        assert!(config.is_admin("root"));
        assert!(!config.is_admin("alice"));
        assert!(!Config::default().is_admin("ops"));
    }
}
