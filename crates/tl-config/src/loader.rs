//! Configuration loader with file and environment variable support

use crate::{AppConfig, ConfigError};
use std::env;
use std::path::PathBuf;
use tracing::info;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "TIGERLINK_CONFIG";

/// Standard config file search paths
const CONFIG_PATHS: &[&str] = &[
    "config.toml",
    "tigerlink.toml",
    "./config/config.toml",
    "/etc/tigerlink/config.toml",
];

/// Configuration loader
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Create a loader with a specific config file path
    pub fn with_path<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            config_path: Some(path.into()),
        }
    }

    /// Load configuration from file (if found) with environment variable overrides
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = AppConfig::default();

        if let Some(path) = self.find_config_file() {
            info!(?path, "Loading configuration from file");
            config = AppConfig::from_file(&path)?;
        }

        apply_overrides(&mut config, |key| env::var(key).ok());

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config_path {
            if path.exists() {
                return Some(path.clone());
            }
        }

        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply `TIGERLINK_*` overrides read through `lookup`.
pub(crate) fn apply_overrides<F>(config: &mut AppConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    // HTTP
    if let Some(val) = lookup("TIGERLINK_HTTP_PORT") {
        if let Ok(port) = val.parse() {
            config.http.port = port;
        }
    }
    if let Some(val) = lookup("TIGERLINK_HTTP_HOST") {
        config.http.host = val;
    }

    // RabbitMQ
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_NODES") {
        config.rabbitmq.nodes = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_PORT") {
        if let Ok(port) = val.parse() {
            config.rabbitmq.port = port;
        }
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_VHOST") {
        config.rabbitmq.virtual_host = val;
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_USERNAME") {
        config.rabbitmq.username = val;
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_PASSWORD") {
        config.rabbitmq.password = val;
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_PREFETCH") {
        if let Ok(prefetch) = val.parse() {
            config.rabbitmq.prefetch_count = prefetch;
        }
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_CONFIRM_TIMEOUT_MS") {
        if let Ok(timeout) = val.parse() {
            config.rabbitmq.confirm_timeout_ms = timeout;
        }
    }
    if let Some(val) = lookup("TIGERLINK_RABBITMQ_DECLARE_RETRY_QUEUES") {
        config.rabbitmq.declare_retry_queues = val.parse().unwrap_or(false);
    }

    // Tiger
    if let Some(val) = lookup("TIGERLINK_TIGER_ENABLED") {
        config.tiger.enabled = val.parse().unwrap_or(false);
    }
    if let Some(val) = lookup("TIGERLINK_TIGER_ENDPOINT") {
        config.tiger.endpoint = val;
    }
    if let Some(val) = lookup("TIGERLINK_TIGER_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.tiger.timeout_seconds = timeout;
        }
    }
    if let Some(val) = lookup("TIGERLINK_TIGER_WS_USER_KEY") {
        config.tiger.ws_user_key = val;
    }
    if let Some(val) = lookup("TIGERLINK_TIGER_SOAP_ACTION") {
        config.tiger.soap_action = Some(val).filter(|s| !s.trim().is_empty());
    }

    // PMS callback
    if let Some(val) = lookup("TIGERLINK_PMS_CALLBACK_ENABLED") {
        config.pms_callback.enabled = val.parse().unwrap_or(true);
    }
    if let Some(val) = lookup("TIGERLINK_PMS_CALLBACK_BASE_URL") {
        config.pms_callback.base_url = val;
    }
    if let Some(val) = lookup("TIGERLINK_PMS_CALLBACK_TIMEOUT_SECONDS") {
        if let Ok(timeout) = val.parse() {
            config.pms_callback.timeout_seconds = timeout;
        }
    }

    // Idempotency
    if let Some(val) = lookup("TIGERLINK_IDEMPOTENCY_TTL_SECONDS") {
        if let Ok(ttl) = val.parse() {
            config.idempotency.ttl_seconds = ttl;
        }
    }

    // Elastic
    if let Some(val) = lookup("TIGERLINK_ELASTIC_ENABLED") {
        config.elastic.enabled = val.parse().unwrap_or(false);
    }
    if let Some(val) = lookup("TIGERLINK_ELASTIC_URI") {
        config.elastic.uri = val;
    }
    if let Some(val) = lookup("TIGERLINK_ELASTIC_INDEX_PREFIX") {
        config.elastic.index_prefix = val;
    }
}
