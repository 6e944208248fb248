//! Tigerlink Configuration
//!
//! TOML configuration with environment variable overrides. Every section
//! carries `#[serde(default)]`, so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Root application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub rabbitmq: RabbitConfig,
    pub tiger: TigerConfig,
    pub pms_callback: PmsCallbackConfig,
    pub idempotency: IdempotencyConfig,
    pub elastic: ElasticConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub host: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 5080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// RabbitMQ connection and topology names
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RabbitConfig {
    /// Broker hosts, tried in order
    pub nodes: Vec<String>,
    pub port: u16,
    pub virtual_host: String,
    pub username: String,
    pub password: String,
    pub connection_name: String,
    /// Maximum unacknowledged deliveries per consumer
    pub prefetch_count: u16,
    /// Publisher confirm wait in milliseconds
    pub confirm_timeout_ms: u64,
    /// Declare the delay-tier queues (TTL + dead-letter back to events) on startup
    pub declare_retry_queues: bool,
    pub exchanges: ExchangeNames,
    pub queues: QueueNames,
    pub routing_keys: RoutingKeys,
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            nodes: vec!["localhost".to_string()],
            port: 5672,
            virtual_host: "/".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            connection_name: "tigerlink".to_string(),
            prefetch_count: 20,
            confirm_timeout_ms: 5000,
            declare_retry_queues: false,
            exchanges: ExchangeNames::default(),
            queues: QueueNames::default(),
            routing_keys: RoutingKeys::default(),
        }
    }
}

impl RabbitConfig {
    /// AMQP URIs, one per configured node, in failover order.
    ///
    /// Credentials and the vhost are percent-encoded, so reserved characters
    /// survive URI parsing. A leading `/` on the vhost is dropped unless the
    /// vhost is exactly `/`.
    pub fn amqp_uris(&self) -> Vec<String> {
        let vhost = if self.virtual_host == "/" {
            "/"
        } else {
            self.virtual_host.trim_start_matches('/')
        };
        let vhost = urlencoding::encode(vhost);
        let username = urlencoding::encode(&self.username);
        let password = urlencoding::encode(&self.password);

        self.nodes
            .iter()
            .filter(|node| !node.trim().is_empty())
            .map(|node| {
                format!(
                    "amqp://{}:{}@{}:{}/{}",
                    username,
                    password,
                    node.trim(),
                    self.port,
                    vhost
                )
            })
            .collect()
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeNames {
    pub events: String,
    pub retry: String,
}

impl Default for ExchangeNames {
    fn default() -> Self {
        Self {
            events: "tigertms.events.x".to_string(),
            retry: "tigertms.retry.x".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNames {
    pub events: String,
    pub dead: String,
}

impl Default for QueueNames {
    fn default() -> Self {
        Self {
            events: "tigertms.events.q".to_string(),
            dead: "tigertms.dead.q".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingKeys {
    pub events: String,
    pub retry_10s: String,
    pub retry_1m: String,
    pub retry_5m: String,
    pub retry_30m: String,
    pub dead: String,
}

impl Default for RoutingKeys {
    fn default() -> Self {
        Self {
            events: "events".to_string(),
            retry_10s: "retry.10s".to_string(),
            retry_1m: "retry.1m".to_string(),
            retry_5m: "retry.5m".to_string(),
            retry_30m: "retry.30m".to_string(),
            dead: "dead".to_string(),
        }
    }
}

/// Legacy Tiger SOAP endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TigerConfig {
    /// When false the client answers with a mock success
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_seconds: u64,
    /// Credential stamped into `x-wsuserkey` by the ingress endpoint
    pub ws_user_key: String,
    pub soap_action: Option<String>,
}

impl Default for TigerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8090/TigerGenericInterface.asmx".to_string(),
            timeout_seconds: 20,
            ws_user_key: String::new(),
            soap_action: None,
        }
    }
}

/// PMS callback target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PmsCallbackConfig {
    pub enabled: bool,
    pub base_url: String,
    pub timeout_seconds: u64,
}

impl Default for PmsCallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:5080".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { ttl_seconds: 6 * 60 * 60 }
    }
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Elasticsearch event log sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElasticConfig {
    pub enabled: bool,
    pub uri: String,
    pub index_prefix: String,
    pub timeout_seconds: u64,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            uri: "http://localhost:9200".to_string(),
            index_prefix: "tigerlink-events".to_string(),
            timeout_seconds: 5,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration with environment variable override
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Reject settings the broker plumbing cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let rabbit = &self.rabbitmq;
        if rabbit.prefetch_count == 0 {
            return Err(ConfigError::ValidationError(
                "rabbitmq.prefetch_count must be greater than 0".to_string(),
            ));
        }
        if rabbit.confirm_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "rabbitmq.confirm_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let names = [
            ("rabbitmq.exchanges.events", &rabbit.exchanges.events),
            ("rabbitmq.exchanges.retry", &rabbit.exchanges.retry),
            ("rabbitmq.routing_keys.events", &rabbit.routing_keys.events),
            ("rabbitmq.routing_keys.retry_10s", &rabbit.routing_keys.retry_10s),
            ("rabbitmq.routing_keys.retry_1m", &rabbit.routing_keys.retry_1m),
            ("rabbitmq.routing_keys.retry_5m", &rabbit.routing_keys.retry_5m),
            ("rabbitmq.routing_keys.retry_30m", &rabbit.routing_keys.retry_30m),
            ("rabbitmq.routing_keys.dead", &rabbit.routing_keys.dead),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!("{} must not be empty", field)));
            }
        }

        if rabbit.amqp_uris().is_empty() {
            return Err(ConfigError::ValidationError(
                "rabbitmq.nodes must name at least one broker".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate an example TOML configuration
    pub fn example_toml() -> String {
        r#"# Tigerlink Configuration
# Environment variables (TIGERLINK_*) override these settings

[http]
port = 5080
host = "0.0.0.0"

[rabbitmq]
nodes = ["localhost"]
port = 5672
virtual_host = "/"
username = "guest"
password = "guest"
connection_name = "tigerlink"
prefetch_count = 20
confirm_timeout_ms = 5000
declare_retry_queues = false

[rabbitmq.exchanges]
events = "tigertms.events.x"
retry = "tigertms.retry.x"

[rabbitmq.queues]
events = "tigertms.events.q"
dead = "tigertms.dead.q"

[rabbitmq.routing_keys]
events = "events"
retry_10s = "retry.10s"
retry_1m = "retry.1m"
retry_5m = "retry.5m"
retry_30m = "retry.30m"
dead = "dead"

[tiger]
enabled = false
endpoint = "http://localhost:8090/TigerGenericInterface.asmx"
timeout_seconds = 20
ws_user_key = ""
# soap_action = "http://tigergenericinterface.org/checkIn"

[pms_callback]
enabled = true
base_url = "http://localhost:5080"
timeout_seconds = 10

[idempotency]
ttl_seconds = 21600

[elastic]
enabled = false
uri = "http://localhost:9200"
index_prefix = "tigerlink-events"
timeout_seconds = 5
"#
        .to_string()
    }
}
