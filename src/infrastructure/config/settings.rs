use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub ack: AckSettingsConfig,
    #[serde(default)]
    pub cluster: ClusterSettingsConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

/// Pending-delivery tracking and retry sweep settings
#[derive(Debug, Clone, Deserialize)]
pub struct AckSettingsConfig {
    /// Storage backend: "memory" or "redis"
    #[serde(default = "default_ack_backend")]
    pub backend: String,
    /// Redis hash holding every pending record (redis backend only)
    #[serde(default = "default_ack_redis_key")]
    pub redis_key: String,
    /// Grace period after first send before the sweep may retry
    #[serde(default = "default_check_wait_ms")]
    pub check_wait_ms: u64,
    /// Sweep period; also the unit the retry budget is measured in
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Hard deadline, measured from first enqueue
    #[serde(default = "default_ack_ttl_ms")]
    pub ttl_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterSettingsConfig {
    /// Whether relays go through Redis pub/sub
    #[serde(default)]
    pub enabled: bool,
    /// Unique identifier for this node
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Pub/sub topic carrying relayed publish events
    #[serde(default = "default_cluster_topic")]
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketConfig {
    /// Outbound frame buffer per session
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_ack_backend() -> String {
    "memory".to_string()
}

fn default_ack_redis_key() -> String {
    "ara:ack:pending".to_string()
}

fn default_check_wait_ms() -> u64 {
    5_000
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_ack_ttl_ms() -> u64 {
    60_000
}

fn default_node_id() -> String {
    format!("ara-{}", Uuid::new_v4().simple())
}

fn default_cluster_topic() -> String {
    "ara:notify:topic".to_string()
}

fn default_channel_buffer() -> usize {
    32
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("ack.backend", "memory")?
            .set_default("ack.check_wait_ms", 5_000)?
            .set_default("ack.retry_interval_ms", 5_000)?
            .set_default("ack.ttl_ms", 60_000)?
            .set_default("cluster.enabled", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, REDIS__URL, ACK__RETRY_INTERVAL_MS, CLUSTER__ENABLED, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.ack.validate()?;
        Ok(settings)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl AckSettingsConfig {
    /// Number of re-sends allowed before a record is abandoned
    pub fn max_retry(&self) -> u32 {
        (self.ttl_ms / self.retry_interval_ms.max(1)) as u32
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_interval_ms == 0 {
            return Err(ConfigError::Message(
                "ack.retry_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.ttl_ms < self.retry_interval_ms {
            return Err(ConfigError::Message(
                "ack.ttl_ms must not be shorter than ack.retry_interval_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

impl Default for AckSettingsConfig {
    fn default() -> Self {
        Self {
            backend: default_ack_backend(),
            redis_key: default_ack_redis_key(),
            check_wait_ms: default_check_wait_ms(),
            retry_interval_ms: default_retry_interval_ms(),
            ttl_ms: default_ack_ttl_ms(),
        }
    }
}

impl Default for ClusterSettingsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            node_id: default_node_id(),
            topic: default_cluster_topic(),
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            channel_buffer: default_channel_buffer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);
    }

    #[test]
    fn test_ack_defaults_give_twelve_retries() {
        let ack = AckSettingsConfig::default();
        assert_eq!(ack.backend, "memory");
        assert_eq!(ack.check_wait_ms, 5_000);
        assert_eq!(ack.ttl_ms, 60_000);
        assert_eq!(ack.max_retry(), 12);
    }

    #[test]
    fn test_ack_validation_rejects_zero_interval() {
        let ack = AckSettingsConfig {
            retry_interval_ms: 0,
            ..Default::default()
        };
        assert!(ack.validate().is_err());
    }

    #[test]
    fn test_ack_validation_rejects_ttl_below_interval() {
        let ack = AckSettingsConfig {
            retry_interval_ms: 10_000,
            ttl_ms: 5_000,
            ..Default::default()
        };
        assert!(ack.validate().is_err());
        assert!(AckSettingsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_cluster_defaults() {
        let cluster = ClusterSettingsConfig::default();
        assert!(!cluster.enabled);
        assert!(cluster.node_id.starts_with("ara-"));
        assert_eq!(cluster.topic, "ara:notify:topic");
    }
}
