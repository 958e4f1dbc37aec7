use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8083
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("pflow-tickets.db")
}

/// Queue configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Transport carrying submission messages
    #[serde(default)]
    pub backend: QueueBackend,
    /// Capacity of the in-process queue (memory backend only)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Upper bound on a single publish, in milliseconds
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Broker settings (required when backend = "kafka")
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

impl QueueConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: QueueBackend::default(),
            buffer_size: default_buffer_size(),
            publish_timeout_ms: default_publish_timeout_ms(),
            kafka: None,
        }
    }
}

fn default_buffer_size() -> usize {
    1000
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

/// Available queue backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueueBackend {
    #[default]
    Memory,
    Kafka,
}

impl QueueBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueBackend::Memory => "memory",
            QueueBackend::Kafka => "kafka",
        }
    }
}

/// Kafka-compatible broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Bootstrap brokers, e.g. ["localhost:9092"]
    #[serde(default)]
    pub brokers: Vec<String>,
    /// Topic carrying submission messages
    #[serde(default)]
    pub topic: String,
    /// Consumer group shared by all workers
    #[serde(default)]
    pub group_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    /// Where a new consumer group starts reading ("earliest" or "latest")
    #[serde(default = "default_auto_offset_reset")]
    pub auto_offset_reset: String,
    /// SASL/PLAIN credentials; both must be set to enable SASL_SSL
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
}

fn default_auto_offset_reset() -> String {
    "earliest".to_string()
}

impl KafkaConfig {
    /// Copy with whitespace trimmed, blank brokers dropped and blank optionals cleared.
    pub fn normalized(&self) -> Self {
        fn non_blank(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }

        let auto_offset_reset = match self.auto_offset_reset.trim() {
            "" => default_auto_offset_reset(),
            other => other.to_lowercase(),
        };

        Self {
            brokers: self
                .brokers
                .iter()
                .map(|b| b.trim())
                .filter(|b| !b.is_empty())
                .map(str::to_string)
                .collect(),
            topic: self.topic.trim().to_string(),
            group_id: self.group_id.trim().to_string(),
            client_id: non_blank(&self.client_id),
            auto_offset_reset,
            sasl_username: non_blank(&self.sasl_username),
            sasl_password: non_blank(&self.sasl_password),
        }
    }

    /// Both SASL credentials are present.
    pub fn sasl_enabled(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}

/// Submission worker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    /// Run consumer loops in this process
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent consumer loops
    #[serde(default = "default_consumers")]
    pub consumers: usize,
    /// Deliveries of one message before it is dead-lettered
    #[serde(default = "default_max_delivery_attempts")]
    pub max_delivery_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            consumers: default_consumers(),
            max_delivery_attempts: default_max_delivery_attempts(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_consumers() -> usize {
    1
}

fn default_max_delivery_attempts() -> u32 {
    5
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub queue: SanitizedQueueConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQueueConfig {
    pub backend: String,
    pub buffer_size: usize,
    pub publish_timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kafka: Option<SanitizedKafkaConfig>,
}

/// Sanitized Kafka config (credentials hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedKafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub auto_offset_reset: String,
    pub sasl_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            queue: SanitizedQueueConfig {
                backend: config.queue.backend.as_str().to_string(),
                buffer_size: config.queue.buffer_size,
                publish_timeout_ms: config.queue.publish_timeout_ms,
                kafka: config.queue.kafka.as_ref().map(|k| {
                    let k = k.normalized();
                    SanitizedKafkaConfig {
                        sasl_configured: k.sasl_enabled(),
                        brokers: k.brokers,
                        topic: k.topic,
                        group_id: k.group_id,
                        client_id: k.client_id,
                        auto_offset_reset: k.auto_offset_reset,
                    }
                }),
            },
            worker: config.worker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8083);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "pflow-tickets.db");
        assert_eq!(config.queue.backend, QueueBackend::Memory);
        assert_eq!(config.queue.buffer_size, 1000);
        assert_eq!(config.queue.publish_timeout(), Duration::from_secs(2));
        assert!(config.queue.kafka.is_none());
        assert!(config.worker.enabled);
        assert_eq!(config.worker.consumers, 1);
        assert_eq!(config.worker.max_delivery_attempts, 5);
    }

    #[test]
    fn test_deserialize_server_section() {
        let toml = r#"
[server]
host = "127.0.0.1"
port = 9000
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
    }

    #[test]
    fn test_deserialize_kafka_queue() {
        let toml = r#"
[queue]
backend = "kafka"
publish_timeout_ms = 500

[queue.kafka]
brokers = ["broker-1:9092", "broker-2:9092"]
topic = "ticket-submissions"
group_id = "ticket-workers"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.queue.backend, QueueBackend::Kafka);
        assert_eq!(config.queue.publish_timeout(), Duration::from_millis(500));

        let kafka = config.queue.kafka.as_ref().unwrap();
        assert_eq!(kafka.brokers.len(), 2);
        assert_eq!(kafka.topic, "ticket-submissions");
        assert_eq!(kafka.group_id, "ticket-workers");
        assert_eq!(kafka.auto_offset_reset, "earliest"); // default
        assert!(kafka.client_id.is_none());
    }

    #[test]
    fn test_deserialize_unknown_backend_fails() {
        let toml = r#"
[queue]
backend = "rabbitmq"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_kafka_normalized_trims_and_drops_blanks() {
        let kafka = KafkaConfig {
            brokers: vec![" broker:9092 ".to_string(), "  ".to_string()],
            topic: " tickets ".to_string(),
            group_id: "workers\n".to_string(),
            client_id: Some("   ".to_string()),
            auto_offset_reset: " ".to_string(),
            sasl_username: Some("user".to_string()),
            sasl_password: None,
        };

        let normalized = kafka.normalized();
        assert_eq!(normalized.brokers, vec!["broker:9092".to_string()]);
        assert_eq!(normalized.topic, "tickets");
        assert_eq!(normalized.group_id, "workers");
        assert!(normalized.client_id.is_none());
        assert_eq!(normalized.auto_offset_reset, "earliest");
        assert!(!normalized.sasl_enabled());
    }

    #[test]
    fn test_sanitized_config() {
        let config = Config::default();
        let sanitized = SanitizedConfig::from(&config);
        assert_eq!(sanitized.server.port, 8083);
        assert_eq!(sanitized.queue.backend, "memory");
        assert!(sanitized.queue.kafka.is_none());
        assert_eq!(sanitized.worker.consumers, 1);
    }

    #[test]
    fn test_sanitized_config_hides_sasl_password() {
        let mut config = Config::default();
        config.queue.backend = QueueBackend::Kafka;
        config.queue.kafka = Some(KafkaConfig {
            brokers: vec!["broker:9092".to_string()],
            topic: "tickets".to_string(),
            group_id: "workers".to_string(),
            client_id: None,
            auto_offset_reset: "latest".to_string(),
            sasl_username: Some("user".to_string()),
            sasl_password: Some("secret-password".to_string()),
        });

        let sanitized = SanitizedConfig::from(&config);
        let kafka = sanitized.queue.kafka.as_ref().unwrap();
        assert_eq!(kafka.brokers, vec!["broker:9092".to_string()]);
        assert!(kafka.sasl_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-password"));
    }
}
