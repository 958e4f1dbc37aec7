use super::{
    types::{Config, QueueBackend},
    ConfigError,
};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - The kafka backend has brokers, a topic and a group id, and is compiled in
/// - The memory backend has an in-process worker to drain it
/// - Worker counts are at least 1
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.queue.publish_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "queue.publish_timeout_ms cannot be 0".to_string(),
        ));
    }

    match config.queue.backend {
        QueueBackend::Kafka => {
            if !cfg!(feature = "kafka") {
                return Err(ConfigError::ValidationError(
                    "queue.backend = \"kafka\" requires the kafka feature".to_string(),
                ));
            }
            let kafka = config.queue.kafka.as_ref().ok_or_else(|| {
                ConfigError::ValidationError(
                    "queue.kafka section is required when queue.backend = \"kafka\"".to_string(),
                )
            })?;
            let kafka = kafka.normalized();
            if kafka.brokers.is_empty() {
                return Err(ConfigError::ValidationError(
                    "queue.kafka.brokers must contain at least one broker".to_string(),
                ));
            }
            if kafka.topic.is_empty() {
                return Err(ConfigError::ValidationError(
                    "queue.kafka.topic is required".to_string(),
                ));
            }
            if kafka.group_id.is_empty() {
                return Err(ConfigError::ValidationError(
                    "queue.kafka.group_id is required".to_string(),
                ));
            }
        }
        QueueBackend::Memory => {
            if !config.worker.enabled {
                return Err(ConfigError::ValidationError(
                    "worker.enabled cannot be false with the memory queue backend".to_string(),
                ));
            }
        }
    }

    if config.worker.consumers == 0 {
        return Err(ConfigError::ValidationError(
            "worker.consumers must be at least 1".to_string(),
        ));
    }
    if config.worker.max_delivery_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "worker.max_delivery_attempts must be at least 1".to_string(),
        ));
    }

    Ok(())
}
