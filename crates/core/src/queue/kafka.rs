//! Kafka-compatible queue transport (Kafka, Redpanda, MSK, ...).
//!
//! Offsets are committed manually: a delivery is only committed when the
//! worker acknowledges it, so anything in flight when the process dies is
//! redelivered to the consumer group. A nack seeks the partition back to the
//! failed offset so the message is fetched again before anything after it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, error, info, warn};

use super::{Delivery, QueueConsumer, QueueError, QueueMessage, QueueTransport};
use crate::config::KafkaConfig;

type MessagePosition = (String, i32, i64);

/// Delivery attempts per message position, kept until the message is acked.
///
/// Kafka has no redelivery counter, so nacked positions are remembered here.
#[derive(Default)]
struct AttemptTracker {
    nacks: Mutex<HashMap<MessagePosition, u32>>,
}

impl AttemptTracker {
    fn position(topic: &str, partition: i32, offset: i64) -> MessagePosition {
        (topic.to_string(), partition, offset)
    }

    fn attempt(&self, topic: &str, partition: i32, offset: i64) -> u32 {
        let nacks = self.nacks.lock().unwrap_or_else(|e| e.into_inner());
        nacks
            .get(&Self::position(topic, partition, offset))
            .copied()
            .unwrap_or(0)
            + 1
    }

    fn record_nack(&self, delivery: &Delivery) {
        let mut nacks = self.nacks.lock().unwrap_or_else(|e| e.into_inner());
        *nacks
            .entry(Self::position(&delivery.topic, delivery.partition, delivery.offset))
            .or_insert(0) += 1;
    }

    fn clear(&self, delivery: &Delivery) {
        let mut nacks = self.nacks.lock().unwrap_or_else(|e| e.into_inner());
        nacks.remove(&Self::position(
            &delivery.topic,
            delivery.partition,
            delivery.offset,
        ));
    }
}

/// Kafka producer and (optionally) consumer bound to a single topic.
pub struct KafkaQueue {
    producer: FutureProducer,
    consumer: Option<StreamConsumer>,
    attempts: AttemptTracker,
    topic: String,
    timeout: Duration,
}

impl KafkaQueue {
    /// Create a producer-only transport.
    pub fn producer(config: &KafkaConfig, timeout: Duration) -> Result<Self, QueueError> {
        let config = config.normalized();
        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", "all");
        apply_client_settings(&mut producer_config, &config);

        let producer: FutureProducer = producer_config
            .create()
            .map_err(|e| QueueError::Config(format!("Failed to create producer: {e}")))?;

        info!(
            brokers = %config.brokers.join(","),
            topic = %config.topic,
            "Kafka producer created"
        );

        Ok(Self {
            producer,
            consumer: None,
            attempts: AttemptTracker::default(),
            topic: config.topic,
            timeout,
        })
    }

    /// Create a transport that can both publish and consume as part of the configured group.
    pub fn with_consumer(config: &KafkaConfig, timeout: Duration) -> Result<Self, QueueError> {
        let mut queue = Self::producer(config, timeout)?;
        let config = config.normalized();

        let mut consumer_config = ClientConfig::new();
        consumer_config
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false");
        apply_client_settings(&mut consumer_config, &config);

        let consumer: StreamConsumer = consumer_config
            .create()
            .map_err(|e| QueueError::Config(format!("Failed to create consumer: {e}")))?;
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|e| QueueError::Config(format!("Failed to subscribe to {}: {e}", config.topic)))?;

        info!(
            topic = %config.topic,
            group = %config.group_id,
            auto_offset_reset = %config.auto_offset_reset,
            "Kafka consumer subscribed"
        );

        queue.consumer = Some(consumer);
        Ok(queue)
    }

    fn consumer(&self) -> Result<&StreamConsumer, QueueError> {
        self.consumer
            .as_ref()
            .ok_or_else(|| QueueError::Consume("transport has no consumer".to_string()))
    }
}

fn apply_client_settings(client: &mut ClientConfig, config: &KafkaConfig) {
    if let Some(ref client_id) = config.client_id {
        client.set("client.id", client_id);
    }
    if let (Some(username), Some(password)) = (&config.sasl_username, &config.sasl_password) {
        client
            .set("security.protocol", "SASL_SSL")
            .set("sasl.mechanisms", "PLAIN")
            .set("sasl.username", username)
            .set("sasl.password", password);
    }
}

#[async_trait]
impl QueueTransport for KafkaQueue {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn publish(
        &self,
        key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), QueueError> {
        let mut kafka_headers = OwnedHeaders::new();
        for (name, value) in headers {
            kafka_headers = kafka_headers.insert(Header {
                key: name.as_str(),
                value: Some(value.as_str()),
            });
        }

        let record = FutureRecord::to(&self.topic)
            .key(key)
            .payload(payload)
            .headers(kafka_headers);

        match self.producer.send(record, Timeout::After(self.timeout)).await {
            Ok((partition, offset)) => {
                debug!(topic = %self.topic, partition, offset, key, "Message published");
                Ok(())
            }
            Err((kafka_error, _)) => {
                error!(topic = %self.topic, error = %kafka_error, key, "Failed to publish message");
                Err(QueueError::Publish(kafka_error.to_string()))
            }
        }
    }
}

#[async_trait]
impl QueueConsumer for KafkaQueue {
    async fn recv(&self) -> Result<Option<Delivery>, QueueError> {
        let consumer = self.consumer()?;
        let message = consumer
            .recv()
            .await
            .map_err(|e| QueueError::Consume(e.to_string()))?;

        let mut headers = HashMap::new();
        if let Some(kafka_headers) = message.headers() {
            for header in kafka_headers.iter() {
                if let Some(value) = header.value {
                    headers.insert(
                        header.key.to_string(),
                        String::from_utf8_lossy(value).into_owned(),
                    );
                }
            }
        }

        let timestamp = message
            .timestamp()
            .to_millis()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or_else(Utc::now);

        Ok(Some(Delivery {
            message: QueueMessage {
                key: message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .unwrap_or_default(),
                value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                headers,
                timestamp,
            },
            attempt: self
                .attempts
                .attempt(message.topic(), message.partition(), message.offset()),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let consumer = self.consumer()?;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &delivery.topic,
            delivery.partition,
            Offset::Offset(delivery.offset + 1),
        )
        .map_err(|e| QueueError::Ack(e.to_string()))?;

        consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| QueueError::Ack(e.to_string()))?;
        self.attempts.clear(delivery);
        Ok(())
    }

    async fn nack(&self, delivery: Delivery) -> Result<(), QueueError> {
        let consumer = self.consumer()?;
        self.attempts.record_nack(&delivery);
        warn!(
            topic = %delivery.topic,
            partition = delivery.partition,
            offset = delivery.offset,
            attempt = delivery.attempt,
            "Seeking back for redelivery"
        );

        consumer
            .seek(
                &delivery.topic,
                delivery.partition,
                Offset::Offset(delivery.offset),
                Timeout::After(self.timeout),
            )
            .map_err(|e| QueueError::Consume(format!("seek failed: {e}")))
    }
}
