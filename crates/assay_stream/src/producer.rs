use crate::config::KafkaConfig;
use assay_common::{Error, Result};
use rdkafka::{
    ClientConfig,
    producer::{FutureProducer, FutureRecord, Producer},
};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Kafka producer for publishing raw readings.
pub struct KafkaProducer {
    /// The underlying Kafka producer
    producer: FutureProducer,

    /// Topic for raw readings
    raw_readings_topic: String,
}

impl KafkaProducer {
    /// Create a new Kafka producer.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka producer");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("client.id", &config.client_id)
            .set("message.timeout.ms", "5000")
            .set("acks", "all")
            .set("retries", "3")
            .create()
            .map_err(|e| {
                Error::ExternalService(format!("Failed to create Kafka producer: {}", e))
            })?;

        Ok(Self {
            producer,
            raw_readings_topic: config.topics.raw_readings.clone(),
        })
    }

    /// Send a reading to the raw readings topic.
    pub async fn send_reading<T: Serialize>(&self, key: &str, reading: &T) -> Result<()> {
        self.send_to_topic(&self.raw_readings_topic, key, reading)
            .await
    }

    /// Wait for in-flight messages to be delivered.
    pub fn flush(&self) -> Result<()> {
        self.producer
            .flush(Duration::from_secs(10))
            .map_err(|e| Error::ExternalService(format!("Failed to flush Kafka producer: {}", e)))
    }

    /// Send a message to a specific topic.
    async fn send_to_topic<T: Serialize>(&self, topic: &str, key: &str, payload: &T) -> Result<()> {
        let payload = serde_json::to_string(payload)?;

        let record = FutureRecord::to(topic).key(key).payload(&payload);

        self.producer
            .send(record, Duration::from_secs(5))
            .await
            .map_err(|(e, _)| {
                Error::ExternalService(format!("Failed to send message to Kafka: {}", e))
            })?;

        Ok(())
    }
}
