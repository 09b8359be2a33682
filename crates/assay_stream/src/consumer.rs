use crate::config::KafkaConfig;
use assay_common::{Error, Result};
use async_trait::async_trait;
use rdkafka::{
    ClientConfig, Message,
    consumer::{Consumer, StreamConsumer},
};
use std::collections::VecDeque;
use tracing::info;

/// An ordered source of raw message payloads.
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next payload in delivery order.
    ///
    /// `None` means the source is closed and no more messages will arrive.
    async fn next_payload(&mut self) -> Option<Result<Vec<u8>>>;
}

/// Kafka consumer for the raw readings topic.
pub struct KafkaConsumer {
    /// The underlying Kafka consumer
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer subscribed to the raw readings topic.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        info!("Initializing Kafka consumer");

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                Error::ExternalService(format!("Failed to create Kafka consumer: {}", e))
            })?;

        let topic = config.topics.raw_readings.as_str();
        consumer
            .subscribe(&[topic])
            .map_err(|e| Error::ExternalService(format!("Failed to subscribe to topic: {}", e)))?;

        info!("Subscribed to topic: {}", topic);

        Ok(Self { consumer })
    }

    /// Stop consuming messages.
    pub fn stop(&self) {
        info!("Stopping Kafka consumer");
        self.consumer.unsubscribe();
    }
}

#[async_trait]
impl MessageSource for KafkaConsumer {
    async fn next_payload(&mut self) -> Option<Result<Vec<u8>>> {
        let result = match self.consumer.recv().await {
            Ok(message) => Ok(message.payload().map(<[u8]>::to_vec).unwrap_or_default()),
            Err(e) => Err(Error::StreamProcessing(format!(
                "Error receiving message: {}",
                e
            ))),
        };

        Some(result)
    }
}

/// In-memory message source.
///
/// Once drained it either reports itself closed or stays silent forever,
/// the way an idle topic does.
#[derive(Debug, Default)]
pub struct MemorySource {
    messages: VecDeque<Result<Vec<u8>>>,
    close_when_drained: bool,
}

impl MemorySource {
    /// A source that closes after delivering `payloads`.
    pub fn new<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        Self {
            messages: payloads.into_iter().map(|p| Ok(p.into())).collect(),
            close_when_drained: true,
        }
    }

    /// Keep the source open once drained instead of closing it.
    pub fn idle_when_drained(mut self) -> Self {
        self.close_when_drained = false;
        self
    }

    /// Queue a receive error after the messages pushed so far.
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.messages
            .push_back(Err(Error::StreamProcessing(message.into())));
    }

    /// Queue another payload.
    pub fn push(&mut self, payload: impl Into<Vec<u8>>) {
        self.messages.push_back(Ok(payload.into()));
    }
}

#[async_trait]
impl MessageSource for MemorySource {
    async fn next_payload(&mut self) -> Option<Result<Vec<u8>>> {
        if let Some(message) = self.messages.pop_front() {
            return Some(message);
        }

        if self.close_when_drained {
            None
        } else {
            std::future::pending().await
        }
    }
}
