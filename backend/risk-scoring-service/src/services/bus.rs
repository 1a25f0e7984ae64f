use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::Message;
use tracing::{error, info};

use crate::error::{Result, RiskServiceError};

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    /// Bound on the startup metadata fetch that proves a broker is reachable.
    pub connect_timeout: Duration,
}

/// A message lifted off the bus, detached from the client's buffers.
#[derive(Debug, Clone, PartialEq)]
pub struct BusMessage {
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    /// Producer or broker timestamp in unix millis.
    pub timestamp_ms: Option<i64>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[async_trait]
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` means the wait
    /// elapsed with nothing to deliver.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>>;

    /// Acknowledge everything delivered so far.
    async fn commit_offsets(&mut self) -> Result<()>;
}

pub struct KafkaEventSource {
    consumer: StreamConsumer,
}

impl KafkaEventSource {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("group.id", &config.group_id)
            .set("bootstrap.servers", &config.brokers)
            // Offsets are committed only after the store commit succeeds.
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "30000")
            .set("heartbeat.interval.ms", "3000")
            .set("max.poll.interval.ms", "300000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| {
                error!("Failed to create Kafka consumer: {}", e);
                RiskServiceError::Kafka(e.to_string())
            })?;

        consumer.subscribe(&[config.topic.as_str()]).map_err(|e| {
            error!("Failed to subscribe to topic {}: {}", config.topic, e);
            RiskServiceError::Kafka(e.to_string())
        })?;

        // librdkafka connects lazily; fetch metadata so an unreachable
        // cluster fails startup instead of idling forever.
        let metadata = consumer
            .fetch_metadata(Some(&config.topic), config.connect_timeout)
            .map_err(|e| {
                error!(brokers = %config.brokers, "Kafka brokers unreachable: {}", e);
                RiskServiceError::Kafka(format!("metadata fetch failed: {e}"))
            })?;

        info!(
            topic = %config.topic,
            group_id = %config.group_id,
            brokers = %config.brokers,
            broker_count = metadata.brokers().len(),
            "Kafka consumer subscribed"
        );
        Ok(Self { consumer })
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(msg)) => Ok(Some(BusMessage {
                key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                payload: msg.payload().map(<[u8]>::to_vec),
                timestamp_ms: msg.timestamp().to_millis(),
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
            })),
        }
    }

    async fn commit_offsets(&mut self) -> Result<()> {
        self.consumer.commit_consumer_state(CommitMode::Async)?;
        Ok(())
    }
}
