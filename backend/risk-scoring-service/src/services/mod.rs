pub mod archive;
pub mod bus;
pub mod consumer;

pub use archive::{archive_key, ArchiveConfig, RawEventArchive, RotationOutcome};
pub use bus::{BusMessage, EventSource, KafkaConfig, KafkaEventSource};
pub use consumer::{ConsumerConfig, ConsumerStats, RiskEventConsumer};
