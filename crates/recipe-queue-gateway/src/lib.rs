//! Broker abstraction over `lapin`, plus the topology and dead-letter
//! bookkeeping the platform's queue layer depends on.

pub mod config;
pub mod dlq;
pub mod error;
pub mod gateway;
pub mod topology;

pub use config::BrokerConfig;
pub use dlq::DlqRecord;
pub use error::GatewayError;
pub use gateway::{decode_envelope, DeliveryHandle, PublishOptions, QueueGateway};
pub use topology::{QUEUE_AGENT_DLQ, QUEUE_AGENT_RESULTS, QUEUE_AGENT_TASKS};
