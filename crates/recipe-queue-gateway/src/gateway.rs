use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use recipe_workflow_core::Envelope;
use tracing::{instrument, warn};

use crate::config::BrokerConfig;
use crate::error::GatewayError;
use crate::topology;

/// Extra per-publish routing/diagnostic headers, on top of the
/// `message_id`/`type`/`retry_count` headers every publish carries
/// unconditionally. Used for things like the dispatcher's
/// `target_agent` routing hint.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    headers: Vec<(String, String)>,
}

impl PublishOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Owns the single AMQP connection for a process. Each consumer or
/// producer gets its own [`Channel`] — one task per consumer, sharing the
/// connection but never a channel.
pub struct QueueGateway {
    connection: Connection,
}

impl QueueGateway {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, GatewayError> {
        let connection =
            Connection::connect(&config.amqp_uri(), ConnectionProperties::default()).await?;
        Ok(Self { connection })
    }

    pub async fn channel(&self) -> Result<Channel, GatewayError> {
        Ok(self.connection.create_channel().await?)
    }

    pub async fn declare_topology(
        &self,
        channel: &Channel,
        config: &BrokerConfig,
    ) -> Result<(), GatewayError> {
        topology::declare_topology(channel, config).await
    }

    #[instrument(skip(self, channel, envelope, opts), fields(message_id = %envelope.message_id))]
    pub async fn publish(
        &self,
        channel: &Channel,
        queue: &str,
        envelope: &Envelope,
        opts: PublishOptions,
    ) -> Result<(), GatewayError> {
        let body = serde_json::to_vec(envelope)?;
        let headers = diagnostic_headers(envelope, &opts);
        let props = || {
            BasicProperties::default()
                .with_delivery_mode(2)
                .with_content_type("application/json".into())
                .with_headers(headers.clone())
        };

        let confirm = channel
            .basic_publish("", queue, BasicPublishOptions::default(), &body, props())
            .await;

        match confirm {
            Ok(pending) => {
                pending.await?;
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, queue, "publish failed, retrying once");
                let pending = channel
                    .basic_publish("", queue, BasicPublishOptions::default(), &body, props())
                    .await?;
                pending.await?;
                Ok(())
            }
        }
    }

    /// Sets the channel's prefetch count and begins consuming. The
    /// returned [`Consumer`] is a `futures::Stream<Item = Result<Delivery,
    /// lapin::Error>>`; callers decode each delivery with
    /// [`decode_envelope`] and resolve it with exactly one of
    /// `ack`/`nack_requeue`/`nack_dlq`.
    pub async fn consume(
        &self,
        channel: &Channel,
        queue: &str,
        prefetch: u16,
        consumer_tag: &str,
    ) -> Result<Consumer, GatewayError> {
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;
        Ok(consumer)
    }
}

/// Builds the `message_id`/`type`/`retry_count` headers every publish
/// carries, plus whatever extra diagnostic/routing headers the caller
/// passed in via [`PublishOptions`].
fn diagnostic_headers(envelope: &Envelope, opts: &PublishOptions) -> FieldTable {
    let mut table = FieldTable::default();
    table.insert(
        ShortString::from("message_id"),
        AMQPValue::LongString(LongString::from(envelope.message_id.to_string())),
    );
    table.insert(
        ShortString::from("type"),
        AMQPValue::LongString(LongString::from(envelope.envelope_type.to_string())),
    );
    table.insert(
        ShortString::from("retry_count"),
        AMQPValue::LongLongInt(envelope.retry_count as i64),
    );
    for (key, value) in &opts.headers {
        table.insert(
            ShortString::from(key.as_str()),
            AMQPValue::LongString(LongString::from(value.as_str())),
        );
    }
    table
}

/// Decodes a delivery body into an [`Envelope`]. A decode failure is a
/// poison message: the caller should `nack_dlq` immediately rather than
/// attempt a retry.
pub fn decode_envelope(data: &[u8]) -> Result<Envelope, GatewayError> {
    Ok(serde_json::from_slice(data)?)
}

/// Resolves a single delivery. Every delivery must be resolved exactly
/// once via `ack`, `nack_requeue`, or `nack_dlq`.
pub struct DeliveryHandle {
    delivery: lapin::message::Delivery,
}

impl DeliveryHandle {
    pub fn new(delivery: lapin::message::Delivery) -> Self {
        Self { delivery }
    }

    pub async fn ack(self) -> Result<(), GatewayError> {
        self.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    /// Transient failure: requeue for another delivery attempt.
    pub async fn nack_requeue(self) -> Result<(), GatewayError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue: true,
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Poison or retry-exhausted message: the broker routes this to the
    /// queue's dead-letter-exchange per its declared arguments.
    pub async fn nack_dlq(self) -> Result<(), GatewayError> {
        self.delivery
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await?;
        Ok(())
    }
}
