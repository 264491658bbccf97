//! Ambient observability sink: consumes `metrics_queue`, validates each
//! envelope against the shared schema table, and logs it structurally.
//! Carries no business logic of its own — a metric that fails validation
//! is dead-lettered, never retried, since redelivery cannot make a
//! malformed metric well-formed.

use futures::StreamExt;
use recipe_queue_gateway::{decode_envelope, BrokerConfig, DeliveryHandle, QueueGateway};
use recipe_workflow_core::{Payload, SchemaTable};
use tracing::{error, info, warn};

async fn run_metrics_consumer(gateway: &QueueGateway, queue: &str, prefetch: u16) -> anyhow::Result<()> {
    let channel = gateway.channel().await?;
    let mut consumer = gateway
        .consume(&channel, queue, prefetch, "metrics-consumer")
        .await?;

    let schema = SchemaTable::new();

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(error = %err, "metrics consumer stream error");
                continue;
            }
        };

        let envelope = decode_envelope(&delivery.data);
        let handle = DeliveryHandle::new(delivery);
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "undecodable metric envelope, nacking to dlq");
                let _ = handle.nack_dlq().await;
                continue;
            }
        };

        match schema.validate(&envelope) {
            Ok(Payload::Metric { event_type, duration, metadata }) => {
                info!(
                    event_type,
                    ?duration,
                    metadata = %metadata,
                    message_id = %envelope.message_id,
                    "metric event"
                );
                let _ = handle.ack().await;
            }
            Ok(_) => {
                warn!(message_id = %envelope.message_id, "unexpected envelope type on metrics_queue, nacking to dlq");
                let _ = handle.nack_dlq().await;
            }
            Err(err) => {
                warn!(message_id = %envelope.message_id, error = %err, "metric validation failed, nacking to dlq");
                let _ = handle.nack_dlq().await;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let broker_config = BrokerConfig::load()?;
    let gateway = QueueGateway::connect(&broker_config).await?;
    let topology_channel = gateway.channel().await?;
    gateway.declare_topology(&topology_channel, &broker_config).await?;

    info!("metrics-consumer consuming {}", broker_config.metrics_queue);

    tokio::select! {
        result = run_metrics_consumer(&gateway, &broker_config.metrics_queue, 10) => {
            if let Err(err) = result {
                error!(error = %err, "metrics consumer exited with an error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
