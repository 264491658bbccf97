use async_trait::async_trait;
use lapin::Channel;
use recipe_queue_gateway::{PublishOptions, QueueGateway};
use recipe_workflow_core::MetricEvent;
use std::sync::Arc;
use tracing::warn;

/// Where workflow lifecycle metrics go. Kept as a trait so the
/// orchestrator's state machine can be unit tested without a broker —
/// [`MetricsPublisher`] is the production broker-backed implementation.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn publish(&self, event: MetricEvent);
}

/// Publishes metric events to the broker's metrics queue. Every call is
/// best-effort: a failure is logged and dropped, never propagated to the
/// workflow step that triggered it — metrics publishing must never block
/// or fail a workflow.
pub struct MetricsPublisher {
    gateway: Arc<QueueGateway>,
    channel: Channel,
    queue: String,
}

impl MetricsPublisher {
    pub fn new(gateway: Arc<QueueGateway>, channel: Channel, queue: impl Into<String>) -> Self {
        Self {
            gateway,
            channel,
            queue: queue.into(),
        }
    }
}

#[async_trait]
impl MetricsSink for MetricsPublisher {
    async fn publish(&self, event: MetricEvent) {
        let event_type = event.event_type.clone();
        let envelope = event.into_envelope();
        if let Err(err) = self
            .gateway
            .publish(&self.channel, &self.queue, &envelope, PublishOptions::new())
            .await
        {
            warn!(event_type, error = %err, "failed to publish metric, dropping");
        }
    }
}

/// Records every published event in memory, for assertions in tests.
#[derive(Default)]
pub struct RecordingMetricsSink {
    pub events: tokio::sync::Mutex<Vec<MetricEvent>>,
}

#[async_trait]
impl MetricsSink for RecordingMetricsSink {
    async fn publish(&self, event: MetricEvent) {
        self.events.lock().await.push(event);
    }
}
