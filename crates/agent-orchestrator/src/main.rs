use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use recipe_collaborators::{
    HttpRecipeSink, HttpTextCompletionProvider, HttpWebSearch, LlmScrapeStep,
    ServiceAccountCredentials,
};
use recipe_queue_gateway::{decode_envelope, BrokerConfig, DeliveryHandle, QueueGateway};
use recipe_workflow_core::{Payload, SchemaTable};
use tracing::{error, info, warn};

use agent_orchestrator::{MetricsPublisher, OrchestratorConfig, WorkflowOrchestrator};

/// Reads required configuration from the environment, failing fast at
/// startup rather than lazily the first time a collaborator is called.
struct CollaboratorEndpoints {
    web_search_endpoint: String,
    llm_completion_endpoint: String,
    llm_api_key: String,
    recipe_sink_base_url: String,
}

impl CollaboratorEndpoints {
    fn load() -> anyhow::Result<Self> {
        Ok(Self {
            web_search_endpoint: std::env::var("WEB_SEARCH_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9100/search".to_string()),
            llm_completion_endpoint: std::env::var("LLM_COMPLETION_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9200/complete".to_string()),
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or_default(),
            recipe_sink_base_url: std::env::var("RECIPE_SINK_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:9300".to_string()),
        })
    }
}

/// Consumes `workflow_messages`: validates each envelope against the
/// schema table and spawns one `tokio::task` per accepted workflow so
/// that instances run concurrently and independently. A validation
/// failure nacks straight to the DLQ rather than being retried — a
/// malformed envelope never becomes parseable by redelivery.
async fn run_workflow_consumer(
    gateway: Arc<QueueGateway>,
    orchestrator: Arc<WorkflowOrchestrator>,
    queue: String,
    prefetch: u16,
) {
    let channel = match gateway.channel().await {
        Ok(channel) => channel,
        Err(err) => {
            error!(error = %err, "failed to open workflow_messages channel");
            return;
        }
    };

    let mut consumer = match gateway
        .consume(&channel, &queue, prefetch, "recipe-orchestrator-workflows")
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            error!(error = %err, "failed to start workflow_messages consumer");
            return;
        }
    };

    let schema = SchemaTable::new();

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(error = %err, "workflow consumer stream error");
                continue;
            }
        };

        let envelope = decode_envelope(&delivery.data);
        let handle = DeliveryHandle::new(delivery);
        let envelope = match envelope {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "undecodable workflow envelope, nacking to dlq");
                let _ = handle.nack_dlq().await;
                continue;
            }
        };

        match schema.validate(&envelope) {
            Ok(Payload::WorkflowInitiate { workflow_type, payload }) => {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator.run_recipe_workflow_full(workflow_type, payload).await;
                });
                let _ = handle.ack().await;
            }
            Ok(_) => {
                warn!(
                    message_id = %envelope.message_id,
                    "unexpected envelope type on workflow_messages, nacking to dlq"
                );
                let _ = handle.nack_dlq().await;
            }
            Err(err) => {
                warn!(message_id = %envelope.message_id, error = %err, "validation failed, nacking to dlq");
                let _ = handle.nack_dlq().await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let broker_config = BrokerConfig::load()?;
    let orchestrator_config = OrchestratorConfig::load()?;
    let endpoints = CollaboratorEndpoints::load()?;

    let gateway = Arc::new(QueueGateway::connect(&broker_config).await?);
    let topology_channel = gateway.channel().await?;
    gateway.declare_topology(&topology_channel, &broker_config).await?;

    let metrics_channel = gateway.channel().await?;
    let metrics = Arc::new(MetricsPublisher::new(
        gateway.clone(),
        metrics_channel,
        broker_config.metrics_queue.clone(),
    ));

    let llm = Arc::new(HttpTextCompletionProvider::new(
        endpoints.llm_completion_endpoint,
        endpoints.llm_api_key,
    ));
    let search = Arc::new(HttpWebSearch::new(endpoints.web_search_endpoint));
    let scrape = Arc::new(LlmScrapeStep::new(llm));
    let credentials = Arc::new(ServiceAccountCredentials::new());
    let sink = Arc::new(HttpRecipeSink::new(endpoints.recipe_sink_base_url, credentials));

    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        orchestrator_config.clone(),
        metrics,
        search,
        scrape,
        sink,
    ));

    let consumer_handle = tokio::spawn(run_workflow_consumer(
        gateway.clone(),
        orchestrator.clone(),
        broker_config.workflow_messages_queue.clone(),
        1,
    ));

    info!("recipe-orchestrator consuming workflow_messages");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining in-flight workflows");

    consumer_handle.abort();
    tokio::time::sleep(Duration::from_secs(
        orchestrator_config.shutdown_grace_seconds,
    ))
    .await;

    Ok(())
}
