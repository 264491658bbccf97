use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use recipe_queue_gateway::{
    decode_envelope, BrokerConfig, DeliveryHandle, QueueGateway, QUEUE_AGENT_RESULTS,
};
use recipe_workflow_core::EnvelopeType;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use agent_dispatcher::{AgentRegistry, DispatchError, Dispatcher, DispatcherConfig, NoopAgentSupervisor};

#[derive(Clone)]
struct AppState {
    registry: Arc<AgentRegistry>,
    dispatcher: Arc<Dispatcher>,
    gateway: Arc<QueueGateway>,
    dispatch_channel: Arc<lapin::Channel>,
}

#[derive(Debug, Deserialize)]
struct DispatchTaskRequest {
    required_capability: String,
    workflow_type: String,
    workflow_payload: serde_json::Value,
}

async fn dispatch_task(
    State(state): State<AppState>,
    Json(req): Json<DispatchTaskRequest>,
) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
    state
        .dispatcher
        .dispatch(
            &state.gateway,
            &state.dispatch_channel,
            &req.required_capability,
            &req.workflow_type,
            req.workflow_payload,
        )
        .await
        .map(|task_id| Json(serde_json::json!({ "task_id": task_id })))
        .map_err(|err| {
            warn!(error = %err, "dispatch request failed");
            match err {
                DispatchError::Validation(_) => axum::http::StatusCode::BAD_REQUEST,
                DispatchError::NoAgentAvailable(_) | DispatchError::Gateway(_) => {
                    axum::http::StatusCode::SERVICE_UNAVAILABLE
                }
            }
        })
}

#[derive(Debug, Deserialize)]
struct RegisterAgentRequest {
    agent_id: String,
    capabilities: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatRequest {
    agent_id: String,
}

async fn register_agent(
    State(state): State<AppState>,
    Json(req): Json<RegisterAgentRequest>,
) -> &'static str {
    state.registry.register(req.agent_id, req.capabilities);
    "registered"
}

async fn deregister_agent(
    State(state): State<AppState>,
    Json(req): Json<HeartbeatRequest>,
) -> &'static str {
    if state.registry.deregister(&req.agent_id) {
        state.dispatcher.reap_tasks_for_agent(&req.agent_id);
        "deregistered"
    } else {
        "unknown agent"
    }
}

async fn heartbeat(State(state): State<AppState>, Json(req): Json<HeartbeatRequest>) -> &'static str {
    state.registry.heartbeat(&req.agent_id);
    "ok"
}

async fn healthz() -> &'static str {
    "ok"
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/agents/register", post(register_agent))
        .route("/agents/deregister", post(deregister_agent))
        .route("/agents/heartbeat", post(heartbeat))
        .route("/tasks/dispatch", post(dispatch_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Consumes `agent.results`, decoding the `task_id` out of each
/// envelope's metadata and the optional `error` field, and feeds them to
/// the dispatcher. A decode failure is routed straight to the DLQ rather
/// than retried — it can never become parseable by redelivery.
async fn run_results_consumer(gateway: Arc<QueueGateway>, dispatcher: Arc<Dispatcher>, prefetch: u16) {
    let channel = match gateway.channel().await {
        Ok(channel) => channel,
        Err(err) => {
            error!(error = %err, "failed to open results channel");
            return;
        }
    };

    let mut consumer = match gateway
        .consume(&channel, QUEUE_AGENT_RESULTS, prefetch, "agent-dispatcher-results")
        .await
    {
        Ok(consumer) => consumer,
        Err(err) => {
            error!(error = %err, "failed to start results consumer");
            return;
        }
    };

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(err) => {
                warn!(error = %err, "results consumer stream error");
                continue;
            }
        };

        let decoded = decode_envelope(&delivery.data);
        let handle = DeliveryHandle::new(delivery);
        let envelope = match decoded {
            Ok(envelope) if envelope.envelope_type == EnvelopeType::AgentResult => envelope,
            Ok(_) => {
                warn!("unexpected envelope type on agent.results, nacking to dlq");
                let _ = handle.nack_dlq().await;
                continue;
            }
            Err(err) => {
                warn!(error = %err, "undecodable result envelope, nacking to dlq");
                let _ = handle.nack_dlq().await;
                continue;
            }
        };

        let task_id = envelope
            .metadata
            .get("task_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok());

        match task_id {
            Some(task_id) => {
                dispatcher.handle_result(task_id, envelope.error.clone());
            }
            None => warn!(message_id = %envelope.message_id, "result envelope missing task_id metadata"),
        }

        let _ = handle.ack().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let broker_config = BrokerConfig::load()?;
    let dispatcher_config = DispatcherConfig::load()?;

    let gateway = Arc::new(QueueGateway::connect(&broker_config).await?);
    let topology_channel = gateway.channel().await?;
    gateway.declare_topology(&topology_channel, &broker_config).await?;

    let registry = Arc::new(AgentRegistry::new());
    let dispatcher = Arc::new(Dispatcher::new(registry.clone()));

    tokio::spawn(agent_dispatcher::run_health_check_loop(
        registry.clone(),
        Arc::new(NoopAgentSupervisor),
    ));
    tokio::spawn(run_results_consumer(
        gateway.clone(),
        dispatcher.clone(),
        dispatcher_config.result_queue_prefetch,
    ));

    let dispatch_channel = Arc::new(gateway.channel().await?);
    let state = AppState {
        registry,
        dispatcher,
        gateway,
        dispatch_channel,
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
    info!("agent-dispatcher listening on 0.0.0.0:8081");
    let grace = Duration::from_secs(dispatcher_config.shutdown_grace_seconds);
    let serving = axum::serve(listener, router).with_graceful_shutdown(ctrl_c_signal());
    if tokio::time::timeout(grace, serving).await.is_err() {
        warn!(grace_seconds = grace.as_secs(), "shutdown grace period elapsed, dropping remaining connections");
    }

    Ok(())
}

/// Resolves on Ctrl+C, telling axum to stop accepting new connections and
/// begin draining in-flight ones. The drain itself is bounded from the
/// outside by the `timeout(grace, ..)` wrapped around `serve` in `main`,
/// mirroring `recipe-orchestrator`'s ctrl_c-then-grace shutdown.
async fn ctrl_c_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, draining in-flight requests");
}
