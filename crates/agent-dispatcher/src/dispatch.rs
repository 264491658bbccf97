use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lapin::Channel;
use recipe_queue_gateway::{DlqRecord, PublishOptions, QueueGateway, QUEUE_AGENT_DLQ, QUEUE_AGENT_TASKS};
use recipe_workflow_core::{Envelope, EnvelopeType, ErrorDetail, SchemaTable, TaskRetryBudget, ValidationError};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::registry::AgentRegistry;

#[derive(Debug, Clone)]
pub struct ActiveTaskRecord {
    pub task_id: Uuid,
    pub agent_id: String,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Dispatched,
    Completed,
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no active agent available for capability '{0}'")]
    NoAgentAvailable(String),
    #[error("agent.task envelope failed validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("gateway error: {0}")]
    Gateway(#[from] recipe_queue_gateway::GatewayError),
}

/// Dispatches tasks to the least-loaded capable agent and tracks them
/// until a result arrives.
pub struct Dispatcher {
    registry: Arc<AgentRegistry>,
    active_tasks: Arc<DashMap<Uuid, ActiveTaskRecord>>,
    waiters: Arc<DashMap<Uuid, oneshot::Sender<ActiveTaskRecord>>>,
    schema: SchemaTable,
}

impl Dispatcher {
    pub fn new(registry: Arc<AgentRegistry>) -> Self {
        Self {
            registry,
            active_tasks: Arc::new(DashMap::new()),
            schema: SchemaTable::new(),
            waiters: Arc::new(DashMap::new()),
        }
    }

    /// Selects an agent, publishes the task, and records it. Publish
    /// failures are retried against the same fixed backoff schedule a
    /// workflow step's agent task uses; once the budget is exhausted the
    /// load increment is rolled back, the record is marked failed, and a
    /// [`DlqRecord`] is best-effort published to `agent.dlq` so the
    /// failure is visible without relying on the broker's own
    /// dead-lettering alone. The gateway and channel are passed in rather
    /// than owned, so a `Dispatcher` can be constructed and exercised in
    /// tests without a live broker connection.
    pub async fn dispatch(
        &self,
        gateway: &QueueGateway,
        channel: &Channel,
        required_capability: &str,
        workflow_type: &str,
        workflow_payload: serde_json::Value,
    ) -> Result<Uuid, DispatchError> {
        let agent_id = self
            .registry
            .select(required_capability)
            .ok_or_else(|| DispatchError::NoAgentAvailable(required_capability.to_string()))?;

        self.registry.increment_load(&agent_id);

        let task_id = Uuid::new_v4();
        let mut envelope = Envelope::new(
            EnvelopeType::AgentTask,
            json!({
                "workflow_type": workflow_type,
                "workflow_payload": workflow_payload,
                "target_agent_id": agent_id,
            }),
        );
        envelope.metadata.insert(
            "task_id".to_string(),
            serde_json::Value::String(task_id.to_string()),
        );

        if let Err(err) = self.schema.validate(&envelope) {
            warn!(agent_id, %task_id, error = %err, "agent.task envelope failed validation, not dispatching");
            self.registry.decrement_load(&agent_id);
            return Err(DispatchError::Validation(err));
        }

        let publish_opts = PublishOptions::new().with_header("target_agent", agent_id.clone());

        let mut budget = TaskRetryBudget::new();
        let last_err = loop {
            match gateway
                .publish(channel, QUEUE_AGENT_TASKS, &envelope, publish_opts.clone())
                .await
            {
                Ok(()) => {
                    self.active_tasks.insert(
                        task_id,
                        ActiveTaskRecord {
                            task_id,
                            agent_id: agent_id.clone(),
                            status: TaskStatus::Dispatched,
                            started_at: Utc::now(),
                            envelope,
                        },
                    );
                    info!(agent_id, %task_id, attempts = budget.attempts(), "task dispatched");
                    return Ok(task_id);
                }
                Err(err) => {
                    warn!(agent_id, error = %err, attempts = budget.attempts(), "dispatch publish failed");
                    match budget.record_failure() {
                        Some(delay) => {
                            envelope.bump_retry();
                            tokio::time::sleep(delay).await;
                        }
                        None => break err,
                    }
                }
            }
        };

        warn!(agent_id, %task_id, "dispatch retry budget exhausted, dead-lettering");
        self.registry.decrement_load(&agent_id);
        envelope.fail_with(ErrorDetail::new("dispatch_exhausted", last_err.to_string()));
        let final_error = envelope.error.clone().expect("fail_with always sets error");

        let dlq_record = DlqRecord::new(QUEUE_AGENT_TASKS, envelope.clone(), final_error.clone());
        if let Ok(body) = serde_json::to_value(&dlq_record) {
            let mut dlq_envelope = envelope.child(EnvelopeType::AgentTask, body);
            dlq_envelope.fail_with(final_error);
            if let Err(err) = gateway
                .publish(channel, QUEUE_AGENT_DLQ, &dlq_envelope, PublishOptions::new())
                .await
            {
                error!(agent_id, %task_id, error = %err, "failed to publish to dlq, task is now unrecoverable");
            }
        }

        self.active_tasks.insert(
            task_id,
            ActiveTaskRecord {
                task_id,
                agent_id,
                status: TaskStatus::Failed,
                started_at: Utc::now(),
                envelope,
            },
        );
        Err(DispatchError::Gateway(last_err))
    }

    /// Registers a rendezvous for a caller that wants to await this
    /// specific task's result rather than poll.
    pub fn await_result(&self, task_id: Uuid) -> oneshot::Receiver<ActiveTaskRecord> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(task_id, tx);
        rx
    }

    /// Marks every still-`Dispatched` record belonging to `agent_id` as
    /// `Failed` and wakes any waiter awaiting one of them. Called right
    /// after `AgentRegistry::deregister` so a deregistered agent's
    /// in-flight tasks don't sit forever as `Dispatched` with no result
    /// ever going to arrive. Returns the number of records reaped.
    pub fn reap_tasks_for_agent(&self, agent_id: &str) -> usize {
        let stale_task_ids: Vec<Uuid> = self
            .active_tasks
            .iter()
            .filter(|entry| entry.agent_id == agent_id && entry.status == TaskStatus::Dispatched)
            .map(|entry| *entry.key())
            .collect();

        for task_id in &stale_task_ids {
            if let Some(mut record) = self.active_tasks.get_mut(task_id) {
                record.status = TaskStatus::Failed;
            }
            if let Some((_, waiter)) = self.waiters.remove(task_id) {
                if let Some(record) = self.active_tasks.get(task_id) {
                    let _ = waiter.send(record.clone());
                }
            }
        }

        if !stale_task_ids.is_empty() {
            warn!(agent_id, reaped = stale_task_ids.len(), "reaped dispatched tasks for deregistered agent");
        }
        stale_task_ids.len()
    }

    /// Handles an `agent.result` envelope. An unknown `task_id` is a
    /// duplicate or stale result (the record was already resolved once)
    /// and is simply logged — exactly one decrement happens per task.
    pub fn handle_result(&self, task_id: Uuid, error: Option<ErrorDetail>) {
        let Some((_, mut record)) = self.active_tasks.remove(&task_id) else {
            info!(%task_id, "result for unknown or already-resolved task, ignoring");
            return;
        };

        self.registry.decrement_load(&record.agent_id);
        record.status = if error.is_some() {
            self.registry.record_error(&record.agent_id);
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        };

        if let Some((_, waiter)) = self.waiters.remove(&task_id) {
            let _ = waiter.send(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(name: &str) -> std::collections::HashSet<String> {
        [name.to_string()].into_iter().collect()
    }

    /// Inserts an active task record directly, bypassing `dispatch()`
    /// (which needs a live broker), to exercise `handle_result` alone.
    fn seed_dispatched_task(dispatcher: &Dispatcher, agent_id: &str) -> Uuid {
        let task_id = Uuid::new_v4();
        dispatcher.registry.increment_load(agent_id);
        dispatcher.active_tasks.insert(
            task_id,
            ActiveTaskRecord {
                task_id,
                agent_id: agent_id.to_string(),
                status: TaskStatus::Dispatched,
                started_at: Utc::now(),
                envelope: Envelope::new(EnvelopeType::AgentTask, serde_json::json!({})),
            },
        );
        task_id
    }

    #[test]
    fn handling_a_result_decrements_load_exactly_once() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", caps("scrape"));
        let dispatcher = Dispatcher::new(registry.clone());
        let task_id = seed_dispatched_task(&dispatcher, "agent-a");

        dispatcher.handle_result(task_id, None);
        assert_eq!(registry.get("agent-a").unwrap().active_task_count, 0);

        // a duplicate/stale result for the same task_id must not decrement again
        dispatcher.handle_result(task_id, None);
        assert_eq!(registry.get("agent-a").unwrap().active_task_count, 0);
    }

    #[test]
    fn failed_result_records_an_error_against_the_agent() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", caps("scrape"));
        let dispatcher = Dispatcher::new(registry.clone());
        let task_id = seed_dispatched_task(&dispatcher, "agent-a");

        dispatcher.handle_result(task_id, Some(ErrorDetail::new("timeout", "agent timed out")));
        assert_eq!(registry.get("agent-a").unwrap().health.error_count, 1);
    }

    #[test]
    fn reaping_only_touches_dispatched_tasks_for_that_agent() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", caps("scrape"));
        registry.register("agent-b", caps("scrape"));
        let dispatcher = Dispatcher::new(registry);

        let still_dispatched = seed_dispatched_task(&dispatcher, "agent-a");
        let already_resolved = seed_dispatched_task(&dispatcher, "agent-a");
        dispatcher.handle_result(already_resolved, None);
        let other_agent = seed_dispatched_task(&dispatcher, "agent-b");

        let reaped = dispatcher.reap_tasks_for_agent("agent-a");

        assert_eq!(reaped, 1);
        assert_eq!(
            dispatcher.active_tasks.get(&still_dispatched).unwrap().status,
            TaskStatus::Failed
        );
        assert_eq!(
            dispatcher.active_tasks.get(&other_agent).unwrap().status,
            TaskStatus::Dispatched
        );
    }

    #[tokio::test]
    async fn await_result_resolves_once_handle_result_runs() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", caps("scrape"));
        let dispatcher = Dispatcher::new(registry);
        let task_id = seed_dispatched_task(&dispatcher, "agent-a");

        let rx = dispatcher.await_result(task_id);
        dispatcher.handle_result(task_id, None);
        let record = rx.await.expect("waiter should resolve");
        assert_eq!(record.status, TaskStatus::Completed);
    }
}
