use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// The closed set of message kinds that flow through the broker.
///
/// `workflow.initiate` starts a workflow; `agent.task` and `agent.result`
/// carry work to and results back from a dispatched agent; `metric`
/// reports a single observability event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    #[serde(rename = "workflow.initiate")]
    WorkflowInitiate,
    #[serde(rename = "agent.task")]
    AgentTask,
    #[serde(rename = "agent.result")]
    AgentResult,
    #[serde(rename = "metric")]
    Metric,
}

impl std::fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            EnvelopeType::WorkflowInitiate => "workflow.initiate",
            EnvelopeType::AgentTask => "agent.task",
            EnvelopeType::AgentResult => "agent.result",
            EnvelopeType::Metric => "metric",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeStatus {
    Pending,
    #[serde(rename = "processing")]
    InProgress,
    Completed,
    Failed,
    Retrying,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// The canonical message envelope. Every field here is part of the wire
/// contract; `metadata` is the only part any component is free to add to
/// without a schema change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub envelope_type: EnvelopeType,
    pub status: EnvelopeStatus,
    pub payload: Value,
    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Envelope {
    pub fn new(envelope_type: EnvelopeType, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            message_id: Uuid::new_v4(),
            parent_message_id: None,
            envelope_type,
            status: EnvelopeStatus::Pending,
            payload,
            retry_count: 0,
            max_retries: 3,
            created_at: now,
            updated_at: now,
            error: None,
            metadata: Map::new(),
        }
    }

    pub fn child(&self, envelope_type: EnvelopeType, payload: Value) -> Self {
        let mut child = Self::new(envelope_type, payload);
        child.parent_message_id = Some(self.message_id);
        child
    }

    /// Marks the envelope failed. `status` and `error` are always set
    /// together so a consumer never observes `Failed` without a reason.
    pub fn fail_with(&mut self, error: ErrorDetail) {
        self.status = EnvelopeStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }

    pub fn mark_in_progress(&mut self) {
        self.status = EnvelopeStatus::InProgress;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self) {
        self.status = EnvelopeStatus::Completed;
        self.updated_at = Utc::now();
    }

    /// Whether another redelivery is still within the soft retry budget.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn bump_retry(&mut self) {
        self.retry_count += 1;
        self.status = EnvelopeStatus::Retrying;
        self.updated_at = Utc::now();
    }
}
