use chrono::{DateTime, Utc};
use recipe_workflow_core::{Envelope, ErrorDetail};
use serde::{Deserialize, Serialize};

/// What lands in `agent.dlq` once a retry budget is spent. Distinct from
/// the raw broker dead-lettering (which also happens automatically via
/// queue arguments) in that it captures the retry bookkeeping explicitly
/// for whatever consumes the DLQ for operator visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    pub origin_queue: String,
    pub envelope: Envelope,
    pub final_error: ErrorDetail,
    pub retry_count: u32,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DlqRecord {
    pub fn new(origin_queue: impl Into<String>, envelope: Envelope, final_error: ErrorDetail) -> Self {
        Self {
            origin_queue: origin_queue.into(),
            retry_count: envelope.retry_count,
            envelope,
            final_error,
            dead_lettered_at: Utc::now(),
        }
    }
}
