use thiserror::Error;

/// Raised by [`crate::schema::SchemaTable::validate`]. Always non-retriable
/// at the queue level — a malformed or unrecognized message is routed
/// straight to the dead-letter queue rather than requeued.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unknown workflow_type '{0}'")]
    UnknownWorkflowType(String),

    #[error("unknown envelope type '{0}'")]
    UnknownEnvelopeType(String),

    #[error("missing required field '{field}' for {context}")]
    MissingField { field: String, context: String },

    #[error("field '{field}' out of range: {reason}")]
    OutOfRange { field: String, reason: String },

    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
