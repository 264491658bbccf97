use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("credential error: {0}")]
    Credential(String),

    #[error("upstream returned an error: {0}")]
    Upstream(String),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("recipe rejected: {0}")]
    Rejected(String),

    #[error("sink unreachable or unauthorized, aborting workflow: {0}")]
    Fatal(String),
}
