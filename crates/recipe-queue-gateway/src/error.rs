use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transient broker error: {0}")]
    Transient(#[from] lapin::Error),

    #[error("message could not be decoded: {0}")]
    Poison(#[from] serde_json::Error),

    #[error("topology declaration conflict for queue '{queue}': {source}")]
    TopologyConflict { queue: String, source: lapin::Error },

    #[error("fatal broker error: {0}")]
    Fatal(String),
}
