//! Drives the `recipe_workflow_full` state machine: search, bounded
//! parallel scrape, then save, with a metric emitted at every transition.

pub mod config;
pub mod metrics;
pub mod workflow;

pub use config::OrchestratorConfig;
pub use metrics::MetricsPublisher;
pub use workflow::{WorkflowInstance, WorkflowOrchestrator, WorkflowStatus};
