//! Shared envelope, payload and validation types for the recipe workflow
//! platform. Every other crate in the workspace depends on this one so
//! that the wire format is defined exactly once.

pub mod envelope;
pub mod error;
pub mod metrics;
pub mod recipe;
pub mod retry;
pub mod schema;

pub use envelope::{Envelope, EnvelopeStatus, EnvelopeType, ErrorDetail};
pub use error::ValidationError;
pub use metrics::MetricEvent;
pub use recipe::{Recipe, RecipeIngredient, RecipeSinkPayload};
pub use retry::TaskRetryBudget;
pub use schema::{Payload, SchemaTable, WorkflowInitiatePayload};
