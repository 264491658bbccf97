use async_trait::async_trait;
use recipe_workflow_core::{MetricEvent, Recipe};

use crate::error::{CollaboratorError, SinkError};

/// Looks up candidate recipe URLs for a query. Implementations own their
/// own retry policy and report attempt counts through the returned
/// metrics rather than the orchestrator reimplementing a retry loop.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        excluded_domains: &[String],
        number_of_urls: u32,
    ) -> Result<(Vec<String>, Vec<MetricEvent>), CollaboratorError>;
}

/// Scrapes and parses a single URL into a [`Recipe`]. Never returns an
/// `Err` for "this page wasn't a recipe" — that is `Ok((None, metrics))`.
/// An `Err` means the scrape step itself could not run at all.
#[async_trait]
pub trait ScrapeStep: Send + Sync {
    async fn scrape(&self, url: &str) -> (Option<Recipe>, Vec<MetricEvent>);
}

/// The LLM call boundary used by a [`ScrapeStep`] implementation to turn
/// page text into structured recipe JSON.
#[async_trait]
pub trait TextCompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError>;
}

/// Persists a parsed recipe. `Err(SinkError::Rejected)` is a per-recipe
/// failure the workflow can continue past; `Err(SinkError::Fatal)` aborts
/// the whole save step.
#[async_trait]
pub trait RecipeSink: Send + Sync {
    async fn create(
        &self,
        recipe: &recipe_workflow_core::RecipeSinkPayload,
    ) -> Result<String, SinkError>;
}

/// Supplies a bearer token for calls to the recipe-sink API.
#[async_trait]
pub trait Credentials: Send + Sync {
    async fn token(&self) -> Result<String, CollaboratorError>;
}
