use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use recipe_collaborators::{RecipeSink, ScrapeStep, SinkError, WebSearch};
use recipe_workflow_core::{ErrorDetail, MetricEvent, Recipe, WorkflowInitiatePayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::metrics::MetricsSink;

/// The `recipe_workflow_full` state machine. `Failed` is reachable from
/// every non-terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    SearchInProgress,
    SearchCompleted,
    ScrapeInProgress,
    ScrapeCompleted,
    SaveInProgress,
    SaveCompleted,
    Completed,
    Failed { error: ErrorDetail },
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed { .. })
    }

    /// The snake_case label carried in the `"<workflow_type>.status"`
    /// metric's `status` field — the same string the `state` tag
    /// serializes to, without requiring callers to round-trip through JSON.
    pub fn label(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::SearchInProgress => "search_in_progress",
            WorkflowStatus::SearchCompleted => "search_completed",
            WorkflowStatus::ScrapeInProgress => "scrape_in_progress",
            WorkflowStatus::ScrapeCompleted => "scrape_completed",
            WorkflowStatus::SaveInProgress => "save_in_progress",
            WorkflowStatus::SaveCompleted => "save_completed",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed { .. } => "failed",
        }
    }
}

/// A single in-flight (or finished, until it is swept out) workflow.
/// Exists only in memory for the lifetime of the process — nothing here
/// survives a restart.
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    pub workflow_id: Uuid,
    pub workflow_type: String,
    pub payload: WorkflowInitiatePayload,
    pub status: WorkflowStatus,
    pub current_step: Option<String>,
    pub context_data: Map<String, Value>,
    pub start_timestamp: DateTime<Utc>,
    pub last_updated_timestamp: DateTime<Utc>,
    pub error_details: Option<ErrorDetail>,
}

impl WorkflowInstance {
    fn new(workflow_type: String, payload: WorkflowInitiatePayload) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: Uuid::new_v4(),
            workflow_type,
            payload,
            status: WorkflowStatus::Pending,
            current_step: None,
            context_data: Map::new(),
            start_timestamp: now,
            last_updated_timestamp: now,
            error_details: None,
        }
    }

    fn transition(&mut self, status: WorkflowStatus, step: Option<&str>) {
        self.status = status;
        self.current_step = step.map(str::to_string);
        self.last_updated_timestamp = Utc::now();
    }
}

/// Drives every live workflow instance. Cheap to clone: the instance map
/// and collaborators are all behind `Arc`, matching the teacher's
/// `Arc<RwLock<HashMap<..>>>` ownership style but with `DashMap` for
/// per-entry locking instead of a single global lock.
pub struct WorkflowOrchestrator {
    config: OrchestratorConfig,
    instances: Arc<DashMap<Uuid, WorkflowInstance>>,
    metrics: Arc<dyn MetricsSink>,
    search: Arc<dyn WebSearch>,
    scrape: Arc<dyn ScrapeStep>,
    sink: Arc<dyn RecipeSink>,
}

impl WorkflowOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        metrics: Arc<dyn MetricsSink>,
        search: Arc<dyn WebSearch>,
        scrape: Arc<dyn ScrapeStep>,
        sink: Arc<dyn RecipeSink>,
    ) -> Self {
        Self {
            config,
            instances: Arc::new(DashMap::new()),
            metrics,
            search,
            scrape,
            sink,
        }
    }

    pub fn status_of(&self, workflow_id: Uuid) -> Option<WorkflowStatus> {
        self.instances.get(&workflow_id).map(|entry| entry.status.clone())
    }

    /// Registers a new instance and runs it to completion. Multiple
    /// instances run concurrently and independently; within one instance,
    /// steps are strictly sequential.
    #[instrument(skip(self, payload), fields(workflow_type = %workflow_type))]
    pub async fn run_recipe_workflow_full(
        &self,
        workflow_type: String,
        payload: WorkflowInitiatePayload,
    ) -> Uuid {
        let instance = WorkflowInstance::new(workflow_type, payload);
        let workflow_id = instance.workflow_id;
        self.instances.insert(workflow_id, instance);

        let search_query = self.instances.get(&workflow_id).unwrap().payload.search_query.clone();
        let started = Instant::now();

        match self.execute(workflow_id, &search_query).await {
            Ok(()) => {
                self.set_status(workflow_id, WorkflowStatus::Completed, None).await;
                self.emit(
                    MetricEvent::new("workflow.completed")
                        .with_duration(started.elapsed().as_secs_f64())
                        .with_meta("workflow_id", workflow_id.to_string()),
                )
                .await;
            }
            Err(error) => {
                warn!(workflow_id = %workflow_id, error = %error.message, "workflow failed");
                self.set_status(workflow_id, WorkflowStatus::Failed { error: error.clone() }, None).await;
                self.emit(
                    MetricEvent::new("workflow.failed")
                        .with_duration(started.elapsed().as_secs_f64())
                        .with_meta("workflow_id", workflow_id.to_string())
                        .with_meta("error", error.message),
                )
                .await;
            }
        }

        self.instances.remove(&workflow_id);
        workflow_id
    }

    async fn execute(&self, workflow_id: Uuid, search_query: &str) -> Result<(), ErrorDetail> {
        let urls = self.run_search_step(workflow_id).await?;
        let recipes = self.run_scrape_step(workflow_id, &urls).await;
        self.run_save_step(workflow_id, recipes, search_query).await?;
        Ok(())
    }

    async fn run_search_step(&self, workflow_id: Uuid) -> Result<Vec<String>, ErrorDetail> {
        self.set_status(workflow_id, WorkflowStatus::SearchInProgress, Some("search")).await;

        let (query, excluded, number_of_urls) = {
            let instance = self.instances.get(&workflow_id).unwrap();
            (
                instance.payload.search_query.clone(),
                instance.payload.excluded_domains.clone(),
                instance.payload.number_of_urls,
            )
        };

        let started = Instant::now();
        let (urls, metrics) = self
            .search
            .search(&query, &excluded, number_of_urls)
            .await
            .map_err(|err| ErrorDetail::new("search_failed", err.to_string()))?;

        let attempts = metrics
            .iter()
            .find_map(|m| m.metadata.get("attempts").cloned());
        for metric in metrics {
            self.emit(metric).await;
        }
        if urls.is_empty() {
            info!(workflow_id = %workflow_id, "search returned no URLs");
        }

        self.with_instance(workflow_id, |instance| {
            instance
                .context_data
                .insert("recipe_search_results".to_string(), serde_json::json!(urls));
        });
        let mut completed = MetricEvent::new("recipe.search_completed")
            .with_duration(started.elapsed().as_secs_f64())
            .with_meta("workflow_id", workflow_id.to_string())
            .with_meta("result_count", urls.len() as u64);
        if let Some(attempts) = attempts {
            completed = completed.with_meta("attempts", attempts);
        }
        self.emit(completed).await;
        self.set_status(workflow_id, WorkflowStatus::SearchCompleted, Some("search")).await;

        Ok(urls)
    }

    /// Fans out scrapes up to `scrape_concurrency` at a time while
    /// preserving input order in the result, independent of which scrape
    /// finishes first (`buffered` keeps results in submission order;
    /// `buffer_unordered` would not). A scrape-level failure produces
    /// exactly one failure metric for that URL and does not block the
    /// others — it is not retried here, unlike agent-task dispatch, since
    /// a single bad page is not worth a second round trip.
    async fn run_scrape_step(&self, workflow_id: Uuid, urls: &[String]) -> Vec<Option<Recipe>> {
        self.set_status(workflow_id, WorkflowStatus::ScrapeInProgress, Some("scrape")).await;
        self.emit(
            MetricEvent::new("recipe.scraping_started")
                .with_meta("workflow_id", workflow_id.to_string())
                .with_meta("url_count", urls.len() as u64),
        )
        .await;

        let concurrency = if self.config.scrape_concurrency == 0 {
            urls.len().max(1)
        } else {
            self.config.scrape_concurrency
        };

        let scrape = self.scrape.clone();
        let results: Vec<(Option<Recipe>, Vec<MetricEvent>)> = stream::iter(urls.iter().cloned())
            .map(|url| {
                let scrape = scrape.clone();
                async move { scrape.scrape(&url).await }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut recipes = Vec::with_capacity(results.len());
        for (recipe, metrics) in results {
            for metric in metrics {
                self.emit(metric).await;
            }
            recipes.push(recipe);
        }

        self.emit(
            MetricEvent::new("recipe.scraping_completed")
                .with_meta("workflow_id", workflow_id.to_string())
                .with_meta("scraped_recipes", recipes.len() as u64),
        )
        .await;
        self.set_status(workflow_id, WorkflowStatus::ScrapeCompleted, Some("scrape")).await;
        recipes
    }

    async fn run_save_step(
        &self,
        workflow_id: Uuid,
        recipes: Vec<Option<Recipe>>,
        search_query: &str,
    ) -> Result<(), ErrorDetail> {
        self.set_status(workflow_id, WorkflowStatus::SaveInProgress, Some("save")).await;

        for recipe in recipes.into_iter().flatten() {
            let payload = recipe.to_sink_payload(search_query);
            match self.sink.create(&payload).await {
                Ok(id) => {
                    self.emit(
                        MetricEvent::new("recipe.saved")
                            .with_meta("workflow_id", workflow_id.to_string())
                            .with_meta("recipe_id", id),
                    )
                    .await;
                }
                Err(SinkError::Rejected(reason)) => {
                    warn!(workflow_id = %workflow_id, reason, "recipe save rejected, continuing");
                    self.emit(
                        MetricEvent::new("recipe.save_failed")
                            .with_meta("workflow_id", workflow_id.to_string())
                            .with_meta("reason", reason),
                    )
                    .await;
                }
                Err(SinkError::Fatal(reason)) => {
                    return Err(ErrorDetail::new("save_fatal", reason));
                }
            }
        }

        self.set_status(workflow_id, WorkflowStatus::SaveCompleted, Some("save")).await;
        Ok(())
    }

    /// Mutates the instance's status and publishes the
    /// `"<workflow_type>.status"` lifecycle metric every transition must
    /// carry, per `{workflow_id, status, current_step}`.
    async fn set_status(&self, workflow_id: Uuid, status: WorkflowStatus, step: Option<&str>) {
        let workflow_type = self.instances.get(&workflow_id).map(|instance| instance.workflow_type.clone());
        let label = status.label();
        self.with_instance(workflow_id, |instance| instance.transition(status.clone(), step));

        if let Some(workflow_type) = workflow_type {
            let mut event = MetricEvent::new(format!("{workflow_type}.status"))
                .with_meta("workflow_id", workflow_id.to_string())
                .with_meta("status", label.to_string());
            if let Some(step) = step {
                event = event.with_meta("current_step", step.to_string());
            }
            self.emit(event).await;
        }
    }

    fn with_instance(&self, workflow_id: Uuid, f: impl FnOnce(&mut WorkflowInstance)) {
        if let Some(mut instance) = self.instances.get_mut(&workflow_id) {
            f(&mut instance);
        }
    }

    async fn emit(&self, event: MetricEvent) {
        self.metrics.publish(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::RecordingMetricsSink;
    use recipe_collaborators::{InMemoryRecipeSink, StaticScrapeStep, StaticWebSearch};
    use recipe_workflow_core::RecipeIngredient;

    fn sample_recipe() -> Recipe {
        Recipe {
            title: "Lasagna".to_string(),
            instructions: vec!["layer".to_string(), "bake".to_string()],
            prep_time: Some("20m".to_string()),
            cook_time: Some("45m".to_string()),
            total_time: Some("65m".to_string()),
            servings: Some("6".to_string()),
            source_url: String::new(),
            notes: None,
            ingredients: vec![RecipeIngredient {
                name: "pasta".to_string(),
                quantity: Some(1.0),
                unit: Some("box".to_string()),
            }],
        }
    }

    fn payload(query: &str, number_of_urls: u32) -> WorkflowInitiatePayload {
        WorkflowInitiatePayload {
            search_query: query.to_string(),
            excluded_domains: vec![],
            number_of_urls,
        }
    }

    #[tokio::test]
    async fn completes_through_every_step_on_the_happy_path() {
        let metrics = Arc::new(RecordingMetricsSink::default());
        let sink = Arc::new(InMemoryRecipeSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(StaticWebSearch(vec!["https://a.example".to_string()])),
            Arc::new(StaticScrapeStep { recipe: Some(sample_recipe()) }),
            sink.clone(),
        );

        orchestrator
            .run_recipe_workflow_full("recipe_workflow_full".to_string(), payload("lasagna", 5))
            .await;

        let saved = sink.created.lock().await;
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].title, "Lasagna");

        let events = metrics.events.lock().await;
        let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert!(event_types.contains(&"recipe.search_completed"));
        assert!(event_types.contains(&"recipe.scraping_started"));
        assert!(event_types.contains(&"recipe.scraping_completed"));
        assert!(event_types.contains(&"recipe.saved"));
        assert!(event_types.contains(&"workflow.completed"));

        let status_events: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == "recipe_workflow_full.status")
            .collect();
        assert!(status_events.iter().any(|e| e.metadata.get("status").and_then(|v| v.as_str()) == Some("search_in_progress")));
        assert!(status_events.iter().any(|e| e.metadata.get("status").and_then(|v| v.as_str()) == Some("save_completed")));
        assert!(status_events.iter().all(|e| e.metadata.contains_key("workflow_id")));
    }

    /// One scrape of three raises; the remaining two are unaffected, the
    /// step-level count still reflects all three URLs, and exactly one
    /// failure metric is recorded for the failing URL.
    #[tokio::test]
    async fn a_single_scrape_failure_does_not_fail_the_step_or_the_others() {
        struct MiddleUrlFails;
        #[async_trait::async_trait]
        impl ScrapeStep for MiddleUrlFails {
            async fn scrape(&self, url: &str) -> (Option<Recipe>, Vec<MetricEvent>) {
                if url == "https://b.example" {
                    let metric = MetricEvent::new("recipe.scrape_failed").with_meta("url", url.to_string());
                    return (None, vec![metric]);
                }
                let mut recipe = sample_recipe();
                recipe.source_url = url.to_string();
                (Some(recipe), vec![MetricEvent::new("recipe.url_scraped")])
            }
        }

        let metrics = Arc::new(RecordingMetricsSink::default());
        let sink = Arc::new(InMemoryRecipeSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(StaticWebSearch(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
                "https://c.example".to_string(),
            ])),
            Arc::new(MiddleUrlFails),
            sink.clone(),
        );

        orchestrator
            .run_recipe_workflow_full("recipe_workflow_full".to_string(), payload("lasagna", 3))
            .await;

        assert_eq!(sink.created.lock().await.len(), 2);

        let events = metrics.events.lock().await;
        let failure_count = events.iter().filter(|e| e.event_type == "recipe.scrape_failed").count();
        assert_eq!(failure_count, 1);

        let scraping_completed = events
            .iter()
            .find(|e| e.event_type == "recipe.scraping_completed")
            .expect("scraping_completed metric emitted");
        assert_eq!(
            scraping_completed.metadata.get("scraped_recipes").and_then(|v| v.as_u64()),
            Some(3)
        );
        assert!(events.iter().any(|e| e.event_type == "workflow.completed"));
    }

    #[tokio::test]
    async fn zero_urls_still_completes_the_workflow() {
        let metrics = Arc::new(RecordingMetricsSink::default());
        let sink = Arc::new(InMemoryRecipeSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(StaticWebSearch(vec![])),
            Arc::new(StaticScrapeStep { recipe: None }),
            sink.clone(),
        );

        orchestrator
            .run_recipe_workflow_full("recipe_workflow_full".to_string(), payload("lasagna", 0))
            .await;

        assert!(sink.created.lock().await.is_empty());
        let events = metrics.events.lock().await;
        assert!(events.iter().any(|e| e.event_type == "workflow.completed"));
    }

    #[tokio::test]
    async fn fatal_sink_error_fails_the_workflow() {
        struct AlwaysFatalSink;
        #[async_trait::async_trait]
        impl RecipeSink for AlwaysFatalSink {
            async fn create(
                &self,
                _recipe: &recipe_workflow_core::RecipeSinkPayload,
            ) -> Result<String, SinkError> {
                Err(SinkError::Fatal("no credentials".to_string()))
            }
        }

        let metrics = Arc::new(RecordingMetricsSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(StaticWebSearch(vec!["https://a.example".to_string()])),
            Arc::new(StaticScrapeStep { recipe: Some(sample_recipe()) }),
            Arc::new(AlwaysFatalSink),
        );

        let workflow_id = orchestrator
            .run_recipe_workflow_full("recipe_workflow_full".to_string(), payload("lasagna", 5))
            .await;

        // the instance is removed once terminal; status is only
        // observable through the emitted metric at this point.
        assert!(orchestrator.status_of(workflow_id).is_none());
        let events = metrics.events.lock().await;
        assert!(events.iter().any(|e| e.event_type == "workflow.failed"));
    }

    /// A per-recipe rejection (the sink didn't like this one recipe) is
    /// not fatal: the save step continues to the next recipe and the
    /// workflow still completes.
    #[tokio::test]
    async fn a_rejected_recipe_does_not_abort_the_save_step() {
        struct RejectsEverything;
        #[async_trait::async_trait]
        impl RecipeSink for RejectsEverything {
            async fn create(
                &self,
                _recipe: &recipe_workflow_core::RecipeSinkPayload,
            ) -> Result<String, SinkError> {
                Err(SinkError::Rejected("duplicate title".to_string()))
            }
        }

        let metrics = Arc::new(RecordingMetricsSink::default());
        let orchestrator = WorkflowOrchestrator::new(
            OrchestratorConfig::default(),
            metrics.clone(),
            Arc::new(StaticWebSearch(vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ])),
            Arc::new(StaticScrapeStep { recipe: Some(sample_recipe()) }),
            Arc::new(RejectsEverything),
        );

        orchestrator
            .run_recipe_workflow_full("recipe_workflow_full".to_string(), payload("lasagna", 2))
            .await;

        let events = metrics.events.lock().await;
        let rejected_count = events.iter().filter(|e| e.event_type == "recipe.save_failed").count();
        assert_eq!(rejected_count, 2);
        assert!(events.iter().any(|e| e.event_type == "workflow.completed"));
    }
}
