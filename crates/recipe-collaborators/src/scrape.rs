use async_trait::async_trait;
use recipe_workflow_core::{MetricEvent, Recipe};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;

use crate::traits::{ScrapeStep, TextCompletionProvider};

const EXTRACTION_PROMPT_TEMPLATE: &str = "Extract a recipe as JSON with fields \
title, instructions (array), prep_time, cook_time, total_time, servings, notes, \
ingredients (array of {name, quantity, unit}) from the following page text. \
Respond with JSON only.\n\n---\n{page_text}";

/// Fetches a page over HTTP, then hands its text to a
/// [`TextCompletionProvider`] for structured extraction. Mirrors the
/// source's `_try_gemini_scrape`: a single LLM round trip per URL, with
/// ingredients missing both quantity and unit folded into `notes` rather
/// than discarded, exactly as `_filter_ingredients_and_update_notes` does.
pub struct LlmScrapeStep {
    http: reqwest::Client,
    llm: Arc<dyn TextCompletionProvider>,
}

impl LlmScrapeStep {
    pub fn new(llm: Arc<dyn TextCompletionProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            llm,
        }
    }
}

#[async_trait]
impl ScrapeStep for LlmScrapeStep {
    async fn scrape(&self, url: &str) -> (Option<Recipe>, Vec<MetricEvent>) {
        let started = Instant::now();

        let page_text = match self.http.get(url).send().await {
            Ok(response) => match response.text().await {
                Ok(text) => text,
                Err(err) => return fetch_failure(url, started, err.to_string()),
            },
            Err(err) => return fetch_failure(url, started, err.to_string()),
        };

        let prompt = EXTRACTION_PROMPT_TEMPLATE.replace("{page_text}", &page_text);
        let completion = match self.llm.complete(&prompt).await {
            Ok(text) => text,
            Err(err) => return fetch_failure(url, started, err.to_string()),
        };

        let mut recipe: Recipe = match serde_json::from_str(&completion) {
            Ok(recipe) => recipe,
            Err(err) => return fetch_failure(url, started, format!("unparseable LLM output: {err}")),
        };
        recipe.source_url = url.to_string();
        recipe.filter_ingredients_into_notes();

        let metric = MetricEvent::new("recipe.url_scraped")
            .with_duration(started.elapsed().as_secs_f64())
            .with_meta("url", url.to_string());
        (Some(recipe), vec![metric])
    }
}

fn fetch_failure(url: &str, started: Instant, reason: String) -> (Option<Recipe>, Vec<MetricEvent>) {
    warn!(url, reason, "scrape failed");
    let metric = MetricEvent::new("recipe.scrape_failed")
        .with_duration(started.elapsed().as_secs_f64())
        .with_meta("url", url.to_string())
        .with_meta("reason", reason);
    (None, vec![metric])
}


/// Returns a fixed recipe (or `None`) for every URL, for tests.
pub struct StaticScrapeStep {
    pub recipe: Option<Recipe>,
}

#[async_trait]
impl ScrapeStep for StaticScrapeStep {
    async fn scrape(&self, url: &str) -> (Option<Recipe>, Vec<MetricEvent>) {
        let metric = MetricEvent::new("recipe.url_scraped").with_meta("url", url.to_string());
        let mut recipe = self.recipe.clone();
        if let Some(r) = recipe.as_mut() {
            r.source_url = url.to_string();
        }
        (recipe, vec![metric])
    }
}
