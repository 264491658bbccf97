use async_trait::async_trait;
use recipe_workflow_core::MetricEvent;
use std::time::Instant;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::traits::WebSearch;

const MAX_ATTEMPTS: u32 = 3;

/// HTTP-backed web search. The source used `duckduckgo_search` directly;
/// here the concrete search backend sits behind a configurable HTTP
/// endpoint so it can be swapped without touching the orchestrator.
pub struct HttpWebSearch {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWebSearch {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    fn build_query(query: &str, excluded_domains: &[String]) -> String {
        let mut q = query.to_string();
        for domain in excluded_domains {
            q.push_str(&format!(" -site:{domain}"));
        }
        q
    }
}

#[derive(serde::Deserialize)]
struct SearchResponse {
    urls: Vec<String>,
}

#[async_trait]
impl WebSearch for HttpWebSearch {
    async fn search(
        &self,
        query: &str,
        excluded_domains: &[String],
        number_of_urls: u32,
    ) -> Result<(Vec<String>, Vec<MetricEvent>), CollaboratorError> {
        let started = Instant::now();
        let built_query = Self::build_query(query, excluded_domains);

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            let result = self
                .client
                .get(&self.endpoint)
                .query(&[
                    ("q", built_query.as_str()),
                    ("n", &number_of_urls.to_string()),
                ])
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {
                    let parsed: SearchResponse = response.json().await?;
                    let urls = parsed.urls.into_iter().take(number_of_urls as usize).collect();
                    let metric = MetricEvent::new("recipe.search_attempt")
                        .with_duration(started.elapsed().as_secs_f64())
                        .with_meta("attempts", attempt)
                        .with_meta("query", query.to_string());
                    return Ok((urls, vec![metric]));
                }
                Ok(response) => {
                    warn!(status = %response.status(), attempt, "search attempt failed");
                    last_err = Some(CollaboratorError::Upstream(response.status().to_string()));
                }
                Err(err) => {
                    warn!(error = %err, attempt, "search attempt errored");
                    last_err = Some(CollaboratorError::Request(err));
                }
            }
        }

        Err(last_err.unwrap_or(CollaboratorError::Upstream("search exhausted retries".into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_appends_excluded_domains() {
        let query = HttpWebSearch::build_query(
            "lasagna",
            &["allrecipes.com".to_string(), "foodnetwork.com".to_string()],
        );
        assert_eq!(query, "lasagna -site:allrecipes.com -site:foodnetwork.com");
    }

    #[tokio::test]
    async fn static_search_truncates_to_requested_count() {
        let search = StaticWebSearch(vec!["a".into(), "b".into(), "c".into()]);
        let (urls, _) = search.search("q", &[], 2).await.unwrap();
        assert_eq!(urls, vec!["a".to_string(), "b".to_string()]);
    }
}

/// Returns a fixed URL list regardless of query, for tests.
pub struct StaticWebSearch(pub Vec<String>);

#[async_trait]
impl WebSearch for StaticWebSearch {
    async fn search(
        &self,
        _query: &str,
        _excluded_domains: &[String],
        number_of_urls: u32,
    ) -> Result<(Vec<String>, Vec<MetricEvent>), CollaboratorError> {
        let urls = self.0.iter().take(number_of_urls as usize).cloned().collect();
        Ok((urls, vec![MetricEvent::new("recipe.search_attempt").with_duration(0.0)]))
    }
}
