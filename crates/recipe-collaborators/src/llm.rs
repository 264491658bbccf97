use async_trait::async_trait;
use serde_json::json;

use crate::error::CollaboratorError;
use crate::traits::TextCompletionProvider;

/// Calls a hosted text-completion endpoint. Kept deliberately generic
/// (endpoint + bearer key) rather than tied to one vendor's SDK, since the
/// source swapped between providers across its history.
pub struct HttpTextCompletionProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpTextCompletionProvider {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(serde::Deserialize)]
struct CompletionResponse {
    text: String,
}

#[async_trait]
impl TextCompletionProvider for HttpTextCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CollaboratorError::Upstream(response.status().to_string()));
        }

        let parsed: CompletionResponse = response.json().await?;
        Ok(parsed.text)
    }
}

/// Returns a fixed completion string, for tests.
pub struct StaticTextCompletionProvider(pub String);

#[async_trait]
impl TextCompletionProvider for StaticTextCompletionProvider {
    async fn complete(&self, _prompt: &str) -> Result<String, CollaboratorError> {
        Ok(self.0.clone())
    }
}
