use async_trait::async_trait;
use recipe_workflow_core::RecipeSinkPayload;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::SinkError;
use crate::traits::{Credentials, RecipeSink};

/// Posts recipes to the internal recipe-storage API, grounded on the
/// source's `PantryChefAPIClient`: a bearer token attached per-request,
/// read fresh from [`Credentials`] rather than cached, since the
/// underlying service-account token can rotate.
pub struct HttpRecipeSink {
    client: reqwest::Client,
    base_url: String,
    credentials: Arc<dyn Credentials>,
}

impl HttpRecipeSink {
    pub fn new(base_url: impl Into<String>, credentials: Arc<dyn Credentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials,
        }
    }
}

#[derive(Deserialize)]
struct CreateRecipeResponse {
    id: String,
}

#[async_trait]
impl RecipeSink for HttpRecipeSink {
    async fn create(&self, recipe: &RecipeSinkPayload) -> Result<String, SinkError> {
        let token = self
            .credentials
            .token()
            .await
            .map_err(|err| SinkError::Fatal(err.to_string()))?;

        let response = self
            .client
            .post(format!("{}/recipes", self.base_url))
            .bearer_auth(token)
            .json(recipe)
            .send()
            .await
            .map_err(|err| SinkError::Rejected(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SinkError::Fatal(format!(
                "recipe sink rejected credentials: {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected(format!("{status}: {body}")));
        }

        let parsed: CreateRecipeResponse = response
            .json()
            .await
            .map_err(|err| SinkError::Rejected(err.to_string()))?;
        Ok(parsed.id)
    }
}

/// In-memory test double that accepts every recipe.
#[derive(Default)]
pub struct InMemoryRecipeSink {
    pub created: tokio::sync::Mutex<Vec<RecipeSinkPayload>>,
}

#[async_trait]
impl RecipeSink for InMemoryRecipeSink {
    async fn create(&self, recipe: &RecipeSinkPayload) -> Result<String, SinkError> {
        let mut created = self.created.lock().await;
        created.push(recipe.clone());
        Ok(uuid::Uuid::new_v4().to_string())
    }
}
