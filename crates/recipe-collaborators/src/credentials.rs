use async_trait::async_trait;
use tracing::warn;

use crate::error::CollaboratorError;
use crate::traits::Credentials;

const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Reads a bearer token from a mounted service-account file, matching the
/// source's `_get_service_token`. `RECIPE_SINK_TOKEN_PATH` overrides the
/// path for local development where no service account is mounted.
pub struct ServiceAccountCredentials {
    token_path: String,
}

impl ServiceAccountCredentials {
    pub fn new() -> Self {
        let token_path = std::env::var("RECIPE_SINK_TOKEN_PATH")
            .unwrap_or_else(|_| DEFAULT_TOKEN_PATH.to_string());
        Self { token_path }
    }
}

impl Default for ServiceAccountCredentials {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Credentials for ServiceAccountCredentials {
    async fn token(&self) -> Result<String, CollaboratorError> {
        match tokio::fs::read_to_string(&self.token_path).await {
            Ok(contents) => Ok(contents.trim().to_string()),
            Err(err) => {
                warn!(path = %self.token_path, error = %err, "could not read service account token");
                Err(CollaboratorError::Credential(format!(
                    "unable to read token at {}: {}",
                    self.token_path, err
                )))
            }
        }
    }
}

/// Fixed-token test double.
pub struct StaticCredentials(pub String);

#[async_trait]
impl Credentials for StaticCredentials {
    async fn token(&self) -> Result<String, CollaboratorError> {
        Ok(self.0.clone())
    }
}
