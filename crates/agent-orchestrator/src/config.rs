use serde::{Deserialize, Serialize};

/// Orchestrator-local tunables, loaded the same way
/// `rust-services/agent-registry`'s config loaded: env vars with baked-in
/// defaults, validated once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound on concurrent in-flight scrapes per workflow instance.
    /// `0` means uncapped (one task per URL).
    pub scrape_concurrency: usize,
    /// Grace period given to in-flight workflows during shutdown.
    pub shutdown_grace_seconds: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scrape_concurrency: 8,
            shutdown_grace_seconds: 30,
        }
    }
}

impl OrchestratorConfig {
    pub fn load() -> anyhow::Result<Self> {
        let default = Self::default();
        let config = Self {
            scrape_concurrency: std::env::var("SCRAPE_CONCURRENCY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.scrape_concurrency),
            shutdown_grace_seconds: std::env::var("SHUTDOWN_GRACE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.shutdown_grace_seconds),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.shutdown_grace_seconds > 0,
            "shutdown_grace_seconds must be positive"
        );
        Ok(())
    }
}
