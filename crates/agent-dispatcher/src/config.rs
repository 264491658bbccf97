use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    pub task_queue_prefetch: u16,
    pub result_queue_prefetch: u16,
    /// Grace period given to in-flight dispatch/result handling during shutdown.
    pub shutdown_grace_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            task_queue_prefetch: 1,
            result_queue_prefetch: 10,
            shutdown_grace_seconds: 30,
        }
    }
}

impl DispatcherConfig {
    pub fn load() -> anyhow::Result<Self> {
        let default = Self::default();
        let config = Self {
            task_queue_prefetch: std::env::var("TASK_QUEUE_PREFETCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.task_queue_prefetch),
            result_queue_prefetch: std::env::var("RESULT_QUEUE_PREFETCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.result_queue_prefetch),
            shutdown_grace_seconds: std::env::var("SHUTDOWN_GRACE_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.shutdown_grace_seconds),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.task_queue_prefetch > 0, "task_queue_prefetch must be positive");
        anyhow::ensure!(self.shutdown_grace_seconds > 0, "shutdown_grace_seconds must be positive");
        Ok(())
    }
}
