use std::sync::Arc;
use tokio::time::interval;
use tracing::warn;

use crate::registry::{AgentRegistry, HEALTH_CHECK_INTERVAL};
use crate::supervisor::AgentSupervisor;

/// Runs the periodic health-check sweep forever. Intended to be spawned
/// as its own task: a fixed-interval scan independent of the dispatch
/// path. Every agent the sweep marks `Failed` this tick is handed to
/// `supervisor.restart`; detection and recovery stay separate concerns,
/// same as the sweep and the restart attempt in `manager_agent.py`.
pub async fn run_health_check_loop(registry: Arc<AgentRegistry>, supervisor: Arc<dyn AgentSupervisor>) {
    let mut ticker = interval(HEALTH_CHECK_INTERVAL);
    loop {
        ticker.tick().await;
        let newly_failed = registry.sweep_health();
        if !newly_failed.is_empty() {
            warn!(?newly_failed, "health check marked agents as failed");
            for agent_id in &newly_failed {
                supervisor.restart(agent_id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::test_support::RecordingAgentSupervisor;
    use std::collections::HashSet;

    #[tokio::test]
    async fn a_single_sweep_restarts_every_newly_failed_agent() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", HashSet::from(["scrape".to_string()]));
        registry.record_error("agent-a");
        registry.record_error("agent-a");
        registry.record_error("agent-a");

        let supervisor = Arc::new(RecordingAgentSupervisor::default());
        let newly_failed = registry.sweep_health();
        for agent_id in &newly_failed {
            supervisor.restart(agent_id).await;
        }

        assert_eq!(supervisor.restarted.lock().unwrap().as_slice(), ["agent-a"]);
    }

    #[tokio::test]
    async fn a_healthy_agent_is_never_handed_to_the_supervisor() {
        let registry = Arc::new(AgentRegistry::new());
        registry.register("agent-a", HashSet::from(["scrape".to_string()]));
        registry.heartbeat("agent-a");

        let supervisor = Arc::new(RecordingAgentSupervisor::default());
        let newly_failed = registry.sweep_health();
        for agent_id in &newly_failed {
            supervisor.restart(agent_id).await;
        }

        assert!(supervisor.restarted.lock().unwrap().is_empty());
    }
}
