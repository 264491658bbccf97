use async_trait::async_trait;
use tracing::warn;

/// External recovery hook invoked whenever the health loop marks an agent
/// `Failed`, whether from a stale heartbeat or a tripped error count.
/// Grounded on `manager_agent.py`'s `_attempt_agent_restart` call, which
/// the retrieved source calls out but never defines — the original leaves
/// restart to infrastructure the manager agent doesn't own. This crate
/// keeps the same boundary: the registry only needs to know a restart was
/// attempted, not how.
#[async_trait]
pub trait AgentSupervisor: Send + Sync {
    async fn restart(&self, agent_id: &str);
}

/// Default production adapter: logs the attempt and nothing else. A real
/// deployment swaps this for one that talks to whatever schedules agent
/// processes (a Kubernetes `Pod` restart, a supervisor RPC); this crate
/// doesn't assume one.
pub struct NoopAgentSupervisor;

#[async_trait]
impl AgentSupervisor for NoopAgentSupervisor {
    async fn restart(&self, agent_id: &str) {
        warn!(agent_id, "no supervisor configured, agent will not be restarted");
    }
}
