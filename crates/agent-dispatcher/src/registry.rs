use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const MAX_ERROR_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Initializing,
    Active,
    Idle,
    Busy,
    Failed,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealth {
    pub state: AgentState,
    pub last_heartbeat: DateTime<Utc>,
    pub error_count: u32,
}

impl AgentHealth {
    fn new() -> Self {
        Self {
            state: AgentState::Active,
            last_heartbeat: Utc::now(),
            error_count: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRegistryEntry {
    pub agent_id: String,
    pub capabilities: HashSet<String>,
    pub health: AgentHealth,
    pub active_task_count: u32,
}

/// Agent capability registry plus load-aware selection, with per-entry
/// `DashMap` locking so registration, heartbeats, and selection never
/// contend on a single global lock.
#[derive(Default)]
pub struct AgentRegistry {
    agents: Arc<DashMap<String, AgentRegistryEntry>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, agent_id: impl Into<String>, capabilities: HashSet<String>) {
        let agent_id = agent_id.into();
        info!(agent_id, "registering agent");
        self.agents.insert(
            agent_id.clone(),
            AgentRegistryEntry {
                agent_id,
                capabilities,
                health: AgentHealth::new(),
                active_task_count: 0,
            },
        );
    }

    /// Returns whether an entry actually existed and was removed.
    pub fn deregister(&self, agent_id: &str) -> bool {
        self.agents.remove(agent_id).is_some()
    }

    pub fn heartbeat(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.health.last_heartbeat = Utc::now();
            entry.health.error_count = 0;
            if entry.health.state == AgentState::Failed {
                entry.health.state = AgentState::Active;
            }
        }
    }

    pub fn record_error(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.health.error_count += 1;
            if entry.health.error_count >= MAX_ERROR_COUNT {
                entry.health.state = AgentState::Failed;
            }
        }
    }

    /// One health-check sweep: any agent whose heartbeat is stale, or
    /// whose error count has crossed the threshold, is marked `Failed`.
    pub fn sweep_health(&self) -> Vec<String> {
        let now = Utc::now();
        let mut newly_failed = Vec::new();
        for mut entry in self.agents.iter_mut() {
            if entry.health.state == AgentState::Terminated {
                continue;
            }
            let stale = now
                .signed_duration_since(entry.health.last_heartbeat)
                .to_std()
                .map(|elapsed| elapsed > HEARTBEAT_INTERVAL)
                .unwrap_or(false);
            let overloaded_with_errors = entry.health.error_count >= MAX_ERROR_COUNT;
            if (stale || overloaded_with_errors) && entry.health.state != AgentState::Failed {
                warn!(agent_id = %entry.agent_id, stale, overloaded_with_errors, "agent marked failed");
                entry.health.state = AgentState::Failed;
                newly_failed.push(entry.agent_id.clone());
            }
        }
        newly_failed
    }

    /// Selects the least-loaded active agent with the required
    /// capability, ties broken by `agent_id` ordering for determinism.
    pub fn select(&self, required_capability: &str) -> Option<String> {
        self.agents
            .iter()
            .filter(|entry| {
                entry.health.state == AgentState::Active
                    && entry.capabilities.contains(required_capability)
            })
            .map(|entry| (entry.active_task_count, entry.agent_id.clone()))
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
            .map(|(_, agent_id)| agent_id)
    }

    pub fn increment_load(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.active_task_count += 1;
        }
    }

    pub fn decrement_load(&self, agent_id: &str) {
        if let Some(mut entry) = self.agents.get_mut(agent_id) {
            entry.active_task_count = entry.active_task_count.saturating_sub(1);
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<AgentRegistryEntry> {
        self.agents.get(agent_id).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn selects_least_loaded_agent_with_capability() {
        let registry = AgentRegistry::new();
        registry.register("agent-b", caps(&["scrape"]));
        registry.register("agent-a", caps(&["scrape"]));
        registry.increment_load("agent-b");

        assert_eq!(registry.select("scrape"), Some("agent-a".to_string()));
    }

    #[test]
    fn ties_break_lexicographically() {
        let registry = AgentRegistry::new();
        registry.register("agent-z", caps(&["scrape"]));
        registry.register("agent-a", caps(&["scrape"]));

        assert_eq!(registry.select("scrape"), Some("agent-a".to_string()));
    }

    #[test]
    fn no_matching_capability_returns_none() {
        let registry = AgentRegistry::new();
        registry.register("agent-a", caps(&["search"]));
        assert_eq!(registry.select("scrape"), None);
    }

    #[test]
    fn failed_agents_are_excluded_from_selection() {
        let registry = AgentRegistry::new();
        registry.register("agent-a", caps(&["scrape"]));
        registry.record_error("agent-a");
        registry.record_error("agent-a");
        registry.record_error("agent-a");
        assert_eq!(registry.select("scrape"), None);
    }

    #[test]
    fn heartbeat_revives_a_failed_agent() {
        let registry = AgentRegistry::new();
        registry.register("agent-a", caps(&["scrape"]));
        registry.record_error("agent-a");
        registry.record_error("agent-a");
        registry.record_error("agent-a");
        assert_eq!(registry.get("agent-a").unwrap().health.state, AgentState::Failed);

        registry.heartbeat("agent-a");
        assert_eq!(registry.get("agent-a").unwrap().health.state, AgentState::Active);
    }

    #[test]
    fn deregister_reports_whether_anything_was_removed() {
        let registry = AgentRegistry::new();
        registry.register("agent-a", caps(&["scrape"]));
        assert!(registry.deregister("agent-a"));
        assert!(!registry.deregister("agent-a"));
    }

    #[test]
    fn decrement_load_never_goes_below_zero() {
        let registry = AgentRegistry::new();
        registry.register("agent-a", caps(&["scrape"]));
        registry.decrement_load("agent-a");
        assert_eq!(registry.get("agent-a").unwrap().active_task_count, 0);
    }
}
