//! Agent capability registry, load-aware task dispatch, and the
//! health-check loop that evicts unresponsive agents.

pub mod config;
pub mod dispatch;
pub mod health;
pub mod registry;
pub mod supervisor;

pub use config::DispatcherConfig;
pub use dispatch::{ActiveTaskRecord, DispatchError, Dispatcher, TaskStatus};
pub use health::run_health_check_loop;
pub use registry::{AgentHealth, AgentRegistry, AgentRegistryEntry, AgentState};
pub use supervisor::{AgentSupervisor, NoopAgentSupervisor};
