//! Hive and messaging tools

mod agent_send;
mod modify_config;
mod spawn_team;

pub use agent_send::AgentSendTool;
pub use modify_config::ModifyConfigTool;
pub use spawn_team::SpawnTeamTool;
