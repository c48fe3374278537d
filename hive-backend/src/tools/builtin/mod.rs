//! Built-in tools for hive agents
//!
//! - `core`: agent messaging, team spawning and runtime config
//! - `scheduling`: recurring task management

pub mod core;
mod scheduling;

pub use core::{AgentSendTool, ModifyConfigTool, SpawnTeamTool};
pub use scheduling::{CancelScheduledTaskTool, ListScheduledTasksTool, ScheduleTaskTool};
