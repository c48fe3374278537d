//! Database model modules - extends Database with domain-specific methods
//!
//! Each module adds `impl Database` blocks with methods for a specific table group.

mod audit_log;      // audit_log
mod intelligence;   // user_intelligence_memory
mod mission_tasks;  // mission_tasks
mod scheduled_tasks; // scheduled_tasks
mod workspaces;      // workspaces
