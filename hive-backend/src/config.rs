use std::env;

/// Upper bound for autonomous agent-to-agent turns after an initial send
pub const MAX_PING_PONG_TURNS: u32 = 5;
/// Turns used when HIVE_MAX_PING_PONG_TURNS is unset or unparsable
pub const DEFAULT_PING_PONG_TURNS: u32 = 5;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    /// JSON-RPC endpoint of the agent gateway (dispatcher)
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    /// OpenAI-compatible endpoint for planning. When unset, planning goes through the gateway.
    pub reasoning_endpoint: Option<String>,
    pub reasoning_api_key: String,
    pub reasoning_model: Option<String>,
    /// Session key this backend speaks as when it messages other agents
    pub session_key: String,
    pub channel: String,
    /// Directory under which each workspace gets its own folder
    pub workspace_root: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/hive.db".to_string()),
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:18789/rpc".to_string()),
            gateway_token: non_empty_var("GATEWAY_TOKEN"),
            reasoning_endpoint: non_empty_var("REASONING_ENDPOINT"),
            reasoning_api_key: env::var("REASONING_API_KEY").unwrap_or_default(),
            reasoning_model: non_empty_var("REASONING_MODEL"),
            session_key: env::var("HIVE_SESSION_KEY").unwrap_or_else(|_| "main:hive".to_string()),
            channel: env::var("HIVE_CHANNEL").unwrap_or_else(|_| "internal".to_string()),
            workspace_root: env::var("WORKSPACE_ROOT").unwrap_or_else(|_| "./workspaces".to_string()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Resolve the ping-pong turn budget. Read on every call so operators can
/// retune a running process through the environment.
pub fn max_ping_pong_turns() -> u32 {
    parse_ping_pong_turns(env::var("HIVE_MAX_PING_PONG_TURNS").ok().as_deref())
}

fn parse_ping_pong_turns(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .map(|n| n.clamp(0, MAX_PING_PONG_TURNS as i64) as u32)
        .unwrap_or(DEFAULT_PING_PONG_TURNS)
}
