//! Team composition and spawning

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::messenger::resolve_session_key;
use super::output::{outer_span, strip_code_fences};
use super::types::{MemberSpawn, RunHandle, TeamMember, TeamSpawnRequest, TeamSpawnResult};
use crate::ai::ReasoningService;
use crate::db::Database;
use crate::gateway::protocol::method;
use crate::gateway::Dispatcher;
use crate::models::audit::{actions, AuditStatus};

/// Acceptance deadline for one spawn request
pub const SPAWN_TIMEOUT_MS: u64 = 10_000;
/// Lane for team runs started by the hive
pub const AGENT_LANE_SUBAGENT: &str = "subagent";

/// Asks the reasoning service for a roster
pub struct TeamComposer {
    reasoning: Arc<dyn ReasoningService>,
}

impl TeamComposer {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }

    /// One reasoning call, strictly parsed. A roster that cannot be read is
    /// an error; it never degrades to an empty or invented team.
    pub async fn compose_team(&self, goal: &str) -> Result<Vec<TeamMember>, String> {
        log::info!("[HIVE] Composing team for goal: {}", goal);
        let text = self.reasoning.propose(&composition_prompt(goal)).await?;
        let roster = parse_roster(&text)?;
        log::info!(
            "[HIVE] Composed team of {}: {}",
            roster.len(),
            roster.iter().map(|m| m.role.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(roster)
    }
}

fn composition_prompt(goal: &str) -> String {
    format!(
        "Propose a team of agents to accomplish the goal below.\n\
         Goal: {}\n\n\
         Answer with a JSON array only, one entry per member:\n\
         [{{ \"role\": \"Coder\", \"agentId\": \"coder-agent\", \"specialty\": [\"typescript\"] }}]",
        goal
    )
}

fn parse_roster(text: &str) -> Result<Vec<TeamMember>, String> {
    let cleaned = strip_code_fences(text);
    let roster: Vec<TeamMember> = match serde_json::from_str(&cleaned) {
        Ok(roster) => roster,
        Err(first_err) => outer_span(&cleaned, '[', ']')
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| format!("Could not parse team roster: {}", first_err))?,
    };

    for member in &roster {
        if member.agent_id.trim().is_empty() {
            return Err(format!("Roster member '{}' has no agentId", member.role));
        }
    }
    Ok(roster)
}

/// Composes a team once and starts one remote run per member
pub struct TeamSpawner {
    composer: TeamComposer,
    dispatcher: Arc<dyn Dispatcher>,
    audit: Option<Arc<Database>>,
}

impl TeamSpawner {
    pub fn new(reasoning: Arc<dyn ReasoningService>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            composer: TeamComposer::new(reasoning),
            dispatcher,
            audit: None,
        }
    }

    pub fn with_audit(mut self, db: Arc<Database>) -> Self {
        self.audit = Some(db);
        self
    }

    /// Spawn every roster member in roster order.
    ///
    /// Composition failure is returned as an error. Individual spawn
    /// failures are recorded per member and do not stop the remaining
    /// members from being attempted.
    pub async fn spawn_team(&self, request: &TeamSpawnRequest) -> Result<TeamSpawnResult, String> {
        let roster = self.composer.compose_team(&request.goal).await?;
        if roster.is_empty() {
            log::warn!("[HIVE] Planner proposed an empty team for '{}'", request.team_name);
        }

        let mut members = Vec::with_capacity(roster.len());
        for member in roster {
            members.push(self.spawn_member(request, member).await);
        }

        let result = TeamSpawnResult {
            team_name: request.team_name.clone(),
            members,
        };

        log::info!(
            "[HIVE] Team '{}' spawned {}/{} members",
            request.team_name,
            result.run_handles().len(),
            result.members.len()
        );
        self.audit_spawn(request, &result);
        Ok(result)
    }

    async fn spawn_member(&self, request: &TeamSpawnRequest, member: TeamMember) -> MemberSpawn {
        let session_key = resolve_session_key(&member.agent_id);
        let params = json!({
            "message": request.goal,
            "sessionKey": session_key,
            "idempotencyKey": Uuid::new_v4().to_string(),
            "deliver": false,
            "lane": AGENT_LANE_SUBAGENT,
            "label": format!("{}: {}", request.team_name, member.role),
            "spawnedBy": request.parent_session_key,
            "extraSystemPrompt": member_brief(request, &member),
        });

        match self.dispatcher.invoke(method::AGENT, params, SPAWN_TIMEOUT_MS).await {
            Ok(response) => match response.get("runId").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
                Some(run_id) => {
                    log::info!("[HIVE] Spawned {} ({}) run {}", member.role, session_key, run_id);
                    MemberSpawn {
                        member,
                        session_key,
                        run_id: Some(RunHandle(run_id.to_string())),
                        error: None,
                    }
                }
                None => {
                    log::warn!("[HIVE] Spawn of {} returned no runId", session_key);
                    MemberSpawn {
                        member,
                        session_key,
                        run_id: None,
                        error: Some("dispatcher returned no run identifier".to_string()),
                    }
                }
            },
            Err(e) => {
                log::warn!("[HIVE] Failed to spawn {} ({}): {}", member.role, session_key, e);
                MemberSpawn {
                    member,
                    session_key,
                    run_id: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    fn audit_spawn(&self, request: &TeamSpawnRequest, result: &TeamSpawnResult) {
        let Some(db) = &self.audit else {
            return;
        };
        let status = if result.all_spawned() {
            AuditStatus::Ok
        } else {
            AuditStatus::Failed
        };
        let diff = json!({
            "goal": request.goal,
            "parentSessionKey": request.parent_session_key,
            "members": result.members,
        });
        if let Err(e) = db.append_audit("hive", actions::TEAM_SPAWNED, &request.team_name, &diff, status) {
            log::warn!("[HIVE] Could not audit team spawn: {}", e);
        }
    }
}

fn member_brief(request: &TeamSpawnRequest, member: &TeamMember) -> String {
    let mut brief = format!(
        "You are the {} of team \"{}\".\nTeam goal: {}",
        member.role, request.team_name, request.goal
    );
    if !member.specialty.is_empty() {
        brief.push_str(&format!("\nYour specialties: {}", member.specialty.join(", ")));
    }
    brief.push_str(&format!("\nReport progress to {}.", request.parent_session_key));
    brief
}
