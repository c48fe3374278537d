//! JSON-RPC methods served by the hive backend

use serde::Deserialize;
use serde_json::{json, Value};

use super::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::hive::types::SubTaskStatus;
use crate::hive::{resolve_execution_order, HiveManager, TeamSpawnRequest};
use crate::intelligence::IntelligenceExtractor;
use crate::models::workspace::Permissions;

/// Price per token used for the mission control cost estimate
pub const COST_PER_TOKEN: f64 = 0.00001;

const MISSION_TASK_LIMIT: usize = 50;
const INTEL_LIMIT: usize = 10;
const AUDIT_LIMIT: usize = 20;

pub const METHODS: &[&str] = &[
    "hive.decompose",
    "hive.spawn_team",
    "hive.exchanges",
    "mission_control.get_data",
    "mission_control.get_stats",
    "mission_control.update_task",
    "intelligence.observe",
    "audit.resolve",
    "workspace.create",
    "workspace.clone",
    "workspace.get",
    "workspace.set_permissions",
];

/// Route one request to its handler
pub async fn dispatch(hive: &HiveManager, request: RpcRequest) -> RpcResponse {
    log::debug!("[GATEWAY] {} ({})", request.method, request.id);

    let result = match request.method.as_str() {
        "hive.decompose" => decompose(hive, request.params).await,
        "hive.spawn_team" => spawn_team(hive, request.params).await,
        "hive.exchanges" => Ok(json!({ "exchanges": hive.tracker().snapshot() })),
        "mission_control.get_data" => mission_data(hive),
        "mission_control.get_stats" => mission_stats(hive),
        "mission_control.update_task" => update_task(hive, request.params),
        "intelligence.observe" => observe(hive, request.params),
        "audit.resolve" => resolve_audit(hive, request.params),
        "workspace.create" => create_workspace(hive, request.params).await,
        "workspace.clone" => clone_workspace(hive, request.params).await,
        "workspace.get" => get_workspace(hive, request.params),
        "workspace.set_permissions" => set_workspace_permissions(hive, request.params),
        _ => Err(RpcError::method_not_found()),
    };

    match result {
        Ok(value) => RpcResponse::success(request.id, value),
        Err(error) => {
            log::warn!("[GATEWAY] {} failed: {}", request.method, error.message);
            RpcResponse::error(request.id, error)
        }
    }
}

fn parse_params<T: for<'de> Deserialize<'de>>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn db_error(e: rusqlite::Error) -> RpcError {
    log::error!("[GATEWAY] Database error: {}", e);
    RpcError::internal_error(format!("Database error: {}", e))
}

#[derive(Deserialize)]
struct DecomposeParams {
    goal: String,
    #[serde(default)]
    persist: bool,
}

async fn decompose(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: DecomposeParams = parse_params(params)?;
    if params.goal.trim().is_empty() {
        return Err(RpcError::invalid_params("goal is required"));
    }

    let graph = hive.decomposer().decompose(&params.goal).await;
    let tiers = resolve_execution_order(&graph);
    if tiers.has_cycle() {
        log::warn!(
            "[HIVE] Task graph for '{}' has unresolvable tasks: {:?}",
            graph.goal,
            tiers.unresolved
        );
    }

    let graph_id = if params.persist && !graph.is_empty() {
        Some(hive.db().save_task_graph(&graph, &tiers).map_err(db_error)?)
    } else {
        None
    };

    Ok(json!({
        "graph": graph,
        "tiers": tiers.tiers,
        "unresolved": tiers.unresolved,
        "hasCycle": tiers.has_cycle(),
        "graphId": graph_id,
    }))
}

async fn spawn_team(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let request: TeamSpawnRequest = parse_params(params)?;
    if request.goal.trim().is_empty() || request.parent_session_key.trim().is_empty() {
        return Err(RpcError::invalid_params("goal and parentSessionKey are required"));
    }

    let result = hive
        .spawner()
        .spawn_team(&request)
        .await
        .map_err(RpcError::internal_error)?;
    let run_ids: Vec<String> = result.run_handles().iter().map(|h| h.to_string()).collect();
    Ok(json!({
        "teamName": result.team_name,
        "runIds": run_ids,
        "members": result.members,
    }))
}

fn mission_data(hive: &HiveManager) -> Result<Value, RpcError> {
    let db = hive.db();
    Ok(json!({
        "tasks": db.list_recent_mission_tasks(MISSION_TASK_LIMIT).map_err(db_error)?,
        "intel": db.list_top_intelligence(INTEL_LIMIT).map_err(db_error)?,
        "audit": db.list_recent_audit(AUDIT_LIMIT).map_err(db_error)?,
        "scheduled": db.list_active_scheduled_tasks().map_err(db_error)?,
    }))
}

fn mission_stats(hive: &HiveManager) -> Result<Value, RpcError> {
    let db = hive.db();
    let tokens = db.total_token_usage().map_err(db_error)?;
    Ok(json!({
        "taskStats": db.mission_task_status_counts().map_err(db_error)?,
        "tokens": tokens,
        "cost": tokens as f64 * COST_PER_TOKEN,
        "activeExchanges": hive.tracker().len(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTaskParams {
    graph_id: String,
    task_id: String,
    status: String,
    assigned_to: Option<String>,
}

fn update_task(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: UpdateTaskParams = parse_params(params)?;
    let status = SubTaskStatus::from_str(&params.status)
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown task status '{}'", params.status)))?;

    let updated = hive
        .db()
        .set_mission_task_status(&params.graph_id, &params.task_id, status, params.assigned_to.as_deref())
        .map_err(db_error)?;
    if !updated {
        return Err(RpcError::invalid_params(format!(
            "No task {} in graph {}",
            params.task_id, params.graph_id
        )));
    }

    Ok(json!({ "graphId": params.graph_id, "taskId": params.task_id, "status": status }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObserveParams {
    user_id: String,
    message: String,
}

fn observe(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: ObserveParams = parse_params(params)?;
    if params.user_id.trim().is_empty() {
        return Err(RpcError::invalid_params("userId is required"));
    }
    let memories = IntelligenceExtractor::new(hive.db().clone())
        .extract(&params.user_id, &params.message)
        .map_err(RpcError::internal_error)?;
    Ok(json!({ "memories": memories }))
}

#[derive(Deserialize)]
struct ResolveParams {
    id: String,
    approve: bool,
}

fn resolve_audit(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: ResolveParams = parse_params(params)?;
    let db = hive.db();
    let resolved = db.resolve_pending_audit(&params.id, params.approve).map_err(db_error)?;
    let entry = db
        .get_audit_entry(&params.id)
        .map_err(db_error)?
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown audit entry {}", params.id)))?;

    Ok(json!({
        "id": entry.id,
        "resolved": resolved,
        "status": entry.status,
    }))
}

#[derive(Deserialize)]
struct CreateWorkspaceParams {
    name: String,
}

async fn create_workspace(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: CreateWorkspaceParams = parse_params(params)?;
    if params.name.trim().is_empty() {
        return Err(RpcError::invalid_params("name is required"));
    }
    let workspace = hive
        .workspaces()
        .create(&params.name)
        .await
        .map_err(RpcError::internal_error)?;
    Ok(json!({ "workspace": workspace }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloneWorkspaceParams {
    source_id: String,
    name: String,
}

async fn clone_workspace(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: CloneWorkspaceParams = parse_params(params)?;
    let workspaces = hive.workspaces();
    if workspaces.get(&params.source_id).map_err(RpcError::internal_error)?.is_none() {
        return Err(RpcError::invalid_params(format!("Unknown workspace {}", params.source_id)));
    }
    let workspace = workspaces
        .clone_from(&params.source_id, &params.name)
        .await
        .map_err(RpcError::internal_error)?;
    Ok(json!({ "workspace": workspace }))
}

#[derive(Deserialize)]
struct WorkspaceIdParams {
    id: String,
}

fn get_workspace(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: WorkspaceIdParams = parse_params(params)?;
    let workspace = hive
        .workspaces()
        .get(&params.id)
        .map_err(RpcError::internal_error)?
        .ok_or_else(|| RpcError::invalid_params(format!("Unknown workspace {}", params.id)))?;
    Ok(json!({ "workspace": workspace }))
}

#[derive(Deserialize)]
struct SetPermissionsParams {
    id: String,
    permissions: Permissions,
}

fn set_workspace_permissions(hive: &HiveManager, params: Value) -> Result<Value, RpcError> {
    let params: SetPermissionsParams = parse_params(params)?;
    let workspaces = hive.workspaces();
    if workspaces.get(&params.id).map_err(RpcError::internal_error)?.is_none() {
        return Err(RpcError::invalid_params(format!("Unknown workspace {}", params.id)));
    }
    let workspace = workspaces
        .set_permissions(&params.id, &params.permissions)
        .map_err(RpcError::internal_error)?;
    Ok(json!({ "workspace": workspace }))
}
