use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use serde_json::Value;

use crate::tools::ToolContext;
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/tools").route(web::get().to(list_tools)));
    cfg.service(web::resource("/api/tools/{name}").route(web::post().to(execute_tool)));
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteToolRequest {
    #[serde(default)]
    params: Value,
    /// Calling agent's session; defaults to this backend's own session
    session_key: Option<String>,
    channel: Option<String>,
}

async fn list_tools(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.tool_registry.list_definitions())
}

async fn execute_tool(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<ExecuteToolRequest>,
) -> impl Responder {
    let name = path.into_inner();
    if state.tool_registry.get(&name).is_none() {
        return HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("Unknown tool: {}", name)
        }));
    }

    let body = body.into_inner();
    let context = ToolContext::new()
        .with_session(body.session_key.unwrap_or_else(|| state.config.session_key.clone()))
        .with_channel(body.channel.unwrap_or_else(|| state.config.channel.clone()))
        .with_hive(state.hive.clone());

    let params = if body.params.is_null() {
        serde_json::json!({})
    } else {
        body.params
    };
    let result = state.tool_registry.execute(&name, params, &context).await;
    HttpResponse::Ok().json(result)
}
