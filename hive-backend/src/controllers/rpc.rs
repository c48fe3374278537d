use actix_web::{web, HttpResponse, Responder};
use serde_json::Value;

use crate::gateway::methods;
use crate::gateway::protocol::{RpcError, RpcRequest, RpcResponse};
use crate::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/rpc").route(web::post().to(handle_rpc)));
}

async fn handle_rpc(state: web::Data<AppState>, body: web::Bytes) -> impl Responder {
    let mut value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("[GATEWAY] Unparsable RPC body: {}", e);
            return HttpResponse::Ok().json(RpcResponse::error(String::new(), RpcError::parse_error()));
        }
    };

    let id = value
        .get("id")
        .map(|id| match id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    // Numeric ids are echoed back as strings
    if let Some(obj) = value.as_object_mut() {
        obj.insert("id".to_string(), Value::String(id.clone()));
    }
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(_) => {
            return HttpResponse::Ok().json(RpcResponse::error(id, RpcError::invalid_request()));
        }
    };

    HttpResponse::Ok().json(methods::dispatch(&state.hive, request).await)
}
