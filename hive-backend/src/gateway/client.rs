//! Dispatcher seam and the HTTP JSON-RPC client for the agent gateway
//!
//! Every call carries its own deadline. A deadline hit is reported as
//! [`DispatchError::Timeout`], which callers treat differently from the
//! gateway refusing the call ([`DispatchError::Rejected`]).

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use super::protocol::{RpcRequest, RpcResponse};

/// Failure modes of a dispatcher call
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// No answer within the call's deadline
    Timeout { method: String, timeout_ms: u64 },
    /// The gateway answered with an RPC error
    Rejected { method: String, code: i32, message: String },
    /// The request never produced a usable answer (connection, HTTP status, bad body)
    Transport { method: String, message: String },
}

impl DispatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }

    pub fn method(&self) -> &str {
        match self {
            DispatchError::Timeout { method, .. }
            | DispatchError::Rejected { method, .. }
            | DispatchError::Transport { method, .. } => method,
        }
    }
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchError::Timeout { method, timeout_ms } => {
                write!(f, "gateway call '{}' timed out after {}ms", method, timeout_ms)
            }
            DispatchError::Rejected { method, code, message } => {
                write!(f, "gateway rejected '{}' ({}): {}", method, code, message)
            }
            DispatchError::Transport { method, message } => {
                write!(f, "gateway call '{}' failed: {}", method, message)
            }
        }
    }
}

impl std::error::Error for DispatchError {}

/// Remote method dispatcher. The hive never talks to agents any other way.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn invoke(&self, method: &str, params: Value, timeout_ms: u64) -> Result<Value, DispatchError>;
}

/// Dispatcher backed by the gateway's HTTP JSON-RPC endpoint
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    endpoint: String,
}

impl GatewayClient {
    pub fn new(endpoint: &str, token: Option<&str>) -> Result<Self, String> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| format!("Invalid gateway token format: {}", e))?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }

        // Per-call deadlines are enforced in invoke(); no client-wide timeout.
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| format!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, method: &str, request: &RpcRequest) -> Result<RpcResponse, DispatchError> {
        let transport = |message: String| DispatchError::Transport {
            method: method.to_string(),
            message,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(transport(format!("HTTP {}: {}", status, body)));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|e| transport(format!("invalid RPC response: {}", e)))
    }
}

#[async_trait]
impl Dispatcher for GatewayClient {
    async fn invoke(&self, method: &str, params: Value, timeout_ms: u64) -> Result<Value, DispatchError> {
        let request = RpcRequest {
            id: Uuid::new_v4().to_string(),
            method: method.to_string(),
            params,
        };

        log::debug!("[GATEWAY] -> {} (id={}, timeout={}ms)", method, request.id, timeout_ms);

        let response = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.post(method, &request),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                log::warn!("[GATEWAY] {} timed out after {}ms", method, timeout_ms);
                return Err(DispatchError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                });
            }
        };

        if let Some(error) = response.error {
            log::warn!("[GATEWAY] {} rejected: {} ({})", method, error.message, error.code);
            return Err(DispatchError::Rejected {
                method: method.to_string(),
                code: error.code,
                message: error.message,
            });
        }

        Ok(response.result.unwrap_or(Value::Null))
    }
}
