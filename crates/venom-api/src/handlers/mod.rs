//! HTTP API handlers: exposes the proxy collection as JSON.

pub mod proxies;
pub mod status;
pub mod toxics;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::json;

use venom_core::{ProxyError, ToxicError};
use venom_services::{Proxy, ProxyCollection};

#[derive(Clone)]
pub struct ApiState {
    pub proxies: Arc<ProxyCollection>,
}

impl ApiState {
    async fn proxy(&self, name: &str) -> Result<Arc<Proxy>, ApiError> {
        Ok(self.proxies.get(name).await?)
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Error reply, rendered as `{ "error": ..., "status": ... }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn from_code(code: u16, message: String) -> Self {
        Self {
            status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.message, "status": self.status.as_u16() });
        (self.status, Json(body)).into_response()
    }
}

impl From<ProxyError> for ApiError {
    fn from(e: ProxyError) -> Self {
        if let ProxyError::Bind(..) = e {
            tracing::warn!(error = %e, "proxy failed to start");
        }
        Self::from_code(e.status_code(), e.to_string())
    }
}

impl From<ToxicError> for ApiError {
    fn from(e: ToxicError) -> Self {
        Self::from_code(e.status_code(), e.to_string())
    }
}

// ── Shared helpers ────────────────────────────────────────────────────────────

/// Decode a JSON request body whatever its content type. An empty body
/// reads as `{}`.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body[..]
    };
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("bad request body: {e}")))
}

// Re-export handler functions for use in router setup.
pub use proxies::{
    handle_populate, handle_proxy_create, handle_proxy_delete, handle_proxy_list,
    handle_proxy_show, handle_proxy_update,
};
pub use status::{handle_reset, handle_version};
pub use toxics::{
    handle_toxic_create, handle_toxic_delete, handle_toxic_list, handle_toxic_show,
    handle_toxic_update,
};
