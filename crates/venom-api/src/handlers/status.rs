//! /version and /reset handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::{ApiError, ApiState};

// ── /version ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
}

pub async fn handle_version() -> Json<VersionResponse> {
    Json(VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── /reset ────────────────────────────────────────────────────────────────────

/// Re-enable every proxy and drop all toxics.
pub async fn handle_reset(State(state): State<ApiState>) -> Result<StatusCode, ApiError> {
    state.proxies.reset_state().await?;
    Ok(StatusCode::NO_CONTENT)
}
