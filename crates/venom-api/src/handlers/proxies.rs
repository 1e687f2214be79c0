//! /proxies and /populate handlers.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;

use venom_core::{ProxyConfig, ProxyPatch, ProxyRecord};

use super::{parse_body, ApiError, ApiState};

// ── /proxies ──────────────────────────────────────────────────────────────────

pub async fn handle_proxy_list(State(state): State<ApiState>) -> Json<BTreeMap<String, ProxyRecord>> {
    let mut records = BTreeMap::new();
    for proxy in state.proxies.list().await {
        records.insert(proxy.name().to_string(), proxy.record().await);
    }
    Json(records)
}

pub async fn handle_proxy_create(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ProxyRecord>), ApiError> {
    let config: ProxyConfig = parse_body(&body)?;
    let proxy = state.proxies.add(config).await?;
    tracing::info!(proxy = %proxy.name(), "proxy created");
    Ok((StatusCode::CREATED, Json(proxy.record().await)))
}

// ── /populate ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct PopulateResponse {
    pub proxies: Vec<ProxyRecord>,
}

pub async fn handle_populate(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<PopulateResponse>), ApiError> {
    let configs: Vec<ProxyConfig> = parse_body(&body)?;
    let populated = state.proxies.populate(configs).await?;

    let mut proxies = Vec::with_capacity(populated.len());
    for proxy in populated {
        proxies.push(proxy.record().await);
    }
    Ok((StatusCode::CREATED, Json(PopulateResponse { proxies })))
}

// ── /proxies/{proxy} ──────────────────────────────────────────────────────────

pub async fn handle_proxy_show(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<ProxyRecord>, ApiError> {
    let proxy = state.proxy(&name).await?;
    Ok(Json(proxy.record().await))
}

pub async fn handle_proxy_update(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ProxyRecord>, ApiError> {
    let patch: ProxyPatch = parse_body(&body)?;
    let proxy = state.proxy(&name).await?;
    proxy.update(patch).await?;
    Ok(Json(proxy.record().await))
}

pub async fn handle_proxy_delete(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.proxies.remove(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}
