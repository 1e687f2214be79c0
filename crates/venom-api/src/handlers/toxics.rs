//! /proxies/{proxy}/toxics handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;

use venom_core::{ToxicPatch, ToxicRecord, ToxicRequest};

use super::{parse_body, ApiError, ApiState};

// ── /proxies/{proxy}/toxics ───────────────────────────────────────────────────

pub async fn handle_toxic_list(
    State(state): State<ApiState>,
    Path(proxy): Path<String>,
) -> Result<Json<Vec<ToxicRecord>>, ApiError> {
    let proxy = state.proxy(&proxy).await?;
    let toxics = proxy.toxics().list_toxics().await;
    Ok(Json(toxics.iter().map(|spec| spec.record()).collect()))
}

pub async fn handle_toxic_create(
    State(state): State<ApiState>,
    Path(proxy): Path<String>,
    body: Bytes,
) -> Result<Json<ToxicRecord>, ApiError> {
    let request: ToxicRequest = parse_body(&body)?;
    let proxy = state.proxy(&proxy).await?;
    let spec = proxy.toxics().add_toxic(request).await?;
    Ok(Json(spec.record()))
}

// ── /proxies/{proxy}/toxics/{toxic} ───────────────────────────────────────────

pub async fn handle_toxic_show(
    State(state): State<ApiState>,
    Path((proxy, toxic)): Path<(String, String)>,
) -> Result<Json<ToxicRecord>, ApiError> {
    let proxy = state.proxy(&proxy).await?;
    let spec = proxy.toxics().get_toxic(&toxic).await?;
    Ok(Json(spec.record()))
}

pub async fn handle_toxic_update(
    State(state): State<ApiState>,
    Path((proxy, toxic)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<ToxicRecord>, ApiError> {
    let patch: ToxicPatch = parse_body(&body)?;
    let proxy = state.proxy(&proxy).await?;
    let spec = proxy.toxics().update_toxic(&toxic, patch).await?;
    Ok(Json(spec.record()))
}

pub async fn handle_toxic_delete(
    State(state): State<ApiState>,
    Path((proxy, toxic)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let proxy = state.proxy(&proxy).await?;
    proxy.toxics().remove_toxic(&toxic).await?;
    Ok(StatusCode::NO_CONTENT)
}
