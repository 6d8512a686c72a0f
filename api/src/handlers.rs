use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use shared::models::{ChangelogEntry, PatchId, VersionEntry};

use crate::auth::CurrentActor;
use crate::error::{ApiError, ApiResult};
use crate::report::{self, ReportRequest};
use crate::state::AppState;

fn require_actor(actor: CurrentActor) -> Result<Uuid, ApiError> {
    actor.0.ok_or_else(|| ApiError::unauthorized("Unauthorized"))
}

fn store_internal_error(operation: &str, err: shared::store::StoreError) -> ApiError {
    tracing::error!(operation = operation, error = ?err, "store operation failed");
    ApiError::internal("An unexpected storage error occurred")
}

// ─────────────────────────────────────────────────────────────────────────────
// Version lifecycle
// ─────────────────────────────────────────────────────────────────────────────

pub async fn publish_patch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    let promoted = state.lifecycle.publish(&slug, actor, patch_id).await?;
    Ok(Json(json!({ "ok": true, "promoted": promoted })))
}

pub async fn archive_patch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state.lifecycle.archive(&slug, actor, patch_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn restore_patch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state.lifecycle.restore(&slug, actor, patch_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn rollback_patch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state.lifecycle.rollback(&slug, actor, patch_id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub version: String,
}

pub async fn rename_patch(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
    Json(req): Json<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state
        .lifecycle
        .rename(&slug, actor, patch_id, &req.version)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ChangelogRequest {
    pub changelog: String,
}

pub async fn edit_changelog(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
    Json(req): Json<ChangelogRequest>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state
        .lifecycle
        .edit_changelog(&slug, actor, patch_id, &req.changelog)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct ReuploadRequest {
    pub object_key: String,
}

pub async fn request_reupload(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
    Json(req): Json<ReuploadRequest>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    let upload_url = state
        .lifecycle
        .request_reupload(&slug, actor, patch_id, &req.object_key)
        .await?;
    Ok(Json(json!({ "ok": true, "upload_url": upload_url })))
}

pub async fn confirm_reupload(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path((slug, patch_id)): Path<(String, PatchId)>,
    Json(req): Json<ReuploadRequest>,
) -> ApiResult<Json<Value>> {
    let actor = require_actor(actor)?;
    state
        .lifecycle
        .confirm_reupload(&slug, actor, patch_id, &req.object_key)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Downloads & artifact access
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecordDownloadRequest {
    pub device_id: Vec<String>,
}

pub async fn record_download(
    State(state): State<AppState>,
    Path(patch_id): Path<PatchId>,
    Json(req): Json<RecordDownloadRequest>,
) -> ApiResult<Json<Value>> {
    let increased = state
        .lifecycle
        .record_download(patch_id, &req.device_id)
        .await?;
    Ok(Json(json!({ "ok": true, "increased": increased })))
}

pub async fn patch_download_url(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(patch_id): Path<PatchId>,
) -> ApiResult<Json<Value>> {
    let url = state
        .lifecycle
        .patch_download_url(patch_id, actor.0)
        .await?;
    Ok(Json(json!({ "ok": true, "url": url })))
}

pub async fn current_patch_url(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    let url = state.lifecycle.current_patch_url(&slug, actor.0).await?;
    Ok(Json(json!({ "ok": true, "url": url })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Listings & reports
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VersionListQuery {
    #[serde(default)]
    pub include_archived: bool,
}

pub async fn list_versions(
    State(state): State<AppState>,
    actor: CurrentActor,
    Path(slug): Path<String>,
    Query(query): Query<VersionListQuery>,
) -> ApiResult<Json<Value>> {
    let patches = state
        .lifecycle
        .list_versions(&slug, actor.0, query.include_archived)
        .await?;
    let versions: Vec<VersionEntry> = patches.into_iter().map(VersionEntry::from).collect();
    Ok(Json(json!({ "ok": true, "versions": versions })))
}

pub async fn changelog(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<Value>> {
    let patches = state.lifecycle.changelog(&slug).await?;
    let entries: Vec<ChangelogEntry> = patches.into_iter().map(ChangelogEntry::from).collect();
    Ok(Json(json!({ "ok": true, "entries": entries })))
}

pub async fn submit_report(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<ReportRequest>,
) -> ApiResult<Json<Value>> {
    let hack = state
        .store
        .hack_by_slug(&slug)
        .await
        .map_err(|err| store_internal_error("load hack", err))?
        .ok_or_else(|| ApiError::not_found("NotFound", "Hack not found"))?;

    let validated =
        report::validate_report(&req).map_err(|msg| ApiError::bad_request("ValidationError", msg))?;

    let embed = report::build_embed(&hack, &req, &validated, &state.reports.hack_url(&slug));
    state.reports.send(embed).await.map_err(|err| {
        tracing::error!(hack = %slug, error = ?err, "failed to deliver hack report webhook");
        ApiError::internal("Failed to submit report. Please try again later.")
    })?;

    Ok(Json(json!({ "ok": true })))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let uptime = state.started_at.elapsed().as_secs();
    let now = chrono::Utc::now().to_rfc3339();

    let db_ok = state.store.ping().await.is_ok();

    if db_ok {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": now,
                "uptime_secs": uptime
            })),
        )
    } else {
        tracing::warn!(uptime_secs = uptime, "health check degraded — db unreachable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "degraded",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": now,
                "uptime_secs": uptime
            })),
        )
    }
}

pub async fn route_not_found() -> ApiError {
    ApiError::not_found("RouteNotFound", "The requested route does not exist")
}
