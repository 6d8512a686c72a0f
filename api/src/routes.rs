use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, state::AppState};

pub fn version_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/hacks/:slug/patches/:id/publish",
            post(handlers::publish_patch),
        )
        .route(
            "/api/hacks/:slug/patches/:id/archive",
            post(handlers::archive_patch),
        )
        .route(
            "/api/hacks/:slug/patches/:id/restore",
            post(handlers::restore_patch),
        )
        .route(
            "/api/hacks/:slug/patches/:id/rollback",
            post(handlers::rollback_patch),
        )
        .route(
            "/api/hacks/:slug/patches/:id/version",
            put(handlers::rename_patch),
        )
        .route(
            "/api/hacks/:slug/patches/:id/changelog",
            put(handlers::edit_changelog),
        )
        .route(
            "/api/hacks/:slug/patches/:id/reupload",
            post(handlers::request_reupload),
        )
        .route(
            "/api/hacks/:slug/patches/:id/reupload/confirm",
            post(handlers::confirm_reupload),
        )
}

pub fn download_routes() -> Router<AppState> {
    Router::new()
        .route("/api/patches/:id/downloads", post(handlers::record_download))
        .route("/api/patches/:id/url", get(handlers::patch_download_url))
        .route("/api/hacks/:slug/patch-url", get(handlers::current_patch_url))
}

pub fn hack_routes() -> Router<AppState> {
    Router::new()
        .route("/api/hacks/:slug/versions", get(handlers::list_versions))
        .route("/api/hacks/:slug/changelog", get(handlers::changelog))
        .route("/api/hacks/:slug/report", post(handlers::submit_report))
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health_check))
}
