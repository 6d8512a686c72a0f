pub mod auth;
pub mod db;
pub mod error;
pub mod handlers;
pub mod report;
pub mod routes;
pub mod s3;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Builds the full application router. Environment-specific layers (CORS,
/// request tracing) are stacked on top by the binary.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::version_routes())
        .merge(routes::download_routes())
        .merge(routes::hack_routes())
        .merge(routes::health_routes())
        .fallback(handlers::route_not_found)
        .with_state(state)
}
