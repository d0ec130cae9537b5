pub mod extract;
pub mod handlers;

use crate::error::{GatewayError, Result};
use crate::state::AppState;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Credentialed CORS for exactly one origin; other origins get no CORS
/// headers at all. Methods and headers mirror the preflight request, since
/// wildcards are not allowed with credentials.
pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| GatewayError::Config(format!("invalid CORS origin '{}': {}", origin, e)))?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list([origin]))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

pub fn router(state: Arc<AppState>) -> Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origin)?;

    Ok(Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::get_status))
        .route("/api/search", post(handlers::search))
        .route("/api/indices", get(handlers::list_indices))
        .route("/api/indices/create", post(handlers::create_index))
        .route(
            "/api/indices/create/:progress_id/progress",
            get(handlers::get_creation_progress),
        )
        .route(
            "/api/indices/create/:progress_id/cancel",
            post(handlers::cancel_creation),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
