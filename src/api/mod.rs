//! REST API module using Axum
//!
//! JSON endpoints over a shared, read-only [`ScoringContext`](crate::pipeline::ScoringContext).
//! Responses use the `{"status": "success" | "error", ...}` envelope from
//! [`envelope`].

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Environment variable holding comma-separated allowed CORS origins.
pub const CORS_ORIGINS_ENV: &str = "EXO_CORS_ORIGINS";

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `EXO_CORS_ORIGINS` to a comma-separated list of allowed origins
/// (e.g. `http://localhost:3000` for a local front end).
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the application router with all middleware.
///
/// Bodies over `max_body_bytes` are refused by the JSON extractor, so the
/// 413 still arrives in the error envelope.
pub fn create_app(state: ApiState, max_body_bytes: usize) -> Router {
    routes::api_routes(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer())
}
