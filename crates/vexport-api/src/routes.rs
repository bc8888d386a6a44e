//! API routes.

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::exports::{
    cancel_export, delete_export, download_export, get_export, get_export_status, list_exports,
    retry_export, submit_export,
};
use crate::handlers::settings::{get_settings, update_settings};
use crate::handlers::{health, ready};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let export_routes = Router::new()
        .route("/exports", post(submit_export).get(list_exports))
        .route(
            "/exports/:export_id",
            get(get_export).delete(delete_export),
        )
        .route("/exports/:export_id/status", get(get_export_status))
        .route("/exports/:export_id/cancel", post(cancel_export))
        .route("/exports/:export_id/retry", post(retry_export))
        .route("/exports/:export_id/download", get(download_export));

    let settings_routes = Router::new()
        .route("/settings", get(get_settings).put(update_settings));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    Router::new()
        .nest("/api", export_routes.merge(settings_routes))
        .merge(health_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed_headers = [header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN];
    let exposed_headers = [
        header::CONTENT_LENGTH,
        header::CONTENT_TYPE,
        header::CONTENT_DISPOSITION,
    ];
    let allowed_methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
    } else {
        let origins: Vec<axum::http::HeaderValue> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
            .expose_headers(exposed_headers)
            .allow_credentials(true)
    }
}
