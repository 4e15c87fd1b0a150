use crate::state::AppState;
use axum::{
    http::HeaderValue,
    middleware,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

mod admin;
pub mod common;
mod logs;
mod proxy;

pub fn build_routes(state: Arc<AppState>) -> Router {
    // Admin (X-Admin-Password)
    let admin_routes = Router::new()
        .route(
            "/admin/tokens",
            get(admin::list_tokens)
                .post(admin::add_tokens)
                .delete(admin::clear_tokens),
        )
        .route("/admin/tokens/:id", delete(admin::remove_token))
        .route("/admin/stats", get(admin::get_stats))
        .route("/admin/token-details", get(admin::token_details))
        .route("/admin/test", get(admin::test_auth))
        .route("/admin/logs", get(logs::get_proxy_logs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            common::require_admin,
        ));

    let cors = cors_layer(&state);

    Router::new()
        .route("/", get(proxy::index))
        .route("/health", get(proxy::health_check))
        .route("/api/rate-limit", get(proxy::rate_limit_status))
        // Proxy
        .route("/api/*path", get(proxy::proxy_upstream))
        .merge(admin_routes)
        .fallback(proxy::not_found)
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(common::request_logger))
}

fn cors_layer(state: &AppState) -> CorsLayer {
    if state.config.allows_any_origin() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
