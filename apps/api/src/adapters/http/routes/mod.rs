pub mod admin;
pub mod callbacks;
pub mod redirects;
pub mod webhooks;

use axum::{Json, Router, middleware, response::IntoResponse, routing::get};

use crate::adapters::http::{app_state::AppState, middleware::require_admin_token};

/// GET /api/health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn router(app_state: AppState) -> Router<AppState> {
    let admin = admin::router().route_layer(middleware::from_fn_with_state(
        app_state,
        require_admin_token,
    ));

    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhooks::router())
        .nest("/redirects", redirects::router())
        .nest("/callbacks", callbacks::router())
        .nest("/admin", admin)
}
