//! Server-to-server callbacks from redirect-style gateways.

use axum::{
    Router,
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
};
use tracing::info;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::ports::provider_adapter::InboundNotification,
    domain::entities::{payment_event::NotificationChannel, payment_provider::PaymentProvider},
    infra::providers::redirect_adapter,
};

use super::redirects::parse_form;

/// POST /api/callbacks/{provider}
/// Form body, or query string when the gateway sends an empty body.
async fn provider_callback(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    RawQuery(query): RawQuery,
    body: String,
) -> AppResult<impl IntoResponse> {
    let adapter = provider
        .parse::<PaymentProvider>()
        .ok()
        .and_then(redirect_adapter)
        .ok_or(AppError::NotFound)?;

    let raw = if body.trim().is_empty() {
        query.unwrap_or_default()
    } else {
        body
    };
    let notification = InboundNotification::with_params(
        NotificationChannel::ServerCallback,
        raw.clone(),
        parse_form(&raw),
    );

    let outcome = app_state
        .redirect_use_cases
        .handle_callback(adapter.as_ref(), &notification)
        .await?;

    info!(provider = %adapter.provider(), applied = outcome.applied(), "Callback processed");

    Ok((StatusCode::OK, "OK"))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{provider}", post(provider_callback))
}
