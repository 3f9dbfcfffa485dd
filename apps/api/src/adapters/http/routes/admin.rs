//! Operator endpoints: provider credentials and the event review queue.
//!
//! Mounted behind `require_admin_token`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::use_cases::provider_credentials::CredentialUpdate,
    domain::entities::{payment_event::ProcessingStatus, payment_provider::PaymentProvider},
};

fn parse_provider(raw: &str) -> AppResult<PaymentProvider> {
    raw.parse()
        .map_err(|_| AppError::InvalidInput(format!("Unknown provider '{raw}'")))
}

// ============================================================================
// Credentials
// ============================================================================

/// GET /api/admin/tenants/{tenant_id}/credentials
async fn list_credentials(
    State(app_state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let credentials = app_state
        .credential_use_cases
        .list_masked(tenant_id)
        .await?;
    Ok(Json(credentials))
}

/// PUT|POST /api/admin/tenants/{tenant_id}/credentials/{provider}
async fn upsert_credential(
    State(app_state): State<AppState>,
    Path((tenant_id, provider)): Path<(Uuid, String)>,
    Json(update): Json<CredentialUpdate>,
) -> AppResult<impl IntoResponse> {
    let provider = parse_provider(&provider)?;
    let saved = app_state
        .credential_use_cases
        .upsert(tenant_id, provider, update)
        .await?;
    Ok(Json(saved))
}

/// POST /api/admin/tenants/{tenant_id}/credentials/{provider}/rotate
async fn rotate_credential(
    State(app_state): State<AppState>,
    Path((tenant_id, provider)): Path<(Uuid, String)>,
) -> AppResult<impl IntoResponse> {
    let provider = parse_provider(&provider)?;
    let outcome = app_state
        .credential_use_cases
        .rotate(tenant_id, provider)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/admin/credentials/rotate
async fn rotate_all_credentials(State(app_state): State<AppState>) -> AppResult<impl IntoResponse> {
    let reports = app_state.credential_use_cases.rotate_all().await?;
    Ok(Json(reports))
}

// ============================================================================
// Event review queue
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventListQuery {
    status: Option<String>,
    limit: Option<i64>,
}

/// GET /api/admin/events?status=&limit=
async fn list_events(
    State(app_state): State<AppState>,
    Query(query): Query<EventListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ProcessingStatus>()
                .map_err(|_| AppError::InvalidInput(format!("Unknown event status '{s}'")))
        })
        .transpose()?;

    let events = app_state
        .ledger_use_cases
        .list_events(status, query.limit)
        .await?;
    Ok(Json(events))
}

/// GET /api/admin/events/{id}
async fn get_event(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let event = app_state.ledger_use_cases.get_event(id).await?;
    Ok(Json(event))
}

/// POST /api/admin/events/{id}/replay
async fn replay_event(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<impl IntoResponse> {
    let outcome = app_state.ledger_use_cases.replay(id).await?;
    Ok(Json(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tenants/{tenant_id}/credentials", get(list_credentials))
        .route(
            "/tenants/{tenant_id}/credentials/{provider}",
            post(upsert_credential).put(upsert_credential),
        )
        .route(
            "/tenants/{tenant_id}/credentials/{provider}/rotate",
            post(rotate_credential),
        )
        .route("/credentials/rotate", post(rotate_all_credentials))
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
        .route("/events/{id}/replay", post(replay_event))
}
