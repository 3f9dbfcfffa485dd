//! Signed card-network webhooks.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use secrecy::SecretString;
use tracing::info;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::{
        ports::provider_adapter::{InboundNotification, ProviderAdapter},
        use_cases::event_ledger::IngestOutcome,
    },
    domain::entities::payment_provider::PaymentProvider,
    infra::providers::StripeAdapter,
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// POST /api/webhooks/stripe
/// Platform account events, signed with `STRIPE_WEBHOOK_SECRET`.
async fn stripe_platform_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let secret = app_state
        .config
        .stripe_webhook_secret
        .clone()
        .ok_or(AppError::NotFound)?;
    let adapter = StripeAdapter::new(secret, app_state.config.webhook_tolerance_secs);

    ingest(&app_state, &adapter, &headers, body, None).await
}

/// POST /api/webhooks/stripe/{tenant_id}
/// Tenant-connected account events, signed with the tenant's stored `webhook_secret`.
async fn stripe_tenant_webhook(
    State(app_state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    headers: HeaderMap,
    body: String,
) -> AppResult<impl IntoResponse> {
    let credential = app_state
        .credential_use_cases
        .decrypted_credential(tenant_id, PaymentProvider::Stripe)
        .await?;
    let secret = credential
        .field("webhook_secret")
        .ok_or(AppError::NotFound)?;
    let adapter = StripeAdapter::new(
        SecretString::new(secret.into()),
        app_state.config.webhook_tolerance_secs,
    );

    ingest(&app_state, &adapter, &headers, body, Some(tenant_id)).await
}

async fn ingest(
    app_state: &AppState,
    adapter: &dyn ProviderAdapter,
    headers: &HeaderMap,
    body: String,
    tenant_id: Option<Uuid>,
) -> AppResult<Json<IngestOutcome>> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let notification = InboundNotification::signed_webhook(body, signature, tenant_id);
    let event = adapter.verify_and_parse(&notification)?;

    info!(
        provider = %event.provider,
        provider_event_id = %event.provider_event_id,
        kind = %event.kind,
        tenant_id = ?tenant_id,
        "Webhook received"
    );

    let outcome = app_state.ledger_use_cases.ingest(event).await?;
    Ok(Json(outcome))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(stripe_platform_webhook))
        .route("/stripe/{tenant_id}", post(stripe_tenant_webhook))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::Utc;
    use infaq_types::sign_payload;
    use serde_json::json;

    use super::*;
    use crate::{
        domain::entities::{
            payment_event::ProcessingStatus,
            user_subscription::{OwnerRef, SubscriptionStatus},
        },
        test_utils::{
            InMemoryLedgerStore, InMemoryProviderCredentialRepo, TEST_STRIPE_SECRET,
            TEST_TENANT_ID, TestAppStateBuilder, create_test_subscription, test_cipher,
        },
    };

    const TENANT_SECRET: &str = "whsec_tenant_test";

    fn build_test_router(app_state: AppState) -> Router<()> {
        router().with_state(app_state)
    }

    fn invoice_paid_body(event_id: &str) -> String {
        json!({
            "id": event_id,
            "type": "invoice.paid",
            "created": 1_706_500_000,
            "data": { "object": {
                "id": "in_1",
                "subscription": "sub_1",
                "amount_paid": 2900,
                "currency": "myr",
                "status": "paid",
                "metadata": { "user_id": "u1" }
            }}
        })
        .to_string()
    }

    fn signed(secret: &str, body: &str) -> String {
        sign_payload(secret, Utc::now().timestamp(), body)
    }

    fn store_with_past_due_subscription() -> Arc<InMemoryLedgerStore> {
        Arc::new(InMemoryLedgerStore::new().with_subscription(create_test_subscription(|s| {
            s.owner = OwnerRef::user("u1");
            s.status = SubscriptionStatus::PastDue;
            s.external_subscription_id = Some("sub_1".to_string());
        })))
    }

    // =========================================================================
    // POST /stripe
    // =========================================================================

    #[tokio::test]
    async fn signed_webhook_is_applied() {
        let store = store_with_past_due_subscription();
        let app_state = TestAppStateBuilder::new()
            .with_ledger_store(store.clone())
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        let response = server
            .post("/stripe")
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TEST_STRIPE_SECRET, &body))
            .text(body)
            .await;

        response.assert_status_ok();
        let json = response.json::<serde_json::Value>();
        assert_eq!(json["ingest"], "recorded");
        assert_eq!(json["outcome"]["result"], "applied");

        let state = store.snapshot().await;
        assert_eq!(
            state.subscription_for(&OwnerRef::user("u1")).unwrap().status,
            SubscriptionStatus::Active
        );
        assert_eq!(state.event("evt_1").unwrap().status, ProcessingStatus::Applied);
    }

    #[tokio::test]
    async fn redelivery_is_acknowledged_as_duplicate() {
        let store = store_with_past_due_subscription();
        let app_state = TestAppStateBuilder::new()
            .with_ledger_store(store.clone())
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        for _ in 0..2 {
            server
                .post("/stripe")
                .add_header(STRIPE_SIGNATURE_HEADER, signed(TEST_STRIPE_SECRET, &body))
                .text(body.clone())
                .await
                .assert_status_ok();
        }

        let response = server
            .post("/stripe")
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TEST_STRIPE_SECRET, &body))
            .text(body)
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<serde_json::Value>()["ingest"], "duplicate");

        assert_eq!(store.snapshot().await.events.len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_returns_400_and_writes_nothing() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let app_state = TestAppStateBuilder::new()
            .with_ledger_store(store.clone())
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        let response = server
            .post("/stripe")
            .add_header(STRIPE_SIGNATURE_HEADER, signed("whsec_wrong", &body))
            .text(body)
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<serde_json::Value>()["code"],
            "INVALID_SIGNATURE"
        );
        assert!(store.snapshot().await.events.is_empty());
    }

    #[tokio::test]
    async fn missing_signature_returns_400() {
        let app_state = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let response = server.post("/stripe").text(invoice_paid_body("evt_1")).await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn platform_route_without_secret_returns_404() {
        let app_state = TestAppStateBuilder::new()
            .without_platform_stripe_secret()
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        let response = server
            .post("/stripe")
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TEST_STRIPE_SECRET, &body))
            .text(body)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    // =========================================================================
    // POST /stripe/{tenant_id}
    // =========================================================================

    #[tokio::test]
    async fn tenant_webhook_uses_stored_secret() {
        let repo = Arc::new(InMemoryProviderCredentialRepo::new());
        let cipher = test_cipher();
        let encrypted = cipher.encrypt(TENANT_SECRET).unwrap();
        repo.insert_raw(
            TEST_TENANT_ID,
            PaymentProvider::Stripe,
            &[("secret_key", "sk_test_1"), ("webhook_secret", &encrypted)],
        );

        let store = store_with_past_due_subscription();
        let app_state = TestAppStateBuilder::new()
            .with_ledger_store(store.clone())
            .with_credential_repo(repo)
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_tenant");
        let response = server
            .post(&format!("/stripe/{}", TEST_TENANT_ID))
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TENANT_SECRET, &body))
            .text(body.clone())
            .await;
        response.assert_status_ok();

        let event = store.snapshot().await.event("evt_tenant").cloned().unwrap();
        assert_eq!(event.tenant_id, Some(TEST_TENANT_ID));

        // The platform secret does not authenticate tenant events.
        let response = server
            .post(&format!("/stripe/{}", TEST_TENANT_ID))
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TEST_STRIPE_SECRET, &body))
            .text(body)
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_tenant_returns_404() {
        let app_state = TestAppStateBuilder::new().build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        let response = server
            .post(&format!("/stripe/{}", Uuid::new_v4()))
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TENANT_SECRET, &body))
            .text(body)
            .await;

        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn undecryptable_tenant_secret_returns_503() {
        let repo = Arc::new(InMemoryProviderCredentialRepo::new());
        repo.insert_raw(
            TEST_TENANT_ID,
            PaymentProvider::Stripe,
            &[("webhook_secret", "enc:v1:unknownkey:AAAA")],
        );
        let app_state = TestAppStateBuilder::new()
            .with_credential_repo(repo)
            .build();
        let server = TestServer::new(build_test_router(app_state)).unwrap();

        let body = invoice_paid_body("evt_1");
        let response = server
            .post(&format!("/stripe/{}", TEST_TENANT_ID))
            .add_header(STRIPE_SIGNATURE_HEADER, signed(TENANT_SECRET, &body))
            .text(body)
            .await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    }
}
