//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    domain::entities::{
        contribution::{Contribution, ContributionStatus},
        invoice::InvoiceStatus,
        payment_event::{
            Confidence, ContributionData, EventKind, EventPayload, InvoiceData,
            NotificationChannel, OwnerHints, PaymentEvent, RedirectOutcome, SubscriptionData,
        },
        payment_provider::PaymentProvider,
        subscription_plan::PlanTier,
        user_subscription::{OwnerRef, Subscription, SubscriptionStatus},
    },
    infra::crypto::CredentialCipher,
};

pub const TEST_KEY_CURRENT: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";
pub const TEST_KEY_NEXT: &str = "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE=";
pub const TEST_TENANT_ID: Uuid = Uuid::from_u128(0x7e57_7e57_0000_4000_8000_0000_0000_0001);

/// Cipher over the test key.
pub fn test_cipher() -> CredentialCipher {
    CredentialCipher::new_from_base64(TEST_KEY_CURRENT, None).unwrap()
}

/// Cipher after a key rotation: `TEST_KEY_NEXT` current, the old test key previous.
pub fn test_cipher_with_previous() -> CredentialCipher {
    CredentialCipher::new_from_base64(TEST_KEY_NEXT, Some(TEST_KEY_CURRENT)).unwrap()
}

pub fn test_datetime() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
}

/// Create a test subscription owned by user `u1`, bound to `sub_1`.
pub fn create_test_subscription(overrides: impl FnOnce(&mut Subscription)) -> Subscription {
    let mut sub = Subscription {
        id: Uuid::new_v4(),
        owner: OwnerRef::user("u1"),
        provider: PaymentProvider::Stripe,
        plan: PlanTier::Standard,
        status: SubscriptionStatus::Active,
        external_subscription_id: Some("sub_1".to_string()),
        external_customer_id: Some("cus_1".to_string()),
        current_period_start: Some(test_datetime()),
        current_period_end: Some(Utc.with_ymd_and_hms(2025, 2, 15, 12, 0, 0).unwrap()),
        cancel_at_period_end: false,
        canceled_at: None,
        trial_start: None,
        trial_end: None,
        created_at: test_datetime(),
        updated_at: test_datetime(),
    };
    overrides(&mut sub);
    sub
}

/// Create a pending ToyyibPay contribution `C1` / bill `BC1` for RM 50.00.
pub fn create_test_contribution(overrides: impl FnOnce(&mut Contribution)) -> Contribution {
    let mut contribution = Contribution {
        id: "C1".to_string(),
        tenant_id: TEST_TENANT_ID,
        provider: PaymentProvider::Toyyibpay,
        bill_id: "BC1".to_string(),
        amount: 5000,
        currency: "myr".to_string(),
        payer_name: Some("Ahmad Ali".to_string()),
        status: ContributionStatus::Pending,
        transaction_ref: None,
        paid_at: None,
        updated_at: test_datetime(),
    };
    overrides(&mut contribution);
    contribution
}

/// Create a verified Stripe event carrying `payload`.
pub fn create_test_event(
    kind: EventKind,
    payload: EventPayload,
    overrides: impl FnOnce(&mut PaymentEvent),
) -> PaymentEvent {
    let mut event = PaymentEvent {
        provider: PaymentProvider::Stripe,
        provider_event_id: format!("evt_{}", Uuid::new_v4().simple()),
        kind,
        channel: NotificationChannel::SignedWebhook,
        confidence: Confidence::Verified,
        tenant_id: None,
        occurred_at: test_datetime(),
        raw_payload: "{}".to_string(),
        payload,
    };
    overrides(&mut event);
    event
}

pub fn user_hints(user_id: &str) -> OwnerHints {
    OwnerHints {
        user_id: Some(user_id.to_string()),
        ..Default::default()
    }
}

/// Subscription snapshot for `sub_1` owned by `u1`.
pub fn subscription_data(
    status: SubscriptionStatus,
    overrides: impl FnOnce(&mut SubscriptionData),
) -> SubscriptionData {
    let mut data = SubscriptionData {
        external_subscription_id: "sub_1".to_string(),
        external_customer_id: Some("cus_1".to_string()),
        owner: user_hints("u1"),
        status: Some(status),
        plan: Some(PlanTier::Standard),
        current_period_start: Some(test_datetime()),
        current_period_end: Some(Utc.with_ymd_and_hms(2025, 2, 15, 12, 0, 0).unwrap()),
        cancel_at_period_end: false,
        canceled_at: None,
        trial_start: None,
        trial_end: None,
    };
    overrides(&mut data);
    data
}

/// Invoice `inv_1` for `sub_1`, 5000 minor units of MYR.
pub fn invoice_data(status: InvoiceStatus, overrides: impl FnOnce(&mut InvoiceData)) -> InvoiceData {
    let mut data = InvoiceData {
        external_invoice_id: "inv_1".to_string(),
        external_subscription_id: Some("sub_1".to_string()),
        owner: OwnerHints::default(),
        amount_paid: 5000,
        currency: "myr".to_string(),
        status,
        invoice_url: Some("https://pay.stripe.com/invoice/inv_1/pdf".to_string()),
        hosted_invoice_url: Some("https://invoice.stripe.com/i/inv_1".to_string()),
    };
    overrides(&mut data);
    data
}

/// Redirect-style event for contribution `C1` / bill `BC1`.
pub fn create_test_contribution_event(
    outcome: RedirectOutcome,
    overrides: impl FnOnce(&mut PaymentEvent),
) -> PaymentEvent {
    let data = ContributionData {
        contribution_id: "C1".to_string(),
        bill_id: "BC1".to_string(),
        outcome,
        status_code: match outcome {
            RedirectOutcome::Success => "1",
            RedirectOutcome::Pending => "2",
            RedirectOutcome::Failed => "3",
        }
        .to_string(),
        transaction_ref: Some("TP123".to_string()),
        amount: None,
        payer_name: None,
    };
    let mut event = create_test_event(outcome.event_kind(), EventPayload::Contribution(data), |e| {
        e.provider = PaymentProvider::Toyyibpay;
        e.provider_event_id = format!("BC1:{outcome}");
        e.channel = NotificationChannel::BrowserRedirect;
        e.confidence = Confidence::Unverified;
    });
    overrides(&mut event);
    event
}
