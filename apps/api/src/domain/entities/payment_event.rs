use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{
    invoice::InvoiceStatus,
    payment_provider::PaymentProvider,
    subscription_plan::PlanTier,
    user_subscription::{OwnerRef, SubscriptionStatus},
};

/// Normalized kind of an inbound provider notification
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "event_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    CheckoutCompleted,
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoiceFailed,
    RedirectConfirmed,
    RedirectFailed,
    /// Unmapped or not-yet-final provider status. Never treated as success or failure.
    Pending,
}

impl EventKind {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, EventKind::Pending)
    }
}

/// Processing status of a ledger row
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "event_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProcessingStatus {
    Received,
    Applied,
    Ignored,
    Failed,
}

impl ProcessingStatus {
    /// Statuses an operator may replay after fixing the underlying data.
    pub fn is_replayable(&self) -> bool {
        matches!(self, ProcessingStatus::Ignored | ProcessingStatus::Failed)
    }
}

/// Transport a notification arrived on
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "notification_channel", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationChannel {
    SignedWebhook,
    ServerCallback,
    BrowserRedirect,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "event_confidence", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    /// Authenticity proven by a signature.
    Verified,
    Unverified,
}

/// Three-bucket outcome used by redirect-style gateways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RedirectOutcome {
    Success,
    Pending,
    Failed,
}

impl RedirectOutcome {
    pub fn event_kind(&self) -> EventKind {
        match self {
            RedirectOutcome::Success => EventKind::RedirectConfirmed,
            RedirectOutcome::Failed => EventKind::RedirectFailed,
            RedirectOutcome::Pending => EventKind::Pending,
        }
    }
}

/// Owner identifiers a provider echoed back from our own metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mosque_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_reference_id: Option<String>,
}

impl OwnerHints {
    /// Ordered resolution: `user_id`, legacy `mosque_id`, then checkout `client_reference_id`.
    pub fn metadata_owner(&self) -> Option<OwnerRef> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        if let Some(id) = present(&self.user_id) {
            return Some(OwnerRef::user(id));
        }
        if let Some(id) = present(&self.mosque_id) {
            return Some(OwnerRef::mosque(id));
        }
        present(&self.client_reference_id).map(OwnerRef::user)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutData {
    pub session_id: String,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub owner: OwnerHints,
    pub plan: Option<PlanTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub external_subscription_id: String,
    pub external_customer_id: Option<String>,
    pub owner: OwnerHints,
    /// `None` when the provider status has no internal counterpart.
    pub status: Option<SubscriptionStatus>,
    pub plan: Option<PlanTier>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceData {
    pub external_invoice_id: String,
    pub external_subscription_id: Option<String>,
    pub owner: OwnerHints,
    /// Minor currency units.
    pub amount_paid: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub invoice_url: Option<String>,
    pub hosted_invoice_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionData {
    pub contribution_id: String,
    pub bill_id: String,
    pub outcome: RedirectOutcome,
    /// Provider status code exactly as received.
    pub status_code: String,
    pub transaction_ref: Option<String>,
    /// Minor currency units, when the provider reported one.
    pub amount: Option<i64>,
    pub payer_name: Option<String>,
}

/// Provider-independent payload of a normalized event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Checkout(CheckoutData),
    Subscription(SubscriptionData),
    Invoice(InvoiceData),
    Contribution(ContributionData),
    Unrecognized { event_type: String },
}

/// A normalized inbound notification, ready for the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub provider: PaymentProvider,
    pub provider_event_id: String,
    pub kind: EventKind,
    pub channel: NotificationChannel,
    pub confidence: Confidence,
    /// Tenant the notification was addressed to, when the route carries one.
    pub tenant_id: Option<Uuid>,
    pub occurred_at: DateTime<Utc>,
    /// Verbatim request body or query string.
    pub raw_payload: String,
    pub payload: EventPayload,
}

/// A row of the event ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub provider: PaymentProvider,
    pub provider_event_id: String,
    pub kind: EventKind,
    pub channel: NotificationChannel,
    pub confidence: Confidence,
    pub tenant_id: Option<Uuid>,
    pub status: ProcessingStatus,
    pub status_note: Option<String>,
    pub payload: EventPayload,
    #[serde(skip_serializing)]
    pub raw_payload: String,
    pub occurred_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl StoredEvent {
    /// Rebuilds the normalized event from its stored form.
    pub fn to_event(&self) -> PaymentEvent {
        PaymentEvent {
            provider: self.provider,
            provider_event_id: self.provider_event_id.clone(),
            kind: self.kind,
            channel: self.channel,
            confidence: self.confidence,
            tenant_id: self.tenant_id,
            occurred_at: self.occurred_at,
            raw_payload: self.raw_payload.clone(),
            payload: self.payload.clone(),
        }
    }
}
