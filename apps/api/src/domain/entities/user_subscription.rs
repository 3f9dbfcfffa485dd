use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{payment_provider::PaymentProvider, subscription_plan::PlanTier};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    PastDue,
    Unpaid,
    Canceled,
}

impl SubscriptionStatus {
    /// Convert from a Stripe subscription status string.
    ///
    /// `incomplete`, `paused` and anything unknown have no counterpart and
    /// return `None`; the event carrying them is not actionable yet.
    pub fn from_stripe(s: &str) -> Option<Self> {
        match s {
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" => Some(SubscriptionStatus::PastDue),
            "unpaid" => Some(SubscriptionStatus::Unpaid),
            "canceled" | "incomplete_expired" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Canceled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Self-transitions are always allowed, `canceled` is reachable from every
    /// live state and nothing leaves `canceled`.
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Canceled, _) => false,
            (_, Canceled) => true,
            (Trialing, Active | PastDue) => true,
            (Active, PastDue | Unpaid) => true,
            (PastDue, Active | Unpaid) => true,
            (Unpaid, Active) => true,
            _ => false,
        }
    }
}

/// What kind of entity owns a subscription.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    AsRefStr,
    Display,
    EnumString,
)]
#[sqlx(type_name = "owner_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OwnerKind {
    User,
    /// Legacy subscriptions linked to a mosque rather than a user.
    Mosque,
}

/// Identifies the owner of a subscription or invoice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: String,
}

impl OwnerRef {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::User,
            id: id.into(),
        }
    }

    pub fn mosque(id: impl Into<String>) -> Self {
        Self {
            kind: OwnerKind::Mosque,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Subscription state owned by the reconciliation engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub provider: PaymentProvider,
    pub plan: PlanTier,
    pub status: SubscriptionStatus,
    pub external_subscription_id: Option<String>,
    pub external_customer_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub trial_start: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Fresh record for an owner seen for the first time.
    pub fn new_for(owner: OwnerRef, provider: PaymentProvider, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            provider,
            plan: PlanTier::Free,
            status: SubscriptionStatus::Trialing,
            external_subscription_id: None,
            external_customer_id: None,
            current_period_start: None,
            current_period_end: None,
            cancel_at_period_end: false,
            canceled_at: None,
            trial_start: None,
            trial_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_bound_to(&self, external_subscription_id: &str) -> bool {
        self.external_subscription_id.as_deref() == Some(external_subscription_id)
    }
}

/// Audit row written whenever an event touches a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionAudit {
    pub subscription_id: Uuid,
    pub ledger_id: Uuid,
    pub previous_status: Option<SubscriptionStatus>,
    pub new_status: SubscriptionStatus,
    pub note: Option<String>,
}
