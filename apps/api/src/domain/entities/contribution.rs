use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::payment_provider::PaymentProvider;

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
#[sqlx(type_name = "contribution_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContributionStatus {
    Pending,
    Paid,
    Failed,
}

impl ContributionStatus {
    /// pending -> paid|failed, failed -> paid. Paid is terminal.
    pub fn can_transition_to(&self, next: ContributionStatus) -> bool {
        use ContributionStatus::*;
        matches!((self, next), (Pending, Paid | Failed) | (Failed, Paid))
    }
}

/// A pending donation/claim paid through a redirect-style gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contribution {
    pub id: String,
    pub tenant_id: Uuid,
    pub provider: PaymentProvider,
    /// Provider bill/order reference, the second half of the compound key.
    pub bill_id: String,
    pub amount: i64,
    pub currency: String,
    pub payer_name: Option<String>,
    pub status: ContributionStatus,
    pub transaction_ref: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Compound lookup key. Both halves must be present and must match the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContributionKey {
    pub contribution_id: String,
    pub bill_id: String,
}

impl ContributionKey {
    /// Builds a key, failing closed when either half is blank.
    pub fn new(contribution_id: Option<&str>, bill_id: Option<&str>) -> Option<Self> {
        let contribution_id = contribution_id.map(str::trim).filter(|s| !s.is_empty())?;
        let bill_id = bill_id.map(str::trim).filter(|s| !s.is_empty())?;
        Some(Self {
            contribution_id: contribution_id.to_string(),
            bill_id: bill_id.to_string(),
        })
    }
}
