use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{payment_provider::PaymentProvider, user_subscription::OwnerRef};

/// Invoice status as recorded in the ledger
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
#[sqlx(type_name = "invoice_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    Paid,
    Failed,
    Open,
    Void,
    Uncollectible,
}

impl InvoiceStatus {
    /// Convert from Stripe invoice status string
    pub fn from_stripe_invoice_status(s: &str) -> Option<Self> {
        match s {
            "paid" => Some(InvoiceStatus::Paid),
            "open" | "draft" => Some(InvoiceStatus::Open),
            "void" => Some(InvoiceStatus::Void),
            "uncollectible" => Some(InvoiceStatus::Uncollectible),
            _ => None,
        }
    }

    /// Paid and void invoices never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }

    /// Whether an existing row in `self` may be relabelled as `next`.
    pub fn can_normalize_to(&self, next: InvoiceStatus) -> bool {
        !self.is_terminal() && *self != next
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub owner: OwnerRef,
    pub provider: PaymentProvider,
    pub external_invoice_id: String,
    pub external_subscription_id: Option<String>,
    /// Minor currency units.
    pub amount_paid: i64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub invoice_url: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub ledger_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// What happened when an invoice was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceWrite {
    Created,
    StatusNormalized { previous: InvoiceStatus },
    Unchanged,
}

impl InvoiceWrite {
    pub fn changed(&self) -> bool {
        !matches!(self, InvoiceWrite::Unchanged)
    }
}
