use crate::{
    app_error::AppResult,
    application::ports::provider_adapter::{InboundNotification, ProviderAdapter},
    domain::entities::{
        payment_event::{PaymentEvent, RedirectOutcome},
        payment_provider::PaymentProvider,
    },
};

use super::{RedirectFields, amount_in_sen, redirect_event, require};

/// Billplz redirect (`billplz[id]`, `billplz[paid]`, `contribution_id`) and
/// callback (`id`, `paid`, `state`, `paid_amount`, `reference_1`, `name`).
#[derive(Debug, Clone, Default)]
pub struct BillplzAdapter;

impl BillplzAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn outcome_for(paid: &str, state: Option<&str>) -> RedirectOutcome {
        if paid.eq_ignore_ascii_case("true") {
            return RedirectOutcome::Success;
        }
        match state {
            Some("deleted") => RedirectOutcome::Failed,
            _ => RedirectOutcome::Pending,
        }
    }
}

/// Billplz reports amounts in sen already.
fn parse_sen(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok().filter(|v| *v >= 0)
}

impl ProviderAdapter for BillplzAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Billplz
    }

    fn verify_and_parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent> {
        let paid = require(notification, &["billplz[paid]", "paid"], "paid flag")?;
        let bill_id = require(notification, &["billplz[id]", "id"], "bill id")?;
        let contribution_id = require(
            notification,
            &["contribution_id", "reference_1"],
            "contribution id",
        )?;
        let amount = amount_in_sen(notification, &["paid_amount", "amount"], parse_sen)?;
        let state = notification.first_param(&["billplz[state]", "state"]);

        Ok(redirect_event(
            self.provider(),
            notification,
            RedirectFields {
                contribution_id,
                bill_id,
                status_code: paid,
                outcome: Self::outcome_for(paid, state),
                transaction_ref: notification.first_param(&["billplz[transaction_id]", "transaction_id"]),
                amount,
                payer_name: notification.param("name"),
            },
        ))
    }
}
