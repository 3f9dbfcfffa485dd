use crate::{
    app_error::AppResult,
    application::ports::provider_adapter::{InboundNotification, ProviderAdapter},
    domain::entities::{
        payment_event::{PaymentEvent, RedirectOutcome},
        payment_provider::PaymentProvider,
    },
};

use super::{RedirectFields, amount_in_sen, parse_ringgit_to_sen, redirect_event, require};

/// ToyyibPay browser redirect (`status_id`, `billcode`, `order_id`) and
/// server callback (`status`, `billcode`, `order_id`, `refno`, `amount`).
#[derive(Debug, Clone, Default)]
pub struct ToyyibpayAdapter;

impl ToyyibpayAdapter {
    pub fn new() -> Self {
        Self
    }

    /// `1` paid, `3` failed; `2` and anything unknown stay pending.
    pub fn outcome_for(status_code: &str) -> RedirectOutcome {
        match status_code {
            "1" => RedirectOutcome::Success,
            "3" => RedirectOutcome::Failed,
            _ => RedirectOutcome::Pending,
        }
    }
}

impl ProviderAdapter for ToyyibpayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Toyyibpay
    }

    fn verify_and_parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent> {
        let status_code = require(notification, &["status_id", "status"], "status code")?;
        let bill_id = require(notification, &["billcode"], "bill code")?;
        let contribution_id = require(
            notification,
            &["order_id", "contribution_id"],
            "contribution id",
        )?;
        let amount = amount_in_sen(notification, &["amount"], parse_ringgit_to_sen)?;

        Ok(redirect_event(
            self.provider(),
            notification,
            RedirectFields {
                contribution_id,
                bill_id,
                status_code,
                outcome: Self::outcome_for(status_code),
                transaction_ref: notification.first_param(&["transaction_id", "refno"]),
                amount,
                payer_name: None,
            },
        ))
    }
}
