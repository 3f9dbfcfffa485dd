use crate::{
    app_error::AppResult,
    application::ports::provider_adapter::{InboundNotification, ProviderAdapter},
    domain::entities::{
        payment_event::{PaymentEvent, RedirectOutcome},
        payment_provider::PaymentProvider,
    },
};

use super::{RedirectFields, amount_in_sen, parse_ringgit_to_sen, redirect_event, require};

/// senangPay return URL and callback share one parameter set:
/// `status_id`, `order_id`, `transaction_id`, `msg`, plus our `contribution_id`.
#[derive(Debug, Clone, Default)]
pub struct SenangpayAdapter;

impl SenangpayAdapter {
    pub fn new() -> Self {
        Self
    }

    pub fn outcome_for(status_code: &str) -> RedirectOutcome {
        match status_code {
            "1" => RedirectOutcome::Success,
            "0" => RedirectOutcome::Failed,
            _ => RedirectOutcome::Pending,
        }
    }
}

impl ProviderAdapter for SenangpayAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Senangpay
    }

    fn verify_and_parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent> {
        let status_code = require(notification, &["status_id"], "status code")?;
        let bill_id = require(notification, &["order_id"], "order id")?;
        let contribution_id = require(notification, &["contribution_id"], "contribution id")?;
        let amount = amount_in_sen(notification, &["amount"], parse_ringgit_to_sen)?;

        Ok(redirect_event(
            self.provider(),
            notification,
            RedirectFields {
                contribution_id,
                bill_id,
                status_code,
                outcome: Self::outcome_for(status_code),
                transaction_ref: notification.param("transaction_id"),
                amount,
                payer_name: None,
            },
        ))
    }
}
