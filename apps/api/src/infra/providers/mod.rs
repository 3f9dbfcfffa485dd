//! Provider adapters: one per payment provider, each turning that provider's
//! wire format into a normalized [`PaymentEvent`].

use std::sync::Arc;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::provider_adapter::{InboundNotification, ProviderAdapter},
    domain::entities::{
        payment_event::{
            Confidence, ContributionData, EventPayload, NotificationChannel, PaymentEvent,
            RedirectOutcome,
        },
        payment_provider::PaymentProvider,
    },
};

pub mod billplz;
pub mod senangpay;
pub mod stripe;
pub mod toyyibpay;
pub mod toyyibpay_client;

pub use billplz::BillplzAdapter;
pub use senangpay::SenangpayAdapter;
pub use stripe::StripeAdapter;
pub use toyyibpay::ToyyibpayAdapter;
pub use toyyibpay_client::ToyyibpayStatusClient;

/// Adapter for a redirect-style provider. Stripe is built per secret instead.
pub fn redirect_adapter(provider: PaymentProvider) -> Option<Arc<dyn ProviderAdapter>> {
    match provider {
        PaymentProvider::Toyyibpay => Some(Arc::new(ToyyibpayAdapter::new())),
        PaymentProvider::Billplz => Some(Arc::new(BillplzAdapter::new())),
        PaymentProvider::Senangpay => Some(Arc::new(SenangpayAdapter::new())),
        PaymentProvider::Stripe => None,
    }
}

/// Parses a ringgit decimal (`"50"`, `"50.5"`, `"1,050.00"`) into sen.
pub fn parse_ringgit_to_sen(value: &str) -> Option<i64> {
    let cleaned: String = value.trim().chars().filter(|c| *c != ',').collect();
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (cleaned.as_str(), ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || !all_digits(whole) || !all_digits(fraction) || fraction.len() > 2 {
        return None;
    }

    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(cents)
}

/// Fields every redirect-style provider must supply, already validated.
pub(crate) struct RedirectFields<'a> {
    pub contribution_id: &'a str,
    pub bill_id: &'a str,
    pub status_code: &'a str,
    pub outcome: RedirectOutcome,
    pub transaction_ref: Option<&'a str>,
    pub amount: Option<i64>,
    pub payer_name: Option<&'a str>,
}

pub(crate) fn require<'a>(
    notification: &'a InboundNotification,
    names: &[&str],
    what: &str,
) -> AppResult<&'a str> {
    notification
        .first_param(names)
        .ok_or_else(|| AppError::ValidationError(format!("Missing {what}")))
}

/// Amount in sen, mandatory on the server-callback channel.
pub(crate) fn amount_in_sen(
    notification: &InboundNotification,
    names: &[&str],
    parse: fn(&str) -> Option<i64>,
) -> AppResult<Option<i64>> {
    let amount = match notification.first_param(names) {
        Some(raw) => Some(
            parse(raw)
                .ok_or_else(|| AppError::ValidationError(format!("Invalid amount: {raw}")))?,
        ),
        None => None,
    };
    if amount.is_none() && notification.channel == NotificationChannel::ServerCallback {
        return Err(AppError::ValidationError("Missing amount".to_string()));
    }
    Ok(amount)
}

/// Builds the normalized event for a redirect or callback.
///
/// The event id is `"{bill_id}:{outcome}"`, so the same outcome seen on both
/// channels collides in the ledger while a pending notice never blocks the
/// final one.
pub(crate) fn redirect_event(
    provider: PaymentProvider,
    notification: &InboundNotification,
    fields: RedirectFields<'_>,
) -> PaymentEvent {
    PaymentEvent {
        provider,
        provider_event_id: format!("{}:{}", fields.bill_id, fields.outcome),
        kind: fields.outcome.event_kind(),
        channel: notification.channel,
        confidence: Confidence::Unverified,
        tenant_id: notification.tenant_id,
        occurred_at: notification.received_at,
        raw_payload: notification.raw_body.clone(),
        payload: EventPayload::Contribution(ContributionData {
            contribution_id: fields.contribution_id.to_string(),
            bill_id: fields.bill_id.to_string(),
            outcome: fields.outcome,
            status_code: fields.status_code.to_string(),
            transaction_ref: fields.transaction_ref.map(str::to_string),
            amount: fields.amount,
            payer_name: fields.payer_name.map(str::to_string),
        }),
    }
}
