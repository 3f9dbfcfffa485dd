use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use infaq_types::verify_signature;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::provider_adapter::{InboundNotification, ProviderAdapter},
    domain::entities::{
        invoice::InvoiceStatus,
        payment_event::{
            CheckoutData, Confidence, EventKind, EventPayload, InvoiceData, OwnerHints,
            PaymentEvent, SubscriptionData,
        },
        payment_provider::PaymentProvider,
        subscription_plan::PlanTier,
        user_subscription::SubscriptionStatus,
    },
};

/// Signed Stripe webhooks for one signing secret.
#[derive(Clone)]
pub struct StripeAdapter {
    webhook_secret: SecretString,
    tolerance_secs: i64,
}

impl StripeAdapter {
    pub fn new(webhook_secret: SecretString, tolerance_secs: i64) -> Self {
        Self {
            webhook_secret,
            tolerance_secs,
        }
    }

    /// Total event-type table. Unlisted types are kept but not acted on.
    pub fn kind_for(event_type: &str) -> EventKind {
        match event_type {
            "checkout.session.completed" => EventKind::CheckoutCompleted,
            "customer.subscription.created" => EventKind::SubscriptionCreated,
            "customer.subscription.updated" => EventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => EventKind::SubscriptionDeleted,
            "invoice.paid" | "invoice.payment_succeeded" => EventKind::InvoicePaid,
            "invoice.payment_failed" => EventKind::InvoiceFailed,
            _ => EventKind::Pending,
        }
    }

    fn parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent> {
        let event: StripeWebhookEvent = serde_json::from_str(&notification.raw_body)
            .map_err(|e| AppError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

        let mut kind = Self::kind_for(&event.event_type);
        let payload = match kind {
            EventKind::CheckoutCompleted => {
                EventPayload::Checkout(event.object::<StripeCheckoutSession>()?.into_data())
            }
            EventKind::SubscriptionCreated
            | EventKind::SubscriptionUpdated
            | EventKind::SubscriptionDeleted => {
                let data = event.object::<StripeSubscription>()?.into_data();
                if data.status.is_none() && kind != EventKind::SubscriptionDeleted {
                    debug!(
                        provider_event_id = %event.id,
                        external_subscription_id = %data.external_subscription_id,
                        "Subscription status has no counterpart yet"
                    );
                    kind = EventKind::Pending;
                }
                EventPayload::Subscription(data)
            }
            EventKind::InvoicePaid | EventKind::InvoiceFailed => {
                let status = if kind == EventKind::InvoicePaid {
                    InvoiceStatus::Paid
                } else {
                    InvoiceStatus::Failed
                };
                EventPayload::Invoice(event.object::<StripeInvoice>()?.into_data(status))
            }
            _ => EventPayload::Unrecognized {
                event_type: event.event_type.clone(),
            },
        };

        Ok(PaymentEvent {
            provider: PaymentProvider::Stripe,
            provider_event_id: event.id,
            kind,
            channel: notification.channel,
            confidence: Confidence::Verified,
            tenant_id: notification.tenant_id,
            occurred_at: timestamp(event.created).unwrap_or(notification.received_at),
            raw_payload: notification.raw_body.clone(),
            payload,
        })
    }
}

impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn verify_and_parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent> {
        let header = notification.signature.as_deref().unwrap_or_default();
        verify_signature(
            self.webhook_secret.expose_secret(),
            header,
            &notification.raw_body,
            Utc::now().timestamp(),
            self.tolerance_secs,
        )
        .map_err(|e| AppError::InvalidSignature(e.to_string()))?;

        self.parse(notification)
    }
}

fn timestamp(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(ts, 0).single()
}

fn owner_hints(metadata: &HashMap<String, String>) -> OwnerHints {
    OwnerHints {
        user_id: metadata.get("user_id").cloned(),
        mosque_id: metadata.get("mosque_id").cloned(),
        client_reference_id: None,
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeWebhookEventData,
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEventData {
    object: serde_json::Value,
}

impl StripeWebhookEvent {
    fn object<T: for<'de> Deserialize<'de>>(&self) -> AppResult<T> {
        T::deserialize(&self.data.object).map_err(|e| {
            AppError::ValidationError(format!("Invalid {} object: {}", self.event_type, e))
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeCheckoutSession {
    id: String,
    customer: Option<String>,
    subscription: Option<String>,
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripeCheckoutSession {
    fn into_data(self) -> CheckoutData {
        let mut owner = owner_hints(&self.metadata);
        owner.client_reference_id = self.client_reference_id;
        CheckoutData {
            session_id: self.id,
            external_subscription_id: self.subscription,
            external_customer_id: self.customer,
            owner,
            plan: self.metadata.get("plan").and_then(|p| PlanTier::from_label(p)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    customer: Option<String>,
    status: String,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: bool,
    canceled_at: Option<i64>,
    trial_start: Option<i64>,
    trial_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    items: StripeSubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
struct StripeSubscriptionItems {
    #[serde(default)]
    data: Vec<StripeSubscriptionItem>,
}

/// Newer API versions report the billing window per item.
#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    price: Option<StripePrice>,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct StripePrice {
    lookup_key: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripePrice {
    fn plan(&self) -> Option<PlanTier> {
        self.metadata
            .get("plan")
            .and_then(|p| PlanTier::from_label(p))
            .or_else(|| self.lookup_key.as_deref().and_then(PlanTier::from_label))
    }
}

impl StripeSubscription {
    fn into_data(self) -> SubscriptionData {
        let first_item = self.items.data.first();
        let period_start = self
            .current_period_start
            .or_else(|| first_item.and_then(|i| i.current_period_start));
        let period_end = self
            .current_period_end
            .or_else(|| first_item.and_then(|i| i.current_period_end));
        let plan = first_item
            .and_then(|i| i.price.as_ref())
            .and_then(StripePrice::plan);

        SubscriptionData {
            owner: owner_hints(&self.metadata),
            status: SubscriptionStatus::from_stripe(&self.status),
            plan,
            current_period_start: period_start.and_then(timestamp),
            current_period_end: period_end.and_then(timestamp),
            cancel_at_period_end: self.cancel_at_period_end,
            canceled_at: self.canceled_at.and_then(timestamp),
            trial_start: self.trial_start.and_then(timestamp),
            trial_end: self.trial_end.and_then(timestamp),
            external_subscription_id: self.id,
            external_customer_id: self.customer,
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    id: String,
    subscription: Option<String>,
    subscription_details: Option<StripeSubscriptionDetails>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    amount_paid: i64,
    currency: String,
    hosted_invoice_url: Option<String>,
    invoice_pdf: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionDetails {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripeInvoice {
    fn into_data(self, status: InvoiceStatus) -> InvoiceData {
        // Subscription metadata is copied onto the invoice; prefer it.
        let owner = match self.subscription_details.as_ref().map(|d| owner_hints(&d.metadata)) {
            Some(hints) if hints.metadata_owner().is_some() => hints,
            _ => owner_hints(&self.metadata),
        };

        InvoiceData {
            external_invoice_id: self.id,
            external_subscription_id: self.subscription,
            owner,
            amount_paid: self.amount_paid,
            currency: self.currency,
            status,
            invoice_url: self.invoice_pdf,
            hosted_invoice_url: self.hosted_invoice_url,
        }
    }
}
