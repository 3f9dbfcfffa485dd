use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        payment_event::{NotificationChannel, PaymentEvent},
        payment_provider::PaymentProvider,
    },
};

/// A raw inbound notification, before any provider-specific interpretation.
#[derive(Debug, Clone)]
pub struct InboundNotification {
    pub channel: NotificationChannel,
    /// Request body for webhooks/callbacks, query string for redirects.
    pub raw_body: String,
    pub signature: Option<String>,
    /// Decoded query or form parameters.
    pub params: HashMap<String, String>,
    pub tenant_id: Option<Uuid>,
    pub received_at: DateTime<Utc>,
}

impl InboundNotification {
    pub fn signed_webhook(raw_body: String, signature: Option<String>, tenant_id: Option<Uuid>) -> Self {
        Self {
            channel: NotificationChannel::SignedWebhook,
            raw_body,
            signature,
            params: HashMap::new(),
            tenant_id,
            received_at: Utc::now(),
        }
    }

    pub fn with_params(
        channel: NotificationChannel,
        raw_body: String,
        params: HashMap<String, String>,
    ) -> Self {
        Self {
            channel,
            raw_body,
            signature: None,
            params,
            tenant_id: None,
            received_at: Utc::now(),
        }
    }

    /// Trimmed, non-empty parameter value.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First present parameter among `names`.
    pub fn first_param(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.param(name))
    }
}

/// Translates one provider's wire format into a normalized [`PaymentEvent`].
///
/// Implementations are pure: they verify and parse, and never touch storage.
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    fn verify_and_parse(&self, notification: &InboundNotification) -> AppResult<PaymentEvent>;
}
