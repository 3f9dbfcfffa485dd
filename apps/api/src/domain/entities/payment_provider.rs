use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Payment provider type - the gateway a notification or credential belongs to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, AsRefStr, Display,
    EnumString,
)]
#[sqlx(type_name = "payment_provider", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaymentProvider {
    /// Card network provider, signed push webhooks.
    Stripe,
    Toyyibpay,
    Billplz,
    Senangpay,
}

/// How a provider tells us about payment outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationStyle {
    SignedWebhook,
    /// Browser redirect plus unsigned server-to-server callback.
    Redirect,
}

impl PaymentProvider {
    /// Human-readable display name for the provider
    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "Stripe",
            PaymentProvider::Toyyibpay => "ToyyibPay",
            PaymentProvider::Billplz => "Billplz",
            PaymentProvider::Senangpay => "senangPay",
        }
    }

    pub fn integration_style(&self) -> IntegrationStyle {
        match self {
            PaymentProvider::Stripe => IntegrationStyle::SignedWebhook,
            PaymentProvider::Toyyibpay | PaymentProvider::Billplz | PaymentProvider::Senangpay => {
                IntegrationStyle::Redirect
            }
        }
    }

    pub fn is_redirect_style(&self) -> bool {
        self.integration_style() == IntegrationStyle::Redirect
    }

    /// Every secret field an admin may store for this provider.
    ///
    /// Billplz `x_signature_key` is optional and only held in the vault:
    /// Billplz notifications are not signature-checked and their events stay
    /// `unverified`.
    pub fn credential_fields(&self) -> &'static [&'static str] {
        match self {
            PaymentProvider::Stripe => &["secret_key", "webhook_secret", "publishable_key"],
            PaymentProvider::Toyyibpay => &["user_secret_key", "category_code"],
            PaymentProvider::Billplz => &["api_key", "collection_id", "x_signature_key"],
            PaymentProvider::Senangpay => &["merchant_id", "secret_key"],
        }
    }

    /// Fields that must hold a value before the credential can be activated.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            PaymentProvider::Stripe => &["secret_key", "webhook_secret"],
            PaymentProvider::Toyyibpay => &["user_secret_key", "category_code"],
            PaymentProvider::Billplz => &["api_key", "collection_id"],
            PaymentProvider::Senangpay => &["merchant_id", "secret_key"],
        }
    }

    pub fn is_known_field(&self, field: &str) -> bool {
        self.credential_fields().contains(&field)
    }

    /// All available providers
    pub fn all() -> &'static [PaymentProvider] {
        &[
            PaymentProvider::Stripe,
            PaymentProvider::Toyyibpay,
            PaymentProvider::Billplz,
            PaymentProvider::Senangpay,
        ]
    }
}
