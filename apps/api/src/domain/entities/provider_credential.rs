use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::payment_provider::PaymentProvider;

/// Field name -> stored value. Values at rest are ciphertext.
pub type SecretFields = BTreeMap<String, String>;

/// Stored provider credential for a tenant. `secret_fields` hold ciphertext only.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCredential {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub provider: PaymentProvider,
    pub secret_fields: SecretFields,
    pub is_active: bool,
    pub is_sandbox: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin-facing view of a credential. Secret values are masked.
#[derive(Debug, Clone, Serialize)]
pub struct MaskedCredential {
    pub provider: PaymentProvider,
    pub is_configured: bool,
    pub is_active: bool,
    pub is_sandbox: bool,
    pub fields: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Credential with plaintext fields, only handed to outbound provider clients.
#[derive(Clone)]
pub struct DecryptedCredential {
    pub tenant_id: Uuid,
    pub provider: PaymentProvider,
    pub is_sandbox: bool,
    fields: BTreeMap<String, String>,
}

impl DecryptedCredential {
    pub fn new(
        tenant_id: Uuid,
        provider: PaymentProvider,
        is_sandbox: bool,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            tenant_id,
            provider,
            is_sandbox,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

// Never print plaintext secrets.
impl std::fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptedCredential")
            .field("tenant_id", &self.tenant_id)
            .field("provider", &self.provider)
            .field("is_sandbox", &self.is_sandbox)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}
