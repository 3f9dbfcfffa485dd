use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use infaq_types::{REDACTION_MARKER, is_masked_placeholder, mask_secret};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        payment_provider::PaymentProvider,
        provider_credential::{
            DecryptedCredential, MaskedCredential, ProviderCredential, SecretFields,
        },
    },
    infra::crypto::{CredentialCipher, KeyGeneration},
};

// ============================================================================
// Repository Trait
// ============================================================================

#[async_trait]
pub trait ProviderCredentialRepoTrait: Send + Sync {
    async fn get(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderCredential>>;

    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<ProviderCredential>>;

    async fn list_all(&self) -> AppResult<Vec<ProviderCredential>>;

    /// Insert or update keyed by (tenant, provider).
    async fn upsert(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
        secret_fields: &SecretFields,
        is_active: bool,
        is_sandbox: bool,
    ) -> AppResult<ProviderCredential>;

    /// Replaces the secret fields only if they still equal `expected`.
    /// Returns false when another writer got there first.
    async fn compare_and_set_fields(
        &self,
        id: Uuid,
        expected: &SecretFields,
        new_fields: &SecretFields,
    ) -> AppResult<bool>;
}

// ============================================================================
// Types
// ============================================================================

/// Admin update. Field values may be new plaintext, a masked echo, or empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialUpdate {
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub is_active: Option<bool>,
    pub is_sandbox: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RotationOutcome {
    Rotated { fields: usize },
    AlreadyCurrent,
    /// A concurrent write replaced the record; it is already under the current key.
    Superseded,
    NotConfigured,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotationReport {
    pub tenant_id: Uuid,
    pub provider: PaymentProvider,
    pub outcome: Option<RotationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Use Cases
// ============================================================================

#[derive(Clone)]
pub struct ProviderCredentialUseCases {
    repo: Arc<dyn ProviderCredentialRepoTrait>,
    cipher: CredentialCipher,
}

impl ProviderCredentialUseCases {
    pub fn new(repo: Arc<dyn ProviderCredentialRepoTrait>, cipher: CredentialCipher) -> Self {
        Self { repo, cipher }
    }

    /// Masked view of every provider for a tenant, configured or not.
    pub async fn list_masked(&self, tenant_id: Uuid) -> AppResult<Vec<MaskedCredential>> {
        let stored = self.repo.list_by_tenant(tenant_id).await?;

        Ok(PaymentProvider::all()
            .iter()
            .map(|provider| {
                let record = stored.iter().find(|c| c.provider == *provider);
                match record {
                    Some(record) => self.mask_record(record),
                    None => MaskedCredential {
                        provider: *provider,
                        is_configured: false,
                        is_active: false,
                        is_sandbox: false,
                        fields: BTreeMap::new(),
                        updated_at: None,
                    },
                }
            })
            .collect())
    }

    pub async fn get_masked(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<MaskedCredential> {
        let record = self
            .repo
            .get(tenant_id, provider)
            .await?
            .ok_or(AppError::NotFound)?;
        Ok(self.mask_record(&record))
    }

    /// Idempotent upsert keyed by (tenant, provider).
    ///
    /// Masked or empty field values keep the stored secret untouched, so an
    /// admin toggling a flag never overwrites a secret with its mask.
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
        update: CredentialUpdate,
    ) -> AppResult<MaskedCredential> {
        if let Some(unknown) = update.fields.keys().find(|k| !provider.is_known_field(k)) {
            return Err(AppError::InvalidInput(format!(
                "Unknown field '{unknown}' for provider {provider}"
            )));
        }

        let existing = self.repo.get(tenant_id, provider).await?;
        let existing_fields = existing
            .as_ref()
            .map(|c| c.secret_fields.clone())
            .unwrap_or_default();

        let mut secret_fields = SecretFields::new();
        for field in provider.credential_fields() {
            let submitted = update.fields.get(*field).map(String::as_str);
            match submitted {
                Some(value) if !is_masked_placeholder(value) => {
                    secret_fields.insert(field.to_string(), self.cipher.encrypt(value.trim())?);
                }
                _ => {
                    if let Some(stored) = existing_fields.get(*field) {
                        secret_fields.insert(field.to_string(), self.keep_stored(stored)?);
                    }
                }
            }
        }

        let is_active = update
            .is_active
            .or(existing.as_ref().map(|c| c.is_active))
            .unwrap_or(false);
        let is_sandbox = update
            .is_sandbox
            .or(existing.as_ref().map(|c| c.is_sandbox))
            .unwrap_or(false);

        if is_active {
            let missing = missing_required_fields(provider, &secret_fields);
            if !missing.is_empty() {
                return Err(AppError::InvalidInput(format!(
                    "Cannot activate {provider}: missing {}",
                    missing.join(", ")
                )));
            }
        }

        let saved = self
            .repo
            .upsert(tenant_id, provider, &secret_fields, is_active, is_sandbox)
            .await?;

        info!(
            tenant_id = %tenant_id,
            provider = %provider,
            is_active,
            is_sandbox,
            "Provider credential saved"
        );

        Ok(self.mask_record(&saved))
    }

    /// Re-encrypts one credential under the current key.
    ///
    /// Uses read-then-conditional-write: never blocks ordinary updates, and a
    /// concurrent update simply wins.
    pub async fn rotate(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<RotationOutcome> {
        let Some(record) = self.repo.get(tenant_id, provider).await? else {
            return Ok(RotationOutcome::NotConfigured);
        };
        self.rotate_record(&record).await
    }

    /// Rotates every stored credential. One bad record never aborts the sweep.
    pub async fn rotate_all(&self) -> AppResult<Vec<RotationReport>> {
        let records = self.repo.list_all().await?;
        let mut reports = Vec::with_capacity(records.len());

        for record in records {
            let report = match self.rotate_record(&record).await {
                Ok(outcome) => RotationReport {
                    tenant_id: record.tenant_id,
                    provider: record.provider,
                    outcome: Some(outcome),
                    error: None,
                },
                Err(e) => {
                    warn!(
                        tenant_id = %record.tenant_id,
                        provider = %record.provider,
                        error = %e,
                        "Credential rotation failed"
                    );
                    RotationReport {
                        tenant_id: record.tenant_id,
                        provider: record.provider,
                        outcome: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }

    /// Active credential with plaintext fields, for calling the provider back.
    pub async fn decrypted_credential(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<DecryptedCredential> {
        let record = self
            .repo
            .get(tenant_id, provider)
            .await?
            .filter(|c| c.is_active)
            .ok_or(AppError::NotFound)?;

        let mut fields = BTreeMap::new();
        for (name, value) in &record.secret_fields {
            match self.cipher.decrypt_if_needed(value) {
                Ok(plaintext) => {
                    fields.insert(name.clone(), plaintext);
                }
                Err(e) => {
                    warn!(
                        tenant_id = %tenant_id,
                        provider = %provider,
                        field = %name,
                        error = %e,
                        "Stored credential could not be decrypted"
                    );
                    return Err(AppError::CredentialUnavailable);
                }
            }
        }

        Ok(DecryptedCredential::new(
            tenant_id,
            provider,
            record.is_sandbox,
            fields,
        ))
    }

    async fn rotate_record(&self, record: &ProviderCredential) -> AppResult<RotationOutcome> {
        let stale = record
            .secret_fields
            .values()
            .filter(|v| !self.cipher.is_current(v))
            .count();
        if stale == 0 {
            return Ok(RotationOutcome::AlreadyCurrent);
        }

        let mut rotated = SecretFields::new();
        for (name, value) in &record.secret_fields {
            let next = if self.cipher.is_current(value) {
                value.clone()
            } else {
                let plaintext = self.cipher.decrypt_if_needed(value)?;
                self.cipher.encrypt(&plaintext)?
            };
            rotated.insert(name.clone(), next);
        }

        let written = self
            .repo
            .compare_and_set_fields(record.id, &record.secret_fields, &rotated)
            .await?;

        if written {
            info!(
                tenant_id = %record.tenant_id,
                provider = %record.provider,
                fields = stale,
                key_id = %self.cipher.key_id(),
                "Provider credential rotated"
            );
            Ok(RotationOutcome::Rotated { fields: stale })
        } else {
            Ok(RotationOutcome::Superseded)
        }
    }

    /// Stored value to carry over unchanged. Legacy plaintext gets encrypted.
    fn keep_stored(&self, stored: &str) -> AppResult<String> {
        match self.cipher.generation(stored) {
            KeyGeneration::Plaintext if !stored.is_empty() => self.cipher.encrypt(stored),
            _ => Ok(stored.to_string()),
        }
    }

    fn mask_record(&self, record: &ProviderCredential) -> MaskedCredential {
        let mut fields = BTreeMap::new();
        for (name, value) in &record.secret_fields {
            let masked = match self.cipher.decrypt_if_needed(value) {
                Ok(plaintext) => mask_secret(&plaintext),
                Err(e) => {
                    warn!(
                        tenant_id = %record.tenant_id,
                        provider = %record.provider,
                        field = %name,
                        error = %e,
                        "Stored credential could not be decrypted"
                    );
                    REDACTION_MARKER.to_string()
                }
            };
            fields.insert(name.clone(), masked);
        }

        MaskedCredential {
            provider: record.provider,
            is_configured: missing_required_fields(record.provider, &record.secret_fields)
                .is_empty(),
            is_active: record.is_active,
            is_sandbox: record.is_sandbox,
            fields,
            updated_at: Some(record.updated_at),
        }
    }
}

fn missing_required_fields(provider: PaymentProvider, fields: &SecretFields) -> Vec<&'static str> {
    provider
        .required_fields()
        .iter()
        .filter(|f| fields.get(**f).is_none_or(|v| v.is_empty()))
        .copied()
        .collect()
}
