//! In-memory provider credential repository and provider status stub.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::provider_status::ProviderStatusClient,
        use_cases::provider_credentials::ProviderCredentialRepoTrait,
    },
    domain::entities::{
        payment_event::RedirectOutcome,
        payment_provider::PaymentProvider,
        provider_credential::{DecryptedCredential, ProviderCredential, SecretFields},
    },
};

// ============================================================================
// InMemoryProviderCredentialRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryProviderCredentialRepo {
    pub credentials: Mutex<HashMap<(Uuid, PaymentProvider), ProviderCredential>>,
    fail_next_cas: AtomicBool,
}

impl InMemoryProviderCredentialRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an active credential whose fields predate encryption.
    pub fn with_plaintext(
        tenant_id: Uuid,
        provider: PaymentProvider,
        fields: &[(&str, &str)],
    ) -> Self {
        let repo = Self::new();
        repo.insert_raw(tenant_id, provider, fields);
        repo
    }

    /// Stores field values exactly as given, bypassing the vault.
    pub fn insert_raw(&self, tenant_id: Uuid, provider: PaymentProvider, fields: &[(&str, &str)]) {
        let now = Utc::now();
        let secret_fields: SecretFields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.credentials.lock().unwrap().insert(
            (tenant_id, provider),
            ProviderCredential {
                id: Uuid::new_v4(),
                tenant_id,
                provider,
                secret_fields,
                is_active: true,
                is_sandbox: true,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn stored(&self, tenant_id: Uuid, provider: PaymentProvider) -> Option<ProviderCredential> {
        self.credentials
            .lock()
            .unwrap()
            .get(&(tenant_id, provider))
            .cloned()
    }

    /// Simulates a concurrent admin update landing between read and write.
    pub fn fail_next_compare_and_set(&self) {
        self.fail_next_cas.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProviderCredentialRepoTrait for InMemoryProviderCredentialRepo {
    async fn get(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
    ) -> AppResult<Option<ProviderCredential>> {
        Ok(self.stored(tenant_id, provider))
    }

    async fn list_by_tenant(&self, tenant_id: Uuid) -> AppResult<Vec<ProviderCredential>> {
        Ok(self
            .credentials
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> AppResult<Vec<ProviderCredential>> {
        Ok(self.credentials.lock().unwrap().values().cloned().collect())
    }

    async fn upsert(
        &self,
        tenant_id: Uuid,
        provider: PaymentProvider,
        secret_fields: &SecretFields,
        is_active: bool,
        is_sandbox: bool,
    ) -> AppResult<ProviderCredential> {
        let mut credentials = self.credentials.lock().unwrap();
        let now = Utc::now();
        let existing = credentials.get(&(tenant_id, provider));

        let credential = ProviderCredential {
            id: existing.map(|c| c.id).unwrap_or_else(Uuid::new_v4),
            tenant_id,
            provider,
            secret_fields: secret_fields.clone(),
            is_active,
            is_sandbox,
            created_at: existing.map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        };
        credentials.insert((tenant_id, provider), credential.clone());
        Ok(credential)
    }

    async fn compare_and_set_fields(
        &self,
        id: Uuid,
        expected: &SecretFields,
        new_fields: &SecretFields,
    ) -> AppResult<bool> {
        if self.fail_next_cas.swap(false, Ordering::SeqCst) {
            return Ok(false);
        }
        let mut credentials = self.credentials.lock().unwrap();
        let Some(credential) = credentials.values_mut().find(|c| c.id == id) else {
            return Err(AppError::NotFound);
        };
        if &credential.secret_fields != expected {
            return Ok(false);
        }
        credential.secret_fields = new_fields.clone();
        credential.updated_at = Utc::now();
        Ok(true)
    }
}

// ============================================================================
// StubStatusClient
// ============================================================================

/// Status client returning a fixed answer and counting calls.
pub struct StubStatusClient {
    provider: PaymentProvider,
    answer: Option<RedirectOutcome>,
    pub calls: AtomicUsize,
}

impl StubStatusClient {
    pub fn returning(provider: PaymentProvider, outcome: RedirectOutcome) -> Self {
        Self {
            provider,
            answer: Some(outcome),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(provider: PaymentProvider) -> Self {
        Self {
            provider,
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderStatusClient for StubStatusClient {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn bill_outcome(
        &self,
        _credential: &DecryptedCredential,
        _bill_id: &str,
    ) -> AppResult<RedirectOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
            .ok_or_else(|| AppError::Internal("status API unreachable".into()))
    }
}
