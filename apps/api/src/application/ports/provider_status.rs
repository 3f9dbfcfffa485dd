use async_trait::async_trait;

use crate::{
    app_error::AppResult,
    domain::entities::{
        payment_event::RedirectOutcome, payment_provider::PaymentProvider,
        provider_credential::DecryptedCredential,
    },
};

/// Asks a redirect-style provider for the authoritative outcome of a bill.
#[async_trait]
pub trait ProviderStatusClient: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    async fn bill_outcome(
        &self,
        credential: &DecryptedCredential,
        bill_id: &str,
    ) -> AppResult<RedirectOutcome>;
}
