use std::sync::Arc;

use crate::{
    application::use_cases::{
        event_ledger::EventLedgerUseCases, provider_credentials::ProviderCredentialUseCases,
        redirect_resolver::RedirectResolverUseCases,
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ledger_use_cases: Arc<EventLedgerUseCases>,
    pub credential_use_cases: Arc<ProviderCredentialUseCases>,
    pub redirect_use_cases: Arc<RedirectResolverUseCases>,
}
