use std::sync::Arc;

use sqlx::PgPool;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::{http::app_state::AppState, persistence::PostgresPersistence},
    application::{
        ports::{ledger_store::LedgerStore, provider_status::ProviderStatusClient},
        use_cases::{
            event_ledger::EventLedgerUseCases,
            provider_credentials::{ProviderCredentialRepoTrait, ProviderCredentialUseCases},
            reconciliation::ReconciliationEngine,
            redirect_resolver::RedirectResolverUseCases,
        },
    },
    infra::{
        InfraError,
        config::{AppConfig, LogFormat},
        crypto::CredentialCipher,
        http_client::build_client,
        providers::ToyyibpayStatusClient,
    },
};

/// Builds every dependency explicitly from `config` and the open pool.
pub fn init_app_state(config: AppConfig, pool: PgPool) -> Result<AppState, InfraError> {
    let cipher = CredentialCipher::from_config(
        &config.credential_encryption_key,
        config.credential_encryption_key_previous.as_ref(),
    )?;
    let http_client = build_client()?;

    let persistence = Arc::new(PostgresPersistence::new(pool));
    let ledger_store = persistence.clone() as Arc<dyn LedgerStore>;
    let credential_repo = persistence as Arc<dyn ProviderCredentialRepoTrait>;

    let status_clients: Vec<Arc<dyn ProviderStatusClient>> =
        vec![Arc::new(ToyyibpayStatusClient::new(
            http_client,
            config.toyyibpay_base_url.clone(),
            config.toyyibpay_sandbox_base_url.clone(),
        ))];

    let credential_use_cases = Arc::new(ProviderCredentialUseCases::new(credential_repo, cipher));
    let ledger_use_cases = Arc::new(EventLedgerUseCases::new(
        ledger_store,
        ReconciliationEngine::new(),
    ));
    let redirect_use_cases = Arc::new(RedirectResolverUseCases::new(
        ledger_use_cases.clone(),
        credential_use_cases.clone(),
        status_clients,
        config.verify_redirects,
    ));

    Ok(AppState {
        config: Arc::new(config),
        ledger_use_cases,
        credential_use_cases,
        redirect_use_cases,
    })
}

pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "infaq_api=debug,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .ok(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_level(true))
            .try_init()
            .ok(),
    };
}
