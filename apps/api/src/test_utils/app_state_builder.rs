//! Test app state builder for HTTP-level integration testing.
//!
//! `TestAppStateBuilder` wires the real use cases over in-memory stores, so
//! route tests exercise the same code paths as production.

use std::{net::SocketAddr, sync::Arc};

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::provider_status::ProviderStatusClient,
        use_cases::{
            event_ledger::EventLedgerUseCases, provider_credentials::ProviderCredentialUseCases,
            reconciliation::ReconciliationEngine, redirect_resolver::RedirectResolverUseCases,
        },
    },
    infra::config::{AppConfig, LogFormat},
    test_utils::{
        InMemoryLedgerStore, InMemoryProviderCredentialRepo, TEST_KEY_CURRENT, test_cipher,
    },
};

pub const TEST_ADMIN_TOKEN: &str = "test_admin_token";
pub const TEST_STRIPE_SECRET: &str = "whsec_platform_test";
pub const TEST_RESULT_PAGE: &str = "https://infaq.test/payment/result";

/// Config with every value a test could need and nothing that reaches the network.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: SecretString::new("".into()),
        db_max_connections: 1,
        run_migrations: false,
        bind_addr: "127.0.0.1:3001".parse::<SocketAddr>().unwrap(),
        credential_encryption_key: SecretString::new(TEST_KEY_CURRENT.into()),
        credential_encryption_key_previous: None,
        stripe_webhook_secret: Some(SecretString::new(TEST_STRIPE_SECRET.into())),
        webhook_tolerance_secs: 300,
        admin_api_token: SecretString::new(TEST_ADMIN_TOKEN.into()),
        result_page_url: Url::parse(TEST_RESULT_PAGE).unwrap(),
        toyyibpay_base_url: Url::parse("https://toyyibpay.test").unwrap(),
        toyyibpay_sandbox_base_url: Url::parse("https://dev.toyyibpay.test").unwrap(),
        verify_redirects: false,
        log_format: LogFormat::Pretty,
    }
}

pub struct TestAppStateBuilder {
    ledger_store: Arc<InMemoryLedgerStore>,
    credential_repo: Arc<InMemoryProviderCredentialRepo>,
    status_clients: Vec<Arc<dyn ProviderStatusClient>>,
    config: AppConfig,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            ledger_store: Arc::new(InMemoryLedgerStore::new()),
            credential_repo: Arc::new(InMemoryProviderCredentialRepo::new()),
            status_clients: Vec::new(),
            config: test_config(),
        }
    }

    pub fn with_ledger_store(mut self, store: Arc<InMemoryLedgerStore>) -> Self {
        self.ledger_store = store;
        self
    }

    pub fn with_credential_repo(mut self, repo: Arc<InMemoryProviderCredentialRepo>) -> Self {
        self.credential_repo = repo;
        self
    }

    /// Registers a status client and turns redirect confirmation on.
    pub fn with_status_client(mut self, client: Arc<dyn ProviderStatusClient>) -> Self {
        self.status_clients.push(client);
        self.config.verify_redirects = true;
        self
    }

    pub fn without_platform_stripe_secret(mut self) -> Self {
        self.config.stripe_webhook_secret = None;
        self
    }

    pub fn build(self) -> AppState {
        let credential_use_cases = Arc::new(ProviderCredentialUseCases::new(
            self.credential_repo,
            test_cipher(),
        ));

        let ledger_use_cases = Arc::new(EventLedgerUseCases::new(
            self.ledger_store,
            ReconciliationEngine::new(),
        ));

        let redirect_use_cases = Arc::new(RedirectResolverUseCases::new(
            ledger_use_cases.clone(),
            credential_use_cases.clone(),
            self.status_clients,
            self.config.verify_redirects,
        ));

        AppState {
            config: Arc::new(self.config),
            ledger_use_cases,
            credential_use_cases,
            redirect_use_cases,
        }
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
