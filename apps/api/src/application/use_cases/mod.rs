pub mod event_ledger;
pub mod provider_credentials;
pub mod reconciliation;
pub mod redirect_resolver;
