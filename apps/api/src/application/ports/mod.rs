pub mod ledger_store;
pub mod provider_adapter;
pub mod provider_status;
