use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        contribution::{Contribution, ContributionKey},
        invoice::{Invoice, InvoiceWrite},
        payment_event::{PaymentEvent, ProcessingStatus, StoredEvent},
        payment_provider::PaymentProvider,
        user_subscription::{OwnerRef, Subscription, SubscriptionAudit},
    },
};

/// Entry point to the event ledger and the state it reconciles.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a unit of work. Dropping it without `commit` rolls everything back.
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>>;

    async fn get_event(&self, id: Uuid) -> AppResult<Option<StoredEvent>>;

    /// Newest first.
    async fn list_events(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> AppResult<Vec<StoredEvent>>;

    /// Read-only compound-key lookup used to render redirect results.
    async fn find_contribution(&self, key: &ContributionKey) -> AppResult<Option<Contribution>>;
}

/// One atomic unit of work: ledger insert plus the resulting state changes.
#[async_trait]
pub trait LedgerTx: Send {
    /// Inserts the event unless `(provider, provider_event_id)` already exists.
    /// Returns the new ledger id, or `None` for a duplicate delivery.
    async fn insert_event(
        &mut self,
        event: &PaymentEvent,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<Option<Uuid>>;

    /// Loads a ledger row and locks it for the rest of the transaction.
    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<StoredEvent>>;

    async fn set_event_status(
        &mut self,
        id: Uuid,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<()>;

    /// Locks and returns the owner's subscription, if any.
    async fn subscription_by_owner(&mut self, owner: &OwnerRef) -> AppResult<Option<Subscription>>;

    async fn subscriptions_by_external_id(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<Vec<Subscription>>;

    /// Insert or replace, keyed by owner. The external subscription id, if
    /// any, is added to the binding history.
    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()>;

    /// Whether the external subscription id was bound to any owner before.
    async fn external_id_seen(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<bool>;

    async fn record_subscription_audit(&mut self, audit: &SubscriptionAudit) -> AppResult<()>;

    /// Unique by `(provider, external_invoice_id)`. Existing rows only get
    /// their status normalized; terminal rows never change.
    async fn write_invoice(&mut self, invoice: &Invoice) -> AppResult<InvoiceWrite>;

    /// Locks and returns the contribution matching both halves of the key.
    async fn contribution_by_key(
        &mut self,
        key: &ContributionKey,
    ) -> AppResult<Option<Contribution>>;

    async fn update_contribution(&mut self, contribution: &Contribution) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
