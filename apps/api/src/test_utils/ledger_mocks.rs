//! In-memory event ledger with transactional semantics.
//!
//! `begin` takes an owned lock and works on a copy of the state; `commit`
//! writes the copy back, dropping the transaction discards it. Transactions
//! are therefore serialized, like conflicting rows in Postgres.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::ledger_store::{LedgerStore, LedgerTx},
    domain::entities::{
        contribution::{Contribution, ContributionKey},
        invoice::{Invoice, InvoiceWrite},
        payment_event::{PaymentEvent, ProcessingStatus, StoredEvent},
        payment_provider::PaymentProvider,
        user_subscription::{OwnerRef, Subscription, SubscriptionAudit},
    },
};

#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    pub events: Vec<StoredEvent>,
    pub subscriptions: Vec<Subscription>,
    pub audits: Vec<SubscriptionAudit>,
    pub invoices: Vec<Invoice>,
    pub contributions: Vec<Contribution>,
    /// Binding history: every `(provider, external_subscription_id)` ever saved.
    pub bindings: Vec<(PaymentProvider, String)>,
}

impl LedgerState {
    pub fn subscription_for(&self, owner: &OwnerRef) -> Option<&Subscription> {
        self.subscriptions.iter().find(|s| &s.owner == owner)
    }

    pub fn contribution(&self, id: &str) -> Option<&Contribution> {
        self.contributions.iter().find(|c| c.id == id)
    }

    fn record_binding(&mut self, subscription: &Subscription) {
        if let Some(ext_id) = &subscription.external_subscription_id {
            let binding = (subscription.provider, ext_id.clone());
            if !self.bindings.contains(&binding) {
                self.bindings.push(binding);
            }
        }
    }

    pub fn event(&self, provider_event_id: &str) -> Option<&StoredEvent> {
        self.events
            .iter()
            .find(|e| e.provider_event_id == provider_event_id)
    }
}

type ErrorFactory = fn() -> AppError;

#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<Mutex<LedgerState>>,
    fail_next_write: Arc<StdMutex<Option<ErrorFactory>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscription(self, subscription: Subscription) -> Self {
        {
            let mut state = self.state.try_lock().expect("uncontended during setup");
            state.record_binding(&subscription);
            state.subscriptions.push(subscription);
        }
        self
    }

    pub fn with_contribution(self, contribution: Contribution) -> Self {
        self.state
            .try_lock()
            .expect("uncontended during setup")
            .contributions
            .push(contribution);
        self
    }

    /// Stands in for the payment-link flow creating a contribution later on.
    pub async fn insert_contribution(&self, contribution: Contribution) {
        self.state.lock().await.contributions.push(contribution);
    }

    /// The next subscription, invoice or contribution write fails with `make()`.
    pub fn fail_next_write(&self, make: ErrorFactory) {
        *self.fail_next_write.lock().unwrap() = Some(make);
    }

    pub async fn snapshot(&self) -> LedgerState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryLedgerTx {
            guard,
            working,
            fail_next_write: self.fail_next_write.clone(),
        }))
    }

    async fn get_event(&self, id: Uuid) -> AppResult<Option<StoredEvent>> {
        Ok(self
            .state
            .lock()
            .await
            .events
            .iter()
            .find(|e| e.id == id)
            .cloned())
    }

    async fn list_events(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> AppResult<Vec<StoredEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn find_contribution(&self, key: &ContributionKey) -> AppResult<Option<Contribution>> {
        Ok(self
            .state
            .lock()
            .await
            .contributions
            .iter()
            .find(|c| c.id == key.contribution_id && c.bill_id == key.bill_id)
            .cloned())
    }
}

pub struct InMemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    fail_next_write: Arc<StdMutex<Option<ErrorFactory>>>,
}

impl InMemoryLedgerTx {
    fn check_injected_failure(&self) -> AppResult<()> {
        match self.fail_next_write.lock().unwrap().take() {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn insert_event(
        &mut self,
        event: &PaymentEvent,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<Option<Uuid>> {
        let exists = self.working.events.iter().any(|e| {
            e.provider == event.provider && e.provider_event_id == event.provider_event_id
        });
        if exists {
            return Ok(None);
        }

        let now = Utc::now();
        let id = Uuid::new_v4();
        self.working.events.push(StoredEvent {
            id,
            provider: event.provider,
            provider_event_id: event.provider_event_id.clone(),
            kind: event.kind,
            channel: event.channel,
            confidence: event.confidence,
            tenant_id: event.tenant_id,
            status,
            status_note: note.map(str::to_string),
            payload: event.payload.clone(),
            raw_payload: event.raw_payload.clone(),
            occurred_at: event.occurred_at,
            received_at: now,
            processed_at: (status != ProcessingStatus::Received).then_some(now),
        });
        Ok(Some(id))
    }

    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<StoredEvent>> {
        Ok(self.working.events.iter().find(|e| e.id == id).cloned())
    }

    async fn set_event_status(
        &mut self,
        id: Uuid,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<()> {
        let event = self
            .working
            .events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(AppError::NotFound)?;
        event.status = status;
        event.status_note = note.map(str::to_string);
        event.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn subscription_by_owner(&mut self, owner: &OwnerRef) -> AppResult<Option<Subscription>> {
        Ok(self.working.subscription_for(owner).cloned())
    }

    async fn subscriptions_by_external_id(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<Vec<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .filter(|s| s.provider == provider && s.is_bound_to(external_subscription_id))
            .cloned()
            .collect())
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()> {
        self.check_injected_failure()?;
        match self
            .working
            .subscriptions
            .iter_mut()
            .find(|s| s.owner == subscription.owner)
        {
            Some(existing) => *existing = subscription.clone(),
            None => self.working.subscriptions.push(subscription.clone()),
        }
        self.working.record_binding(subscription);
        Ok(())
    }

    async fn external_id_seen(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<bool> {
        Ok(self
            .working
            .bindings
            .iter()
            .any(|(p, id)| *p == provider && id == external_subscription_id))
    }

    async fn record_subscription_audit(&mut self, audit: &SubscriptionAudit) -> AppResult<()> {
        self.working.audits.push(audit.clone());
        Ok(())
    }

    async fn write_invoice(&mut self, invoice: &Invoice) -> AppResult<InvoiceWrite> {
        self.check_injected_failure()?;
        let existing = self.working.invoices.iter_mut().find(|i| {
            i.provider == invoice.provider && i.external_invoice_id == invoice.external_invoice_id
        });
        match existing {
            None => {
                self.working.invoices.push(invoice.clone());
                Ok(InvoiceWrite::Created)
            }
            Some(row) if row.status.can_normalize_to(invoice.status) => {
                let previous = row.status;
                row.status = invoice.status;
                Ok(InvoiceWrite::StatusNormalized { previous })
            }
            Some(_) => Ok(InvoiceWrite::Unchanged),
        }
    }

    async fn contribution_by_key(
        &mut self,
        key: &ContributionKey,
    ) -> AppResult<Option<Contribution>> {
        Ok(self
            .working
            .contributions
            .iter()
            .find(|c| c.id == key.contribution_id && c.bill_id == key.bill_id)
            .cloned())
    }

    async fn update_contribution(&mut self, contribution: &Contribution) -> AppResult<()> {
        self.check_injected_failure()?;
        let row = self
            .working
            .contributions
            .iter_mut()
            .find(|c| c.id == contribution.id)
            .ok_or(AppError::NotFound)?;
        *row = contribution.clone();
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let InMemoryLedgerTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}
