use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::ledger_store::LedgerTx,
    domain::entities::{
        contribution::{ContributionKey, ContributionStatus},
        invoice::Invoice,
        payment_event::{
            CheckoutData, ContributionData, EventKind, EventPayload, InvoiceData, OwnerHints,
            PaymentEvent, ProcessingStatus, SubscriptionData,
        },
        payment_provider::PaymentProvider,
        user_subscription::{
            OwnerRef, Subscription, SubscriptionAudit, SubscriptionStatus,
        },
    },
};

/// Length of the provisional period set on checkout before the provider
/// reports the real billing window.
pub const PROVISIONAL_PERIOD_DAYS: i64 = 30;

// ============================================================================
// Types
// ============================================================================

/// Which subscription owner an event belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerResolution {
    Resolved {
        owner: OwnerRef,
        subscription: Option<Subscription>,
    },
    /// Metadata and stored bindings disagree. Routed to manual review.
    Ambiguous { candidates: Vec<OwnerRef> },
    NotFound,
}

/// Result of applying one event. Maps onto the ledger processing status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ApplyOutcome {
    Applied { note: Option<String> },
    /// Could not be attributed; kept for operator review.
    Ignored { reason: String },
    /// Attributed, but the change was refused.
    Failed { reason: String },
    /// Pending/unrecognized kinds. The row stays `received`.
    NotActionable,
}

impl ApplyOutcome {
    fn applied() -> Self {
        ApplyOutcome::Applied { note: None }
    }

    fn applied_with(note: impl Into<String>) -> Self {
        ApplyOutcome::Applied {
            note: Some(note.into()),
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        ApplyOutcome::Ignored {
            reason: reason.into(),
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        ApplyOutcome::Failed {
            reason: reason.into(),
        }
    }

    pub fn status(&self) -> ProcessingStatus {
        match self {
            ApplyOutcome::Applied { .. } => ProcessingStatus::Applied,
            ApplyOutcome::Ignored { .. } => ProcessingStatus::Ignored,
            ApplyOutcome::Failed { .. } => ProcessingStatus::Failed,
            ApplyOutcome::NotActionable => ProcessingStatus::Received,
        }
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            ApplyOutcome::Applied { note } => note.as_deref(),
            ApplyOutcome::Ignored { reason } | ApplyOutcome::Failed { reason } => Some(reason),
            ApplyOutcome::NotActionable => None,
        }
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Applies normalized events to subscriptions, invoices and contributions.
///
/// Stateless: every read and write goes through the caller's unit of work, so
/// the ledger insert and the state change commit or roll back together.
#[derive(Clone, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    pub async fn apply(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        event: &PaymentEvent,
    ) -> AppResult<ApplyOutcome> {
        if !event.kind.is_actionable() {
            debug!(
                provider = %event.provider,
                provider_event_id = %event.provider_event_id,
                "Event not actionable yet"
            );
            return Ok(ApplyOutcome::NotActionable);
        }

        match (&event.payload, event.kind) {
            (EventPayload::Checkout(data), EventKind::CheckoutCompleted) => {
                self.apply_checkout(tx, ledger_id, event, data).await
            }
            (
                EventPayload::Subscription(data),
                EventKind::SubscriptionCreated | EventKind::SubscriptionUpdated,
            ) => self.apply_subscription_change(tx, ledger_id, event, data).await,
            (EventPayload::Subscription(data), EventKind::SubscriptionDeleted) => {
                self.apply_subscription_deleted(tx, ledger_id, event, data).await
            }
            (EventPayload::Invoice(data), EventKind::InvoicePaid | EventKind::InvoiceFailed) => {
                self.apply_invoice(tx, ledger_id, event, data).await
            }
            (
                EventPayload::Contribution(data),
                EventKind::RedirectConfirmed | EventKind::RedirectFailed,
            ) => self.apply_contribution(tx, event, data).await,
            (EventPayload::Unrecognized { .. }, _) => Ok(ApplyOutcome::NotActionable),
            (_, kind) => Ok(ApplyOutcome::failed(format!(
                "payload does not match event kind {kind}"
            ))),
        }
    }

    /// Ordered owner resolution: metadata first, then the stored binding of
    /// the external subscription id. Never guesses.
    pub async fn resolve_owner(
        &self,
        tx: &mut dyn LedgerTx,
        provider: PaymentProvider,
        hints: &OwnerHints,
        external_subscription_id: Option<&str>,
    ) -> AppResult<OwnerResolution> {
        let bound = match external_subscription_id {
            Some(ext) => tx.subscriptions_by_external_id(provider, ext).await?,
            None => Vec::new(),
        };

        if let Some(owner) = hints.metadata_owner() {
            if let Some(other) = bound.iter().find(|s| s.owner != owner) {
                return Ok(OwnerResolution::Ambiguous {
                    candidates: vec![owner, other.owner.clone()],
                });
            }
            let subscription = tx.subscription_by_owner(&owner).await?;
            return Ok(OwnerResolution::Resolved {
                owner,
                subscription,
            });
        }

        match bound.as_slice() {
            [] => Ok(OwnerResolution::NotFound),
            [only] => {
                let owner = only.owner.clone();
                let subscription = tx.subscription_by_owner(&owner).await?;
                Ok(OwnerResolution::Resolved {
                    owner,
                    subscription,
                })
            }
            many => Ok(OwnerResolution::Ambiguous {
                candidates: many.iter().map(|s| s.owner.clone()).collect(),
            }),
        }
    }

    async fn apply_checkout(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        event: &PaymentEvent,
        data: &CheckoutData,
    ) -> AppResult<ApplyOutcome> {
        let Some(ext_id) = data.external_subscription_id.as_deref() else {
            return Ok(ApplyOutcome::ignored("checkout session has no subscription"));
        };

        let (owner, existing) = match self
            .resolve_owner(tx, event.provider, &data.owner, Some(ext_id))
            .await?
        {
            OwnerResolution::Resolved {
                owner,
                subscription,
            } => (owner, subscription),
            unresolved => return Ok(unresolved_outcome(event, &unresolved)),
        };

        let now = Utc::now();
        let mut sub = existing
            .clone()
            .unwrap_or_else(|| Subscription::new_for(owner.clone(), event.provider, now));
        let previous = existing.as_ref().map(|s| s.status);

        if !sub.is_bound_to(ext_id) {
            if tx.external_id_seen(event.provider, ext_id).await? {
                return Ok(superseded_outcome(event, ext_id));
            }
            start_new_subscription(&mut sub, event.provider, ext_id);
        } else if sub.status.is_terminal() {
            return self
                .touch_canceled(tx, ledger_id, sub, None, "checkout for canceled subscription")
                .await;
        }

        sub.status = SubscriptionStatus::Active;
        if data.external_customer_id.is_some() {
            sub.external_customer_id = data.external_customer_id.clone();
        }
        if let Some(plan) = data.plan {
            sub.plan = plan;
        }
        if sub.current_period_end.is_none() {
            sub.current_period_start = Some(event.occurred_at);
            sub.current_period_end =
                Some(event.occurred_at + Duration::days(PROVISIONAL_PERIOD_DAYS));
        }
        sub.updated_at = now;

        self.save_with_audit(tx, ledger_id, &sub, previous, None).await?;
        Ok(ApplyOutcome::applied())
    }

    async fn apply_subscription_change(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        event: &PaymentEvent,
        data: &SubscriptionData,
    ) -> AppResult<ApplyOutcome> {
        let Some(incoming) = data.status else {
            return Ok(ApplyOutcome::NotActionable);
        };
        let ext_id = data.external_subscription_id.as_str();

        let (owner, existing) = match self
            .resolve_owner(tx, event.provider, &data.owner, Some(ext_id))
            .await?
        {
            OwnerResolution::Resolved {
                owner,
                subscription,
            } => (owner, subscription),
            unresolved => return Ok(unresolved_outcome(event, &unresolved)),
        };

        let now = Utc::now();
        let previous = existing.as_ref().map(|s| s.status);
        let mut sub = existing
            .clone()
            .unwrap_or_else(|| Subscription::new_for(owner, event.provider, now));

        let mut note = None;
        if !sub.is_bound_to(ext_id) {
            if tx.external_id_seen(event.provider, ext_id).await? {
                return Ok(superseded_outcome(event, ext_id));
            }
            // New external subscription: provider status taken verbatim.
            start_new_subscription(&mut sub, event.provider, ext_id);
        } else {
            if sub.status.is_terminal() && incoming != SubscriptionStatus::Canceled {
                return self
                    .touch_canceled(tx, ledger_id, sub, data.canceled_at, "canceled is terminal")
                    .await;
            }
            if !sub.status.can_transition_to(incoming) {
                warn!(
                    owner_id = %sub.owner,
                    from = %sub.status,
                    to = %incoming,
                    provider_event_id = %event.provider_event_id,
                    "Illegal subscription transition reported by provider"
                );
                return Ok(ApplyOutcome::failed(format!(
                    "illegal transition {} -> {}",
                    sub.status, incoming
                )));
            }
            let regressed = match (sub.current_period_end, data.current_period_end) {
                (Some(stored), Some(new_end)) => {
                    new_end < stored && incoming != SubscriptionStatus::Canceled
                }
                _ => false,
            };
            if regressed {
                warn!(
                    owner_id = %sub.owner,
                    stored_period_end = ?sub.current_period_end,
                    incoming_period_end = ?data.current_period_end,
                    provider_event_id = %event.provider_event_id,
                    "Period end regressed; applying provider value"
                );
                note = Some("period_end_regressed".to_string());
            }
        }

        sub.status = incoming;
        overwrite_from_snapshot(&mut sub, data);
        sub.updated_at = now;

        self.save_with_audit(tx, ledger_id, &sub, previous, note.clone())
            .await?;
        Ok(ApplyOutcome::Applied { note })
    }

    async fn apply_subscription_deleted(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        event: &PaymentEvent,
        data: &SubscriptionData,
    ) -> AppResult<ApplyOutcome> {
        let ext_id = data.external_subscription_id.as_str();

        let existing = match self
            .resolve_owner(tx, event.provider, &data.owner, Some(ext_id))
            .await?
        {
            OwnerResolution::Resolved { subscription, .. } => subscription,
            unresolved => return Ok(unresolved_outcome(event, &unresolved)),
        };

        let Some(mut sub) = existing else {
            return Ok(ApplyOutcome::ignored("no subscription to cancel"));
        };

        if !sub.is_bound_to(ext_id) {
            debug!(
                owner_id = %sub.owner,
                external_subscription_id = %ext_id,
                "Deletion for superseded subscription"
            );
            return Ok(ApplyOutcome::applied_with("stale deletion of superseded subscription"));
        }

        let previous = sub.status;
        sub.status = SubscriptionStatus::Canceled;
        sub.canceled_at = Some(event.occurred_at);
        sub.cancel_at_period_end = false;
        if data.current_period_start.is_some() {
            sub.current_period_start = data.current_period_start;
        }
        if data.current_period_end.is_some() {
            sub.current_period_end = data.current_period_end;
        }
        sub.updated_at = Utc::now();

        self.save_with_audit(tx, ledger_id, &sub, Some(previous), None)
            .await?;
        Ok(ApplyOutcome::applied())
    }

    async fn apply_invoice(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        event: &PaymentEvent,
        data: &InvoiceData,
    ) -> AppResult<ApplyOutcome> {
        let ext_sub = data.external_subscription_id.as_deref();

        let (owner, existing) = match self
            .resolve_owner(tx, event.provider, &data.owner, ext_sub)
            .await?
        {
            OwnerResolution::Resolved {
                owner,
                subscription,
            } => (owner, subscription),
            unresolved => return Ok(unresolved_outcome(event, &unresolved)),
        };

        let invoice = Invoice {
            id: Uuid::new_v4(),
            owner,
            provider: event.provider,
            external_invoice_id: data.external_invoice_id.clone(),
            external_subscription_id: data.external_subscription_id.clone(),
            amount_paid: data.amount_paid,
            currency: data.currency.to_lowercase(),
            status: data.status,
            invoice_url: data.invoice_url.clone(),
            hosted_invoice_url: data.hosted_invoice_url.clone(),
            ledger_id,
            created_at: event.occurred_at,
        };

        let write = tx.write_invoice(&invoice).await?;
        if !write.changed() {
            return Ok(ApplyOutcome::applied_with("invoice already recorded"));
        }

        let Some(mut sub) = existing else {
            return Ok(ApplyOutcome::applied_with("no subscription for invoice owner"));
        };
        if ext_sub.is_some_and(|ext| !sub.is_bound_to(ext)) {
            return Ok(ApplyOutcome::applied_with(
                "invoice for superseded subscription",
            ));
        }
        if sub.status.is_terminal() {
            return self
                .touch_canceled(tx, ledger_id, sub, None, "invoice for canceled subscription")
                .await;
        }

        let previous = sub.status;
        sub.status = match event.kind {
            EventKind::InvoicePaid => SubscriptionStatus::Active,
            _ if previous == SubscriptionStatus::Unpaid => SubscriptionStatus::Unpaid,
            _ => SubscriptionStatus::PastDue,
        };
        sub.updated_at = Utc::now();

        self.save_with_audit(tx, ledger_id, &sub, Some(previous), None)
            .await?;
        Ok(ApplyOutcome::applied())
    }

    async fn apply_contribution(
        &self,
        tx: &mut dyn LedgerTx,
        event: &PaymentEvent,
        data: &ContributionData,
    ) -> AppResult<ApplyOutcome> {
        let Some(key) = ContributionKey::new(Some(&data.contribution_id), Some(&data.bill_id))
        else {
            return Ok(ApplyOutcome::ignored("incomplete contribution key"));
        };

        let Some(mut contribution) = tx.contribution_by_key(&key).await? else {
            warn!(
                contribution_id = %key.contribution_id,
                bill_id = %key.bill_id,
                "No contribution matches compound key"
            );
            return Ok(ApplyOutcome::ignored("contribution not found for compound key"));
        };

        if contribution.provider != event.provider
            || event.tenant_id.is_some_and(|t| t != contribution.tenant_id)
        {
            return Ok(ApplyOutcome::ignored("contribution belongs to another provider or tenant"));
        }

        if let Some(amount) = data.amount.filter(|a| *a != contribution.amount) {
            warn!(
                contribution_id = %contribution.id,
                expected = contribution.amount,
                received = amount,
                "Contribution amount mismatch"
            );
            return Ok(ApplyOutcome::failed(format!(
                "amount mismatch: expected {}, received {}",
                contribution.amount, amount
            )));
        }

        let target = match event.kind {
            EventKind::RedirectConfirmed => ContributionStatus::Paid,
            _ => ContributionStatus::Failed,
        };

        if contribution.status == target {
            return Ok(ApplyOutcome::applied_with(format!("contribution already {target}")));
        }
        if !contribution.status.can_transition_to(target) {
            return Ok(ApplyOutcome::applied_with(format!(
                "contribution is {}; {} not applied",
                contribution.status, target
            )));
        }

        contribution.status = target;
        if data.transaction_ref.is_some() {
            contribution.transaction_ref = data.transaction_ref.clone();
        }
        if target == ContributionStatus::Paid {
            contribution.paid_at = Some(event.occurred_at);
        }
        contribution.updated_at = Utc::now();

        tx.update_contribution(&contribution).await?;
        Ok(ApplyOutcome::applied())
    }

    /// Canceled subscriptions only get audit fields updated.
    async fn touch_canceled(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        mut sub: Subscription,
        canceled_at: Option<chrono::DateTime<Utc>>,
        note: &str,
    ) -> AppResult<ApplyOutcome> {
        if canceled_at.is_some() {
            sub.canceled_at = canceled_at;
        }
        sub.updated_at = Utc::now();
        self.save_with_audit(
            tx,
            ledger_id,
            &sub,
            Some(SubscriptionStatus::Canceled),
            Some(note.to_string()),
        )
        .await?;
        Ok(ApplyOutcome::applied_with(note))
    }

    async fn save_with_audit(
        &self,
        tx: &mut dyn LedgerTx,
        ledger_id: Uuid,
        sub: &Subscription,
        previous_status: Option<SubscriptionStatus>,
        note: Option<String>,
    ) -> AppResult<()> {
        tx.save_subscription(sub).await?;
        tx.record_subscription_audit(&SubscriptionAudit {
            subscription_id: sub.id,
            ledger_id,
            previous_status,
            new_status: sub.status,
            note,
        })
        .await
    }
}

fn unresolved_outcome(event: &PaymentEvent, resolution: &OwnerResolution) -> ApplyOutcome {
    match resolution {
        OwnerResolution::Ambiguous { candidates } => {
            let owners: Vec<String> = candidates.iter().map(ToString::to_string).collect();
            warn!(
                provider = %event.provider,
                provider_event_id = %event.provider_event_id,
                candidates = ?owners,
                "Ambiguous owner, event left for review"
            );
            ApplyOutcome::ignored(format!("ambiguous owner: {}", owners.join(", ")))
        }
        _ => {
            warn!(
                provider = %event.provider,
                provider_event_id = %event.provider_event_id,
                "No owner found, event left for review"
            );
            ApplyOutcome::ignored("owner not found")
        }
    }
}

/// Late event for an external subscription the owner has since moved off.
fn superseded_outcome(event: &PaymentEvent, ext_id: &str) -> ApplyOutcome {
    debug!(
        provider = %event.provider,
        provider_event_id = %event.provider_event_id,
        external_subscription_id = %ext_id,
        "Event for superseded subscription, row left unchanged"
    );
    ApplyOutcome::applied_with("stale event for superseded subscription")
}

/// Rebinds a subscription row to a brand-new external subscription.
fn start_new_subscription(sub: &mut Subscription, provider: PaymentProvider, ext_id: &str) {
    sub.provider = provider;
    sub.external_subscription_id = Some(ext_id.to_string());
    sub.current_period_start = None;
    sub.current_period_end = None;
    sub.cancel_at_period_end = false;
    sub.canceled_at = None;
    sub.trial_start = None;
    sub.trial_end = None;
}

fn overwrite_from_snapshot(sub: &mut Subscription, data: &SubscriptionData) {
    if let Some(plan) = data.plan {
        sub.plan = plan;
    }
    if data.external_customer_id.is_some() {
        sub.external_customer_id = data.external_customer_id.clone();
    }
    if data.current_period_start.is_some() {
        sub.current_period_start = data.current_period_start;
    }
    if data.current_period_end.is_some() {
        sub.current_period_end = data.current_period_end;
    }
    sub.cancel_at_period_end = data.cancel_at_period_end;
    sub.canceled_at = data.canceled_at;
    sub.trial_start = data.trial_start;
    sub.trial_end = data.trial_end;
}
