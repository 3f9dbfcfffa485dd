use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult, is_retryable_error},
    application::{
        ports::ledger_store::LedgerStore,
        use_cases::reconciliation::{ApplyOutcome, ReconciliationEngine},
    },
    domain::entities::payment_event::{PaymentEvent, ProcessingStatus, StoredEvent},
};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "ingest", rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Already in the ledger. Nothing was written.
    Duplicate,
    Recorded {
        ledger_id: Uuid,
        outcome: ApplyOutcome,
    },
}

impl IngestOutcome {
    /// True only for the delivery that changed state.
    pub fn applied(&self) -> bool {
        matches!(
            self,
            IngestOutcome::Recorded {
                outcome: ApplyOutcome::Applied { .. },
                ..
            }
        )
    }
}

/// Deduplicating entry point for every inbound notification.
#[derive(Clone)]
pub struct EventLedgerUseCases {
    store: Arc<dyn LedgerStore>,
    engine: ReconciliationEngine,
}

impl EventLedgerUseCases {
    pub fn new(store: Arc<dyn LedgerStore>, engine: ReconciliationEngine) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    /// Records the event on first sight and applies it in the same transaction.
    ///
    /// - Duplicate `(provider, provider_event_id)`: no-op, `Duplicate`.
    /// - Any error while applying: the ledger row and the state change roll
    ///   back together and the error is returned, so a redelivery is processed
    ///   from scratch instead of being skipped as a duplicate.
    ///
    /// Refusals the engine reports as outcomes (`ignored`, `failed`) are not
    /// errors and commit with the row.
    pub async fn ingest(&self, event: PaymentEvent) -> AppResult<IngestOutcome> {
        let mut tx = self.store.begin().await?;

        let Some(ledger_id) = tx
            .insert_event(&event, ProcessingStatus::Received, None)
            .await?
        else {
            info!(
                provider = %event.provider,
                provider_event_id = %event.provider_event_id,
                "Duplicate event, skipping"
            );
            return Ok(IngestOutcome::Duplicate);
        };

        match self.engine.apply(tx.as_mut(), ledger_id, &event).await {
            Ok(outcome) => {
                if outcome.status() != ProcessingStatus::Received {
                    tx.set_event_status(ledger_id, outcome.status(), outcome.note())
                        .await?;
                }
                tx.commit().await?;

                info!(
                    provider = %event.provider,
                    provider_event_id = %event.provider_event_id,
                    ledger_id = %ledger_id,
                    kind = %event.kind,
                    status = %outcome.status(),
                    "Event recorded"
                );
                Ok(IngestOutcome::Recorded { ledger_id, outcome })
            }
            Err(e) => {
                drop(tx);
                let retryable = is_retryable_error(&e);
                if retryable {
                    error!(
                        provider = %event.provider,
                        provider_event_id = %event.provider_event_id,
                        error = %e,
                        retryable,
                        "Event processing failed, rolled back for redelivery"
                    );
                } else {
                    warn!(
                        provider = %event.provider,
                        provider_event_id = %event.provider_event_id,
                        error = %e,
                        retryable,
                        "Event rejected, rolled back for redelivery"
                    );
                }
                Err(e)
            }
        }
    }

    /// Review queue, newest first.
    pub async fn list_events(
        &self,
        status: Option<ProcessingStatus>,
        limit: Option<i64>,
    ) -> AppResult<Vec<StoredEvent>> {
        let limit = limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        self.store.list_events(status, limit).await
    }

    pub async fn get_event(&self, ledger_id: Uuid) -> AppResult<StoredEvent> {
        self.store
            .get_event(ledger_id)
            .await?
            .ok_or(AppError::NotFound)
    }

    /// Re-applies an `ignored` or `failed` event from its stored payload.
    pub async fn replay(&self, ledger_id: Uuid) -> AppResult<ApplyOutcome> {
        let mut tx = self.store.begin().await?;
        let stored = tx.lock_event(ledger_id).await?.ok_or(AppError::NotFound)?;

        if !stored.status.is_replayable() {
            return Err(AppError::InvalidInput(format!(
                "Only ignored or failed events can be replayed (status: {})",
                stored.status
            )));
        }

        let event = stored.to_event();
        match self.engine.apply(tx.as_mut(), ledger_id, &event).await {
            Ok(outcome) => {
                tx.set_event_status(ledger_id, outcome.status(), outcome.note())
                    .await?;
                tx.commit().await?;
                info!(
                    ledger_id = %ledger_id,
                    status = %outcome.status(),
                    "Event replayed"
                );
                Ok(outcome)
            }
            Err(e) if is_retryable_error(&e) => Err(e),
            Err(e) => {
                drop(tx);
                let reason = e.to_string();
                let mut tx = self.store.begin().await?;
                tx.lock_event(ledger_id).await?;
                tx.set_event_status(ledger_id, ProcessingStatus::Failed, Some(&reason))
                    .await?;
                tx.commit().await?;
                Ok(ApplyOutcome::Failed { reason })
            }
        }
    }
}
