use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Postgres, Row, Transaction, types::Json};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::ports::ledger_store::{LedgerStore, LedgerTx},
    domain::entities::{
        contribution::{Contribution, ContributionKey},
        invoice::{Invoice, InvoiceStatus, InvoiceWrite},
        payment_event::{EventPayload, PaymentEvent, ProcessingStatus, StoredEvent},
        payment_provider::PaymentProvider,
        user_subscription::{OwnerRef, Subscription, SubscriptionAudit},
    },
};

// ============================================================================
// Row mapping
// ============================================================================

const EVENT_COLS: &str = r#"
    id, provider, provider_event_id, kind, channel, confidence, tenant_id, status,
    status_note, payload, raw_payload, occurred_at, received_at, processed_at
"#;

const SUBSCRIPTION_COLS: &str = r#"
    id, owner_kind, owner_id, provider, plan, status, external_subscription_id,
    external_customer_id, current_period_start, current_period_end, cancel_at_period_end,
    canceled_at, trial_start, trial_end, created_at, updated_at
"#;

const CONTRIBUTION_COLS: &str = r#"
    id, tenant_id, provider, bill_id, amount, currency, payer_name, status,
    transaction_ref, paid_at, updated_at
"#;

fn row_to_event(row: &sqlx::postgres::PgRow) -> AppResult<StoredEvent> {
    let payload: Json<EventPayload> = row.try_get("payload").map_err(AppError::from)?;
    Ok(StoredEvent {
        id: row.get("id"),
        provider: row.get("provider"),
        provider_event_id: row.get("provider_event_id"),
        kind: row.get("kind"),
        channel: row.get("channel"),
        confidence: row.get("confidence"),
        tenant_id: row.get("tenant_id"),
        status: row.get("status"),
        status_note: row.get("status_note"),
        payload: payload.0,
        raw_payload: row.get("raw_payload"),
        occurred_at: row.get("occurred_at"),
        received_at: row.get("received_at"),
        processed_at: row.get("processed_at"),
    })
}

fn row_to_subscription(row: &sqlx::postgres::PgRow) -> Subscription {
    Subscription {
        id: row.get("id"),
        owner: OwnerRef {
            kind: row.get("owner_kind"),
            id: row.get("owner_id"),
        },
        provider: row.get("provider"),
        plan: row.get("plan"),
        status: row.get("status"),
        external_subscription_id: row.get("external_subscription_id"),
        external_customer_id: row.get("external_customer_id"),
        current_period_start: row.get("current_period_start"),
        current_period_end: row.get("current_period_end"),
        cancel_at_period_end: row.get("cancel_at_period_end"),
        canceled_at: row.get("canceled_at"),
        trial_start: row.get("trial_start"),
        trial_end: row.get("trial_end"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_contribution(row: &sqlx::postgres::PgRow) -> Contribution {
    Contribution {
        id: row.get("id"),
        tenant_id: row.get("tenant_id"),
        provider: row.get("provider"),
        bill_id: row.get("bill_id"),
        amount: row.get("amount"),
        currency: row.get("currency"),
        payer_name: row.get("payer_name"),
        status: row.get("status"),
        transaction_ref: row.get("transaction_ref"),
        paid_at: row.get("paid_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// Store
// ============================================================================

#[async_trait]
impl LedgerStore for PostgresPersistence {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTx>> {
        let tx = self.pool().begin().await.map_err(AppError::from)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn get_event(&self, id: Uuid) -> AppResult<Option<StoredEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_events WHERE id = $1",
            EVENT_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn list_events(
        &self,
        status: Option<ProcessingStatus>,
        limit: i64,
    ) -> AppResult<Vec<StoredEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM payment_events
            WHERE ($1::event_status IS NULL OR status = $1)
            ORDER BY received_at DESC
            LIMIT $2
            "#,
            EVENT_COLS
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        rows.iter().map(row_to_event).collect()
    }

    async fn find_contribution(&self, key: &ContributionKey) -> AppResult<Option<Contribution>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contributions WHERE id = $1 AND bill_id = $2",
            CONTRIBUTION_COLS
        ))
        .bind(&key.contribution_id)
        .bind(&key.bill_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_contribution))
    }
}

// ============================================================================
// Unit of work
// ============================================================================

/// Wraps one Postgres transaction. Dropping it without `commit` rolls back.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

impl PgLedgerTx {
    async fn invoice_status_for_update(
        &mut self,
        provider: PaymentProvider,
        external_invoice_id: &str,
    ) -> AppResult<Option<InvoiceStatus>> {
        sqlx::query_scalar(
            "SELECT status FROM invoices WHERE provider = $1 AND external_invoice_id = $2 FOR UPDATE",
        )
        .bind(provider)
        .bind(external_invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(AppError::from)
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert_event(
        &mut self,
        event: &PaymentEvent,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<Option<Uuid>> {
        let processed_at = (status != ProcessingStatus::Received).then(Utc::now);
        sqlx::query_scalar(
            r#"
            INSERT INTO payment_events
                (id, provider, provider_event_id, kind, channel, confidence, tenant_id,
                 status, status_note, payload, raw_payload, occurred_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (provider, provider_event_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.provider)
        .bind(&event.provider_event_id)
        .bind(event.kind)
        .bind(event.channel)
        .bind(event.confidence)
        .bind(event.tenant_id)
        .bind(status)
        .bind(note)
        .bind(Json(&event.payload))
        .bind(&event.raw_payload)
        .bind(event.occurred_at)
        .bind(processed_at)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(AppError::from)
    }

    async fn lock_event(&mut self, id: Uuid) -> AppResult<Option<StoredEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_events WHERE id = $1 FOR UPDATE",
            EVENT_COLS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        row.as_ref().map(row_to_event).transpose()
    }

    async fn set_event_status(
        &mut self,
        id: Uuid,
        status: ProcessingStatus,
        note: Option<&str>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE payment_events
            SET status = $2, status_note = $3, processed_at = CURRENT_TIMESTAMP
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(note)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn subscription_by_owner(&mut self, owner: &OwnerRef) -> AppResult<Option<Subscription>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE owner_kind = $1 AND owner_id = $2 FOR UPDATE",
            SUBSCRIPTION_COLS
        ))
        .bind(owner.kind)
        .bind(&owner.id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_subscription))
    }

    async fn subscriptions_by_external_id(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<Vec<Subscription>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM subscriptions
            WHERE provider = $1 AND external_subscription_id = $2
            ORDER BY created_at
            FOR UPDATE
            "#,
            SUBSCRIPTION_COLS
        ))
        .bind(provider)
        .bind(external_subscription_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_subscription).collect())
    }

    async fn save_subscription(&mut self, subscription: &Subscription) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, owner_kind, owner_id, provider, plan, status, external_subscription_id,
                 external_customer_id, current_period_start, current_period_end,
                 cancel_at_period_end, canceled_at, trial_start, trial_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (owner_kind, owner_id) DO UPDATE SET
                provider = EXCLUDED.provider,
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                external_subscription_id = EXCLUDED.external_subscription_id,
                external_customer_id = EXCLUDED.external_customer_id,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                canceled_at = EXCLUDED.canceled_at,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.owner.kind)
        .bind(&subscription.owner.id)
        .bind(subscription.provider)
        .bind(subscription.plan)
        .bind(subscription.status)
        .bind(&subscription.external_subscription_id)
        .bind(&subscription.external_customer_id)
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.canceled_at)
        .bind(subscription.trial_start)
        .bind(subscription.trial_end)
        .bind(subscription.created_at)
        .bind(subscription.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from)?;

        if let Some(ext_id) = &subscription.external_subscription_id {
            sqlx::query(
                r#"
                INSERT INTO subscription_bindings (provider, external_subscription_id, owner_kind, owner_id)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (provider, external_subscription_id) DO NOTHING
                "#,
            )
            .bind(subscription.provider)
            .bind(ext_id)
            .bind(subscription.owner.kind)
            .bind(&subscription.owner.id)
            .execute(&mut *self.tx)
            .await
            .map_err(AppError::from)?;
        }
        Ok(())
    }

    async fn external_id_seen(
        &mut self,
        provider: PaymentProvider,
        external_subscription_id: &str,
    ) -> AppResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM subscription_bindings
                WHERE provider = $1 AND external_subscription_id = $2
            ) AS seen
            "#,
        )
        .bind(provider)
        .bind(external_subscription_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        Ok(row.get("seen"))
    }

    async fn record_subscription_audit(&mut self, audit: &SubscriptionAudit) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_events
                (subscription_id, ledger_id, previous_status, new_status, note)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(audit.subscription_id)
        .bind(audit.ledger_id)
        .bind(audit.previous_status)
        .bind(audit.new_status)
        .bind(&audit.note)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn write_invoice(&mut self, invoice: &Invoice) -> AppResult<InvoiceWrite> {
        let existing = match self
            .invoice_status_for_update(invoice.provider, &invoice.external_invoice_id)
            .await?
        {
            Some(status) => status,
            None => {
                let inserted = sqlx::query(
                    r#"
                    INSERT INTO invoices
                        (id, owner_kind, owner_id, provider, external_invoice_id,
                         external_subscription_id, amount_paid, currency, status, invoice_url,
                         hosted_invoice_url, ledger_id, created_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    ON CONFLICT (provider, external_invoice_id) DO NOTHING
                    "#,
                )
                .bind(invoice.id)
                .bind(invoice.owner.kind)
                .bind(&invoice.owner.id)
                .bind(invoice.provider)
                .bind(&invoice.external_invoice_id)
                .bind(&invoice.external_subscription_id)
                .bind(invoice.amount_paid)
                .bind(&invoice.currency)
                .bind(invoice.status)
                .bind(&invoice.invoice_url)
                .bind(&invoice.hosted_invoice_url)
                .bind(invoice.ledger_id)
                .bind(invoice.created_at)
                .execute(&mut *self.tx)
                .await
                .map_err(AppError::from)?;

                if inserted.rows_affected() > 0 {
                    return Ok(InvoiceWrite::Created);
                }
                // A concurrent transaction inserted it first.
                self.invoice_status_for_update(invoice.provider, &invoice.external_invoice_id)
                    .await?
                    .ok_or(AppError::NotFound)?
            }
        };

        if !existing.can_normalize_to(invoice.status) {
            return Ok(InvoiceWrite::Unchanged);
        }

        sqlx::query(
            r#"
            UPDATE invoices
            SET status = $3, amount_paid = $4, ledger_id = $5, updated_at = CURRENT_TIMESTAMP
            WHERE provider = $1 AND external_invoice_id = $2
            "#,
        )
        .bind(invoice.provider)
        .bind(&invoice.external_invoice_id)
        .bind(invoice.status)
        .bind(invoice.amount_paid)
        .bind(invoice.ledger_id)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from)?;

        Ok(InvoiceWrite::StatusNormalized { previous: existing })
    }

    async fn contribution_by_key(
        &mut self,
        key: &ContributionKey,
    ) -> AppResult<Option<Contribution>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM contributions WHERE id = $1 AND bill_id = $2 FOR UPDATE",
            CONTRIBUTION_COLS
        ))
        .bind(&key.contribution_id)
        .bind(&key.bill_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_contribution))
    }

    async fn update_contribution(&mut self, contribution: &Contribution) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE contributions
            SET status = $2, transaction_ref = $3, paid_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(&contribution.id)
        .bind(contribution.status)
        .bind(&contribution.transaction_ref)
        .bind(contribution.paid_at)
        .bind(contribution.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(AppError::from)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(AppError::from)
    }
}
