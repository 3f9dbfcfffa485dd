use std::sync::Arc;

use strum::{AsRefStr, Display};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            provider_adapter::{InboundNotification, ProviderAdapter},
            provider_status::ProviderStatusClient,
        },
        use_cases::{
            event_ledger::{EventLedgerUseCases, IngestOutcome},
            provider_credentials::ProviderCredentialUseCases,
            reconciliation::ApplyOutcome,
        },
    },
    domain::entities::{
        contribution::{Contribution, ContributionKey, ContributionStatus},
        payment_event::{
            Confidence, EventPayload, NotificationChannel, PaymentEvent, RedirectOutcome,
        },
    },
};

// ============================================================================
// Result page
// ============================================================================

/// Status echoed to the user-facing result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Pending,
    Failed,
    Error,
}

impl ResultStatus {
    pub fn message(&self) -> &'static str {
        match self {
            ResultStatus::Success => "Payment successful. Thank you for your contribution.",
            ResultStatus::Pending => {
                "Your payment is being processed. The contribution will be updated once the provider confirms it."
            }
            ResultStatus::Failed => "Payment was not completed. No amount has been recorded.",
            ResultStatus::Error => {
                "We could not match this payment. Please contact the organizer if you were charged."
            }
        }
    }
}

impl From<ContributionStatus> for ResultStatus {
    fn from(status: ContributionStatus) -> Self {
        match status {
            ContributionStatus::Paid => ResultStatus::Success,
            ContributionStatus::Failed => ResultStatus::Failed,
            ContributionStatus::Pending => ResultStatus::Pending,
        }
    }
}

/// Non-sensitive echo parameters for the result page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectResult {
    pub status: ResultStatus,
    pub contribution_id: Option<String>,
    pub payment_id: Option<String>,
    pub amount: Option<String>,
    pub payer_name: Option<String>,
}

impl RedirectResult {
    /// Generic failure. Carries no identifiers at all.
    pub fn error() -> Self {
        Self {
            status: ResultStatus::Error,
            contribution_id: None,
            payment_id: None,
            amount: None,
            payer_name: None,
        }
    }

    fn for_contribution(status: ResultStatus, contribution: &Contribution) -> Self {
        Self {
            status,
            contribution_id: Some(contribution.id.clone()),
            payment_id: Some(
                contribution
                    .transaction_ref
                    .clone()
                    .unwrap_or_else(|| contribution.bill_id.clone()),
            ),
            amount: Some(format_amount(contribution.amount, &contribution.currency)),
            payer_name: contribution.payer_name.as_deref().and_then(mask_payer_name),
        }
    }

    /// Result page URL with the echo parameters appended.
    pub fn to_url(&self, result_page: &Url) -> Url {
        let mut url = result_page.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("status", self.status.as_ref())
                .append_pair("message", self.status.message());
            if let Some(id) = &self.contribution_id {
                query.append_pair("contributionId", id);
            }
            if let Some(id) = &self.payment_id {
                query.append_pair("paymentId", id);
            }
            if let Some(amount) = &self.amount {
                query.append_pair("amount", amount);
            }
            if let Some(name) = &self.payer_name {
                query.append_pair("payerName", name);
            }
        }
        url
    }
}

/// `5000, "myr"` -> `"RM 50.00"`. Other currencies use their upper-case code.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    let symbol = if currency.eq_ignore_ascii_case("myr") {
        "RM".to_string()
    } else {
        currency.to_uppercase()
    };
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{symbol} {sign}{}.{:02}", abs / 100, abs % 100)
}

/// `"Ahmad Ali"` -> `"A*** A***"`.
pub fn mask_payer_name(name: &str) -> Option<String> {
    let masked: Vec<String> = name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .map(|first| format!("{first}***"))
        .collect();
    (!masked.is_empty()).then(|| masked.join(" "))
}

// ============================================================================
// Use cases
// ============================================================================

/// Settles contributions from browser redirects and provider server callbacks.
///
/// Both channels feed the same ledger path, so whichever arrives first changes
/// state and the other is deduplicated.
#[derive(Clone)]
pub struct RedirectResolverUseCases {
    ledger: Arc<EventLedgerUseCases>,
    credentials: Arc<ProviderCredentialUseCases>,
    status_clients: Vec<Arc<dyn ProviderStatusClient>>,
    verify_redirects: bool,
}

impl RedirectResolverUseCases {
    pub fn new(
        ledger: Arc<EventLedgerUseCases>,
        credentials: Arc<ProviderCredentialUseCases>,
        status_clients: Vec<Arc<dyn ProviderStatusClient>>,
        verify_redirects: bool,
    ) -> Self {
        Self {
            ledger,
            credentials,
            status_clients,
            verify_redirects,
        }
    }

    /// Browser redirect. Never fails: every path ends on the result page.
    pub async fn resolve(
        &self,
        adapter: &dyn ProviderAdapter,
        notification: &InboundNotification,
    ) -> RedirectResult {
        let event = match adapter.verify_and_parse(notification) {
            Ok(event) => event,
            Err(e) => {
                warn!(provider = %adapter.provider(), error = %e, "Rejected payment redirect");
                return RedirectResult::error();
            }
        };

        let contribution = match self.matching_contribution(&event).await {
            Ok(Some(contribution)) => contribution,
            Ok(None) => return RedirectResult::error(),
            Err(e) => {
                warn!(provider = %event.provider, error = %e, "Contribution lookup failed");
                return RedirectResult::error();
            }
        };

        let mut event = self.confirm_success(event, &contribution).await;
        event.tenant_id = Some(contribution.tenant_id);

        match self.ledger.ingest(event).await {
            Ok(IngestOutcome::Recorded {
                outcome: ApplyOutcome::Failed { reason },
                ..
            }) => {
                warn!(contribution_id = %contribution.id, reason = %reason, "Redirect rejected by reconciliation");
                RedirectResult::error()
            }
            Ok(_) => self.current_result(&contribution).await,
            Err(e) => {
                // Callback or a later redirect settles it.
                warn!(contribution_id = %contribution.id, error = %e, "Redirect could not be recorded");
                RedirectResult::for_contribution(ResultStatus::Pending, &contribution)
            }
        }
    }

    /// Provider server callback. Errors propagate so the provider retries.
    pub async fn handle_callback(
        &self,
        adapter: &dyn ProviderAdapter,
        notification: &InboundNotification,
    ) -> AppResult<IngestOutcome> {
        let mut event = adapter.verify_and_parse(notification)?;
        if let Some(contribution) = self.matching_contribution(&event).await? {
            event.tenant_id = Some(contribution.tenant_id);
        }
        self.ledger.ingest(event).await
    }

    /// Strict compound-key lookup; a provider mismatch counts as not found.
    async fn matching_contribution(&self, event: &PaymentEvent) -> AppResult<Option<Contribution>> {
        let EventPayload::Contribution(data) = &event.payload else {
            return Err(AppError::ValidationError(
                "Notification does not describe a contribution".to_string(),
            ));
        };
        let Some(key) = ContributionKey::new(Some(&data.contribution_id), Some(&data.bill_id))
        else {
            return Ok(None);
        };

        let found = self
            .ledger
            .store()
            .find_contribution(&key)
            .await?
            .filter(|c| c.provider == event.provider);
        if found.is_none() {
            warn!(
                provider = %event.provider,
                contribution_id = %key.contribution_id,
                bill_id = %key.bill_id,
                "No contribution matches redirect"
            );
        }
        Ok(found)
    }

    /// Checks a claimed success against the provider's status API when a
    /// client and an active credential exist. The provider's answer wins; an
    /// unreachable provider downgrades the claim to pending.
    async fn confirm_success(
        &self,
        mut event: PaymentEvent,
        contribution: &Contribution,
    ) -> PaymentEvent {
        if !self.verify_redirects || event.channel != NotificationChannel::BrowserRedirect {
            return event;
        }
        let bill_id = match &event.payload {
            EventPayload::Contribution(data) if data.outcome == RedirectOutcome::Success => {
                data.bill_id.clone()
            }
            _ => return event,
        };
        let Some(client) = self
            .status_clients
            .iter()
            .find(|c| c.provider() == event.provider)
        else {
            return event;
        };

        let credential = match self
            .credentials
            .decrypted_credential(contribution.tenant_id, event.provider)
            .await
        {
            Ok(credential) => credential,
            Err(AppError::NotFound) => {
                debug!(
                    tenant_id = %contribution.tenant_id,
                    provider = %event.provider,
                    "No active credential, redirect left unverified"
                );
                return event;
            }
            Err(e) => {
                warn!(tenant_id = %contribution.tenant_id, error = %e, "Credential unavailable for status check");
                override_outcome(&mut event, RedirectOutcome::Pending);
                return event;
            }
        };

        match client.bill_outcome(&credential, &bill_id).await {
            Ok(answer) => {
                if answer != RedirectOutcome::Success {
                    info!(
                        contribution_id = %contribution.id,
                        bill_id = %bill_id,
                        provider_outcome = %answer,
                        "Provider disagrees with redirect"
                    );
                }
                override_outcome(&mut event, answer);
                event.confidence = Confidence::Verified;
            }
            Err(e) => {
                warn!(
                    contribution_id = %contribution.id,
                    bill_id = %bill_id,
                    error = %e,
                    "Status check failed, treating redirect as pending"
                );
                override_outcome(&mut event, RedirectOutcome::Pending);
            }
        }
        event
    }

    async fn current_result(&self, fallback: &Contribution) -> RedirectResult {
        let key = ContributionKey {
            contribution_id: fallback.id.clone(),
            bill_id: fallback.bill_id.clone(),
        };
        match self.ledger.store().find_contribution(&key).await {
            Ok(Some(current)) => RedirectResult::for_contribution(current.status.into(), &current),
            _ => RedirectResult::for_contribution(ResultStatus::Pending, fallback),
        }
    }
}

fn override_outcome(event: &mut PaymentEvent, outcome: RedirectOutcome) {
    if let EventPayload::Contribution(data) = &mut event.payload {
        data.outcome = outcome;
        event.provider_event_id = format!("{}:{}", data.bill_id, outcome);
    }
    event.kind = outcome.event_kind();
}
