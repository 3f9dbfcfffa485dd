use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::provider_status::ProviderStatusClient,
    domain::entities::{
        payment_event::RedirectOutcome, payment_provider::PaymentProvider,
        provider_credential::DecryptedCredential,
    },
};

use super::ToyyibpayAdapter;

const BILL_TRANSACTIONS_PATH: &str = "index.php/api/getBillTransactions";

/// Reads the authoritative bill status from ToyyibPay.
#[derive(Clone)]
pub struct ToyyibpayStatusClient {
    client: Client,
    base_url: Url,
    sandbox_base_url: Url,
}

impl ToyyibpayStatusClient {
    pub fn new(client: Client, base_url: Url, sandbox_base_url: Url) -> Self {
        Self {
            client,
            base_url,
            sandbox_base_url,
        }
    }

    fn endpoint(&self, sandbox: bool) -> AppResult<Url> {
        let base = if sandbox {
            &self.sandbox_base_url
        } else {
            &self.base_url
        };
        base.join(BILL_TRANSACTIONS_PATH)
            .map_err(|e| AppError::Internal(format!("Invalid ToyyibPay URL: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
pub struct BillTransaction {
    #[serde(rename = "billpaymentStatus")]
    pub status: String,
    #[serde(rename = "billpaymentInvoiceNo", default)]
    pub invoice_no: Option<String>,
}

/// Any successful transaction settles the bill; otherwise the latest one
/// decides. No transactions yet means pending.
pub fn outcome_from_transactions(transactions: &[BillTransaction]) -> RedirectOutcome {
    if transactions
        .iter()
        .any(|t| ToyyibpayAdapter::outcome_for(&t.status) == RedirectOutcome::Success)
    {
        return RedirectOutcome::Success;
    }
    transactions
        .last()
        .map(|t| ToyyibpayAdapter::outcome_for(&t.status))
        .unwrap_or(RedirectOutcome::Pending)
}

#[async_trait]
impl ProviderStatusClient for ToyyibpayStatusClient {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Toyyibpay
    }

    async fn bill_outcome(
        &self,
        credential: &DecryptedCredential,
        bill_id: &str,
    ) -> AppResult<RedirectOutcome> {
        let user_secret_key = credential
            .field("user_secret_key")
            .ok_or(AppError::CredentialUnavailable)?;

        let response = self
            .client
            .post(self.endpoint(credential.is_sandbox)?)
            .form(&[("billCode", bill_id), ("userSecretKey", user_secret_key)])
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("ToyyibPay request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!(status = %status, bill_id = %bill_id, "ToyyibPay API error");
            return Err(AppError::Internal(format!("ToyyibPay API error: {}", status)));
        }

        // An unknown bill comes back as an empty body or a non-array message.
        let transactions: Vec<BillTransaction> = match body.trim() {
            "" => Vec::new(),
            raw => serde_json::from_str(raw).unwrap_or_else(|e| {
                debug!(bill_id = %bill_id, error = %e, "Unrecognized ToyyibPay response");
                Vec::new()
            }),
        };

        Ok(outcome_from_transactions(&transactions))
    }
}
