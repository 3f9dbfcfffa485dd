use std::net::SocketAddr;

use env_helpers::get_env_default;
use secrecy::SecretString;
use url::Url;

use super::InfraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

pub struct AppConfig {
    pub database_url: SecretString,
    pub db_max_connections: u32,
    /// Apply embedded migrations on startup.
    pub run_migrations: bool,
    pub bind_addr: SocketAddr,
    /// Current AES-256-GCM key for provider credentials (base64, 32 bytes).
    pub credential_encryption_key: SecretString,
    /// Previous key generation, kept while credentials are being rotated.
    pub credential_encryption_key_previous: Option<SecretString>,
    /// Platform-level Stripe signing secret for `/webhooks/stripe`.
    pub stripe_webhook_secret: Option<SecretString>,
    pub webhook_tolerance_secs: i64,
    pub admin_api_token: SecretString,
    /// Where browser redirects land after a gateway payment.
    pub result_page_url: Url,
    pub toyyibpay_base_url: Url,
    pub toyyibpay_sandbox_base_url: Url,
    /// Confirm redirect successes against the provider's status API.
    pub verify_redirects: bool,
    pub log_format: LogFormat,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url = SecretString::new(required("DATABASE_URL")?.into());
        let credential_encryption_key =
            SecretString::new(required("CREDENTIAL_ENCRYPTION_KEY")?.into());
        let credential_encryption_key_previous =
            optional("CREDENTIAL_ENCRYPTION_KEY_PREVIOUS").map(|v| SecretString::new(v.into()));
        let stripe_webhook_secret =
            optional("STRIPE_WEBHOOK_SECRET").map(|v| SecretString::new(v.into()));
        let admin_api_token = SecretString::new(required("ADMIN_API_TOKEN")?.into());

        let db_max_connections: u32 = get_env_default("DB_MAX_CONNECTIONS", 10);
        let run_migrations: bool = get_env_default("RUN_MIGRATIONS", true);
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let webhook_tolerance_secs: i64 = get_env_default("WEBHOOK_TOLERANCE_SECS", 300);
        let verify_redirects: bool = get_env_default("VERIFY_REDIRECTS", true);

        let result_page_url = url_or_default(
            "RESULT_PAGE_URL",
            "http://localhost:3000/payment/result",
        )?;
        let toyyibpay_base_url = url_or_default("TOYYIBPAY_BASE_URL", "https://toyyibpay.com")?;
        let toyyibpay_sandbox_base_url =
            url_or_default("TOYYIBPAY_SANDBOX_BASE_URL", "https://dev.toyyibpay.com")?;

        let log_format = match optional("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            database_url,
            db_max_connections,
            run_migrations,
            bind_addr,
            credential_encryption_key,
            credential_encryption_key_previous,
            stripe_webhook_secret,
            webhook_tolerance_secs,
            admin_api_token,
            result_page_url,
            toyyibpay_base_url,
            toyyibpay_sandbox_base_url,
            verify_redirects,
            log_format,
        })
    }
}

fn required(var: &'static str) -> Result<String, InfraError> {
    optional(var).ok_or(InfraError::ConfigMissing { var })
}

fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn url_or_default(var: &'static str, default: &str) -> Result<Url, InfraError> {
    let raw: String = get_env_default(var, default.to_string());
    Url::parse(&raw).map_err(|_| InfraError::ConfigInvalid { var })
}
