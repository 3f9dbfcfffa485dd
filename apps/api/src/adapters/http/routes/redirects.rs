//! Browser redirects back from redirect-style gateways.
//!
//! Every request ends in a `303 See Other` to the result page. The query the
//! browser carried is never trusted on its own: it goes through the ledger
//! like any other notification and the page shows the reconciled state.

use std::collections::HashMap;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, RawQuery, State},
    response::Redirect,
    routing::get,
};
use tracing::warn;
use url::form_urlencoded;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::provider_adapter::InboundNotification,
        use_cases::redirect_resolver::RedirectResult,
    },
    domain::entities::{payment_event::NotificationChannel, payment_provider::PaymentProvider},
    infra::providers::redirect_adapter,
};

/// GET /api/redirects/{provider}
async fn redirect_get(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    RawQuery(query): RawQuery,
) -> Redirect {
    let query = query.unwrap_or_default();
    let params = parse_form(&query);
    resolve(&app_state, &provider, query, params).await
}

/// POST /api/redirects/{provider}
/// Some gateways post the return form instead; query parameters still count.
/// The body is decoded lossily so a malformed form still ends in a redirect.
async fn redirect_post(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Redirect {
    let body = String::from_utf8_lossy(&body).into_owned();
    let mut params = parse_form(query.as_deref().unwrap_or_default());
    params.extend(parse_form(&body));
    resolve(&app_state, &provider, body, params).await
}

async fn resolve(
    app_state: &AppState,
    provider: &str,
    raw: String,
    params: HashMap<String, String>,
) -> Redirect {
    let adapter = provider
        .parse::<PaymentProvider>()
        .ok()
        .and_then(redirect_adapter);

    let result = match adapter {
        Some(adapter) => {
            let notification =
                InboundNotification::with_params(NotificationChannel::BrowserRedirect, raw, params);
            app_state
                .redirect_use_cases
                .resolve(adapter.as_ref(), &notification)
                .await
        }
        None => {
            warn!(provider = %provider, "Redirect for unsupported provider");
            RedirectResult::error()
        }
    };

    Redirect::to(result.to_url(&app_state.config.result_page_url).as_str())
}

/// Decodes `application/x-www-form-urlencoded`; later duplicates win.
pub(super) fn parse_form(raw: &str) -> HashMap<String, String> {
    form_urlencoded::parse(raw.as_bytes()).into_owned().collect()
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{provider}", get(redirect_get).post(redirect_post))
}
