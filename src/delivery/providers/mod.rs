pub mod clubkonnect;
pub mod hubnet;
pub mod vtpass;

pub use clubkonnect::ClubKonnectProvider;
pub use hubnet::HubnetProvider;
pub use vtpass::VtPassProvider;

use reqwest::{Client, Response, Url};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use std::time::Duration;

use crate::delivery::error::{DeliveryError, DeliveryResultOf};

// ---------------------------------------------------------------------------
// Shared HTTP plumbing for the VTU adapters
// ---------------------------------------------------------------------------

pub(crate) fn http_client(provider: &str, timeout: Duration) -> DeliveryResultOf<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeliveryError::Configuration(format!("{} HTTP client: {}", provider, e)))
}

pub(crate) fn url_with_params(
    provider: &str,
    url: &str,
    params: &[(&str, &str)],
) -> DeliveryResultOf<Url> {
    Url::parse_with_params(url, params)
        .map_err(|e| DeliveryError::Configuration(format!("{} URL {}: {}", provider, url, e)))
}

/// Turn a raw reqwest outcome into the provider's JSON body.
///
/// Non-2xx answers become `Rejected` carrying the provider message, so the
/// gateway can keep the body for audit.
pub(crate) async fn read_json(
    provider: &str,
    timeout: Duration,
    sent: Result<Response, reqwest::Error>,
) -> DeliveryResultOf<JsonValue> {
    let response = sent.map_err(|e| {
        if e.is_timeout() {
            DeliveryError::Timeout {
                provider: provider.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else {
            DeliveryError::Transport {
                provider: provider.to_string(),
                message: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| DeliveryError::Transport {
        provider: provider.to_string(),
        message: format!("failed to read body: {}", e),
    })?;
    let parsed = serde_json::from_str::<JsonValue>(&text);

    if !status.is_success() {
        let body = parsed.unwrap_or_else(|_| serde_json::json!({ "body": text }));
        let message = str_field(&body, &["message"]).unwrap_or_else(|| format!("HTTP {}", status));
        return Err(DeliveryError::Rejected {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
            body,
        });
    }

    parsed.map_err(|e| DeliveryError::InvalidResponse {
        provider: provider.to_string(),
        message: e.to_string(),
    })
}

/// String or number at `path`, rendered as a string
pub(crate) fn str_field(value: &JsonValue, path: &[&str]) -> Option<String> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    match current {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Balances arrive as strings or numbers; unreadable values count as zero
pub(crate) fn decimal_field(value: &JsonValue, path: &[&str]) -> Decimal {
    str_field(value, path)
        .and_then(|raw| Decimal::from_str(raw.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}
