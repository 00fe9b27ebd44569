use anyhow::anyhow;
use reqwest::StatusCode;
use serde::Deserialize;
use std::error::Error as StdError;
use std::io::ErrorKind;

use crate::config::API_KEY_VARS;

/// `{"error": {"message": ...}}`, the error body OpenAI-compatible servers send.
#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

/// The `error` object, also sent as a `data:` event when a stream fails midway.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

/// True when any error in the chain is an io error of `kind` or mentions
/// `needle` in its message.
fn chain_matches(err: &(dyn StdError + 'static), kind: ErrorKind, needle: &str) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }
        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }
        current = source.source();
    }
    false
}

fn is_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    chain_matches(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    chain_matches(err, ErrorKind::TimedOut, "timed out")
}

/// Maps a transport failure to a message naming the setting to check.
pub(crate) fn model_api_request_error(
    err: reqwest::Error,
    api_url: &str,
    timeout_secs: u64,
) -> anyhow::Error {
    if err.is_timeout() || is_timeout(&err) {
        anyhow!(
            "Chat completion request to '{api_url}' timed out after {timeout_secs}s. \
             Raise MODEL_TIMEOUT_SECS or try a smaller prompt."
        )
    } else if err.is_connect() && is_connection_refused(&err) {
        anyhow!(
            "Connection refused by chat completion endpoint '{api_url}'. \
             Check that MODEL_BASE_URL points at a running server."
        )
    } else if err.is_connect() {
        anyhow!(
            "Could not reach chat completion endpoint '{api_url}'. \
             Check MODEL_BASE_URL and network connectivity."
        )
    } else {
        anyhow!("Chat completion request to '{api_url}' failed: {err}")
    }
}

/// Maps a non-success response to an error carrying the server's message.
pub(crate) fn model_api_status_error(status: StatusCode, body: &str) -> anyhow::Error {
    let detail = api_error_message(body).unwrap_or_else(|| body.trim().to_string());
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return anyhow!(
            "Model request failed with status {}: {}. \
             Check that {} holds a valid API key for MODEL_BASE_URL.",
            status,
            detail.trim_end_matches('.'),
            API_KEY_VARS.join(" / ")
        );
    }

    anyhow!("Model request failed with status {}: {}", status, detail)
}

/// Maps an error event received after the response started streaming.
pub(crate) fn model_api_stream_error(body: ApiErrorBody) -> anyhow::Error {
    let message = body.message.trim();
    if message.is_empty() {
        anyhow!("Model stream failed with an error event")
    } else {
        anyhow!("Model stream failed: {message}")
    }
}

fn api_error_message(body: &str) -> Option<String> {
    let parsed: ApiErrorEnvelope = serde_json::from_str(body).ok()?;
    let message = parsed.error.message.trim();
    (!message.is_empty()).then(|| message.to_string())
}
