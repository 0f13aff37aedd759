//! JSON-over-HTTP helpers shared by all provider adapters.
//!
//! Every request carries a fixed [`REQUEST_TIMEOUT`] and is attempted exactly
//! once. Callers get the raw body back and decode it into their own envelope
//! type with [`decode`].

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

/// Timeout applied to every provider request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";
const MAX_ERROR_BODY_CHARS: usize = 256;

/// Transport-level failures.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failure or timeout.
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    /// Upstream responded with a non-success HTTP status.
    #[error("non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized, truncated response body.
        body: String,
    },
    /// Body did not match the expected envelope.
    #[error("response decode error: {0}")]
    Decode(String),
    /// Endpoint URL could not be built from the configured API base.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // Request URLs carry access tokens in their query strings.
        Self::Request(err.without_url())
    }
}

/// Thin JSON client with a fixed timeout and no retries.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a GET and return the response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on connection failure, timeout or non-2xx status.
    pub async fn get(&self, url: &str, bearer: Option<&str>) -> Result<String, TransportError> {
        let mut builder = self.client.get(url).timeout(REQUEST_TIMEOUT);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        check_http_response(response).await
    }

    /// Issue a JSON POST and return the response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] on serialization failure, connection failure,
    /// timeout or non-2xx status.
    pub async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        bearer: Option<&str>,
    ) -> Result<String, TransportError> {
        let payload =
            serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        let mut builder = self
            .client
            .post(url)
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(payload);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        check_http_response(response).await
    }
}

/// Join `base` and `path` and append URL-encoded query parameters.
///
/// # Errors
///
/// Returns [`TransportError::InvalidUrl`] when the result is not a valid URL.
pub fn endpoint(base: &str, path: &str, params: &[(&str, &str)]) -> Result<String, TransportError> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let parsed = if params.is_empty() {
        reqwest::Url::parse(&joined)
    } else {
        reqwest::Url::parse_with_params(&joined, params)
    };
    // Never echo the parameters: they include secrets.
    parsed
        .map(String::from)
        .map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
}

/// Decode a response body into a provider envelope.
///
/// # Errors
///
/// Returns [`TransportError::Decode`] when the body is not valid JSON of the
/// expected shape.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, TransportError> {
    serde_json::from_str(body).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Deserialize a field that providers may send as `null`, treating `null`
/// like an absent field.
///
/// Error envelopes often carry `null` payloads; they must still decode so the
/// envelope code can be checked.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `TransportError::Request` on transport failure, `TransportError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, TransportError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

fn secret_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"(access_token|tenant_access_token|corpsecret|appsecret|app_secret)(["']?\s*[=:]\s*["']?)[^&\s"',}]+"#,
            )
            .ok()
        })
        .as_ref()
}

/// Collapse whitespace, redact credentials and truncate an error body.
#[doc(hidden)]
pub fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let sanitized = match secret_pattern() {
        Some(regex) => regex
            .replace_all(&collapsed, "${1}${2}[REDACTED]")
            .into_owned(),
        None => collapsed,
    };

    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}
