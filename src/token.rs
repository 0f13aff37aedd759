//! Per-adapter access token cache.
//!
//! A [`TokenCache`] is either empty/expired or holds a valid [`Token`]. The
//! check-refresh-store sequence runs under an async mutex, so callers racing
//! on an expired token share a single auth request instead of each issuing
//! their own. The lock is held only while a token is being obtained; business
//! calls made with the returned value proceed concurrently.

use std::future::Future;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::{ImError, Provider};

/// Seconds subtracted from the provider-reported TTL before a token is
/// considered expired.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// A bearer credential with its local expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Build a token that expires at `expires_at`.
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// The bearer value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// When the cache stops handing out this token.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Whether the token is non-empty and unexpired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.value.is_empty() && now < self.expires_at
    }
}

/// A token as returned by a provider's auth endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// The bearer value.
    pub value: String,
    /// Lifetime reported by the provider, in seconds.
    pub ttl_secs: i64,
}

impl std::fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedToken")
            .field("value", &"[REDACTED]")
            .field("ttl_secs", &self.ttl_secs)
            .finish()
    }
}

/// Local expiry for a token issued at `now` with a TTL of `ttl_secs`.
///
/// Equals `now + ttl_secs - REFRESH_MARGIN_SECS`. A TTL shorter than the
/// margin yields an expiry in the past, so the next call refreshes again.
pub fn expiry_from_ttl(now: DateTime<Utc>, ttl_secs: i64) -> DateTime<Utc> {
    TimeDelta::try_seconds(ttl_secs.saturating_sub(REFRESH_MARGIN_SECS))
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Serialized token cache owned by one adapter instance.
#[derive(Debug)]
pub struct TokenCache {
    provider: Provider,
    slot: Mutex<Option<Token>>,
}

impl TokenCache {
    /// Create an empty cache for `provider`.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            slot: Mutex::new(None),
        }
    }

    /// Return the cached token, or obtain a new one with `fetch`.
    ///
    /// `fetch` runs only when the cache is empty or expired, and at most one
    /// `fetch` is in flight per cache. On failure the cache is left unchanged.
    ///
    /// # Errors
    ///
    /// Propagates whatever `fetch` returns, typically [`ImError::Auth`] or
    /// [`ImError::Transport`].
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String, ImError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<IssuedToken, ImError>> + Send,
    {
        let mut slot = self.slot.lock().await;
        if let Some(token) = slot.as_ref() {
            if token.is_valid_at(Utc::now()) {
                debug!(provider = %self.provider, "using cached access token");
                return Ok(token.value.clone());
            }
        }

        let issued = fetch().await?;
        let expires_at = expiry_from_ttl(Utc::now(), issued.ttl_secs);
        info!(
            provider = %self.provider,
            ttl_secs = issued.ttl_secs,
            %expires_at,
            "access token refreshed"
        );
        let value = issued.value;
        *slot = Some(Token::new(value.clone(), expires_at));
        Ok(value)
    }

    /// Replace the cached token.
    pub async fn store(&self, token: Token) {
        *self.slot.lock().await = Some(token);
    }

    /// A copy of the cached token, valid or not.
    pub async fn current(&self) -> Option<Token> {
        self.slot.lock().await.clone()
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }
}
