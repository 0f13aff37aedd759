//! Client capability contract.
//!
//! Defines the [`ImClient`] trait implemented once per provider, the
//! [`Provider`] identifier, and the [`ImError`] taxonomy every adapter
//! normalizes its failures into.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::directory::{Department, User};
use crate::message::{Message, MessageType};
use crate::transport::TransportError;

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Enterprise messaging platform an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// WeCom (WeChat Work).
    WeCom,
    /// DingTalk.
    DingTalk,
    /// Feishu (Lark).
    Feishu,
}

impl Provider {
    /// Lowercase identifier used in config and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WeCom => "wecom",
            Self::DingTalk => "dingtalk",
            Self::Feishu => "feishu",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wecom" => Ok(Self::WeCom),
            "dingtalk" => Ok(Self::DingTalk),
            "feishu" | "lark" => Ok(Self::Feishu),
            other => Err(format!(
                "unknown provider: {other:?}, expected wecom, dingtalk or feishu"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by provider adapters.
#[derive(Debug, thiserror::Error)]
pub enum ImError {
    /// Connection, timeout, HTTP status or decode failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The auth endpoint refused the stored credentials.
    #[error("{provider} auth failed with code {code}: {message}")]
    Auth {
        /// Provider that rejected the credentials.
        provider: Provider,
        /// Provider error code.
        code: i64,
        /// Provider error message.
        message: String,
    },
    /// Declared message type and content payload disagree.
    #[error("message content does not match declared type {expected}")]
    ContentMismatch {
        /// The type the content was declared as.
        expected: MessageType,
    },
    /// The provider adapter does not implement this message type.
    #[error("message type {msg_type} is not supported by {provider}")]
    UnsupportedType {
        /// Requested message type.
        msg_type: MessageType,
        /// Provider lacking support.
        provider: Provider,
    },
    /// A business endpoint returned a nonzero error code.
    #[error("{provider} returned error code {code}: {message}")]
    Upstream {
        /// Provider that reported the error.
        provider: Provider,
        /// Provider error code.
        code: i64,
        /// Provider error message.
        message: String,
    },
    /// `send_message` was called without any user recipients.
    #[error("{provider} requires at least one recipient user ID")]
    NoRecipients {
        /// Provider the send was addressed to.
        provider: Provider,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Uniform messaging and directory contract.
///
/// Each provider adapter implements this independently. Implementations are
/// `Send + Sync` so one adapter can be shared across tasks behind an `Arc`.
#[async_trait]
pub trait ImClient: Send + Sync {
    /// Send `msg` to the given users and departments.
    ///
    /// # Errors
    ///
    /// Returns [`ImError::NoRecipients`] when `to_user_ids` is empty,
    /// [`ImError::UnsupportedType`] when the provider cannot carry the message,
    /// and auth, transport or upstream errors from the underlying calls.
    async fn send_message(
        &self,
        to_user_ids: &[String],
        to_dept_ids: &[String],
        msg: &Message,
    ) -> Result<(), ImError>;

    /// List departments from a single call to the provider.
    ///
    /// # Errors
    ///
    /// Returns auth, transport or upstream errors. No partial results.
    async fn get_departments(&self) -> Result<Vec<Department>, ImError>;

    /// List users of the root department (first page only).
    ///
    /// # Errors
    ///
    /// Returns auth, transport or upstream errors. No partial results.
    async fn get_users(&self) -> Result<Vec<User>, ImError>;

    /// The provider this client talks to.
    fn provider(&self) -> Provider;
}

/// Reject an empty recipient list before any network traffic.
pub(crate) fn require_recipients(provider: Provider, to_user_ids: &[String]) -> Result<(), ImError> {
    if to_user_ids.is_empty() {
        return Err(ImError::NoRecipients { provider });
    }
    Ok(())
}

/// Map a provider envelope code to `Ok` or [`ImError::Upstream`].
pub(crate) fn check_upstream(provider: Provider, code: i64, message: String) -> Result<(), ImError> {
    if code != 0 {
        return Err(ImError::Upstream {
            provider,
            code,
            message,
        });
    }
    Ok(())
}

/// Map an auth envelope code to `Ok` or [`ImError::Auth`].
pub(crate) fn check_auth(provider: Provider, code: i64, message: String) -> Result<(), ImError> {
    if code != 0 {
        return Err(ImError::Auth {
            provider,
            code,
            message,
        });
    }
    Ok(())
}
