//! Feishu (Lark) adapter using the `open-apis` API with a tenant access token.
//!
//! Feishu sends to one user at a time: only the first user ID is used and
//! department recipients are ignored. Only `text` and `image` are encoded.
//! Department IDs are strings on the wire and are parsed into the numeric
//! canonical form; non-numeric IDs become `0` with a warning.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::{check_auth, check_upstream, ImClient, ImError, Provider};
use crate::directory::{parse_department_id, Department, User};
use crate::message::Message;
use crate::token::{IssuedToken, TokenCache};
use crate::transport::{decode, endpoint, null_as_default, HttpTransport};

/// Default Feishu API base URL.
pub const FEISHU_API_BASE: &str = "https://open.feishu.cn/open-apis";

const TENANT_TOKEN_PATH: &str = "auth/v3/tenant_access_token/internal/";
const USER_PAGE_SIZE: &str = "100";

/// Business-call codes meaning the access token was rejected:
/// `99991663` invalid tenant token, `99991668` invalid user token.
const TOKEN_REJECTED_CODES: [i64; 2] = [99991663, 99991668];

/// Tenant token request body.
#[doc(hidden)]
#[derive(Serialize)]
pub struct FeishuTokenRequest<'a> {
    /// App ID.
    pub app_id: &'a str,
    /// App secret.
    pub app_secret: &'a str,
}

/// Tenant token response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct FeishuTokenResponse {
    /// Error code, `0` on success.
    #[serde(default)]
    pub code: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
    /// Issued tenant access token.
    #[serde(default)]
    pub tenant_access_token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expire: i64,
}

/// Envelope returned by `message/v4/send/`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct FeishuStatus {
    /// Error code, `0` on success.
    #[serde(default)]
    pub code: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
    /// Provider payload, unused.
    #[serde(default)]
    pub data: Value,
}

/// Generic `{code, msg, data: {items}}` list envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct FeishuList<T> {
    /// Error code, `0` on success.
    #[serde(default)]
    pub code: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg: String,
    /// List payload.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: FeishuItems<T>,
}

/// The `data` object of a list envelope.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct FeishuItems<T> {
    /// Items in provider order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<T>,
}

impl<T> Default for FeishuItems<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

/// A department record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct FeishuDepartment {
    /// String department ID.
    pub department_id: String,
    /// Department name.
    #[serde(default)]
    pub name: String,
}

/// A user record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct FeishuUser {
    /// User ID.
    pub user_id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Department memberships.
    #[serde(default, deserialize_with = "null_as_default")]
    pub department_ids: Vec<String>,
}

/// Encode the `content` object of a `message/v4/send/` body.
///
/// # Errors
///
/// Returns [`ImError::UnsupportedType`] for anything but text and image.
#[doc(hidden)]
pub fn encode_message(msg: &Message) -> Result<Value, ImError> {
    match msg {
        Message::Text(text) => Ok(json!({ "text": text })),
        Message::Image(img) => Ok(json!({ "image_key": img.media_id })),
        other => Err(ImError::UnsupportedType {
            msg_type: other.message_type(),
            provider: Provider::Feishu,
        }),
    }
}

/// Build the full `message/v4/send/` body for a single recipient.
///
/// # Errors
///
/// Returns [`ImError::UnsupportedType`] for anything but text and image.
#[doc(hidden)]
pub fn build_send_body(user_id: &str, msg: &Message) -> Result<Value, ImError> {
    Ok(json!({
        "user_id": user_id,
        "msg_type": msg.message_type().as_str(),
        "content": encode_message(msg)?,
    }))
}

/// Map a department listing to canonical departments.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_departments(resp: FeishuList<FeishuDepartment>) -> Result<Vec<Department>, ImError> {
    check_upstream(Provider::Feishu, resp.code, resp.msg)?;
    Ok(resp
        .data
        .items
        .into_iter()
        .map(|d| Department {
            id: parse_department_id(Provider::Feishu, &d.department_id),
            name: d.name,
        })
        .collect())
}

/// Map a user listing to canonical users.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_users(resp: FeishuList<FeishuUser>) -> Result<Vec<User>, ImError> {
    check_upstream(Provider::Feishu, resp.code, resp.msg)?;
    Ok(resp
        .data
        .items
        .into_iter()
        .map(|u| User {
            id: u.user_id,
            name: u.name,
            phone: None,
            dept_ids: u.department_ids,
        })
        .collect())
}

/// Feishu adapter authenticated with an app ID and secret.
pub struct FeishuClient {
    app_id: String,
    app_secret: String,
    api_base: String,
    transport: HttpTransport,
    tokens: TokenCache,
}

impl std::fmt::Debug for FeishuClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeishuClient")
            .field("app_id", &self.app_id)
            .field("app_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl FeishuClient {
    /// Create a client for the public Feishu API.
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
            api_base: FEISHU_API_BASE.to_owned(),
            transport: HttpTransport::new(),
            tokens: TokenCache::new(Provider::Feishu),
        }
    }

    /// Point the client at a different API base (e.g. Lark international).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// The client's token cache.
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Return a valid tenant access token, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ImError::Auth`] when the token endpoint reports an error, or
    /// a transport error.
    pub async fn access_token(&self) -> Result<String, ImError> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<IssuedToken, ImError> {
        let url = endpoint(&self.api_base, TENANT_TOKEN_PATH, &[])?;
        let body = FeishuTokenRequest {
            app_id: &self.app_id,
            app_secret: &self.app_secret,
        };
        let resp: FeishuTokenResponse = decode(&self.transport.post_json(&url, &body, None).await?)?;
        check_auth(Provider::Feishu, resp.code, resp.msg)?;
        Ok(IssuedToken {
            value: resp.tenant_access_token,
            ttl_secs: resp.expire,
        })
    }

    /// Drop the cached token when a business call reports it rejected, so the
    /// next operation fetches a fresh one.
    async fn discard_rejected_token(&self, code: i64) {
        if TOKEN_REJECTED_CODES.contains(&code) {
            warn!(code, "feishu rejected the cached access token; clearing it");
            self.tokens.clear().await;
        }
    }
}

#[async_trait]
impl ImClient for FeishuClient {
    async fn send_message(
        &self,
        to_user_ids: &[String],
        to_dept_ids: &[String],
        msg: &Message,
    ) -> Result<(), ImError> {
        let Some(user_id) = to_user_ids.first() else {
            return Err(ImError::NoRecipients {
                provider: Provider::Feishu,
            });
        };
        if to_user_ids.len() > 1 || !to_dept_ids.is_empty() {
            warn!(
                dropped_users = to_user_ids.len().saturating_sub(1),
                dropped_departments = to_dept_ids.len(),
                "feishu sends to a single user; extra recipients ignored"
            );
        }
        let body = build_send_body(user_id, msg)?;

        let token = self.access_token().await?;
        let url = endpoint(&self.api_base, "message/v4/send/", &[])?;
        let resp: FeishuStatus = decode(
            &self
                .transport
                .post_json(&url, &body, Some(token.as_str()))
                .await?,
        )?;
        self.discard_rejected_token(resp.code).await;
        check_upstream(Provider::Feishu, resp.code, resp.msg)?;

        debug!(msg_type = %msg.message_type(), "feishu message sent");
        Ok(())
    }

    async fn get_departments(&self) -> Result<Vec<Department>, ImError> {
        let token = self.access_token().await?;
        let url = endpoint(&self.api_base, "contact/v3/departments", &[])?;
        let resp: FeishuList<FeishuDepartment> =
            decode(&self.transport.get(&url, Some(token.as_str())).await?)?;
        self.discard_rejected_token(resp.code).await;
        normalize_departments(resp)
    }

    async fn get_users(&self) -> Result<Vec<User>, ImError> {
        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "contact/v3/users",
            &[("page_size", USER_PAGE_SIZE)],
        )?;
        let resp: FeishuList<FeishuUser> =
            decode(&self.transport.get(&url, Some(token.as_str())).await?)?;
        self.discard_rejected_token(resp.code).await;
        normalize_users(resp)
    }

    fn provider(&self) -> Provider {
        Provider::Feishu
    }
}
