//! DingTalk adapter using the `oapi.dingtalk.com` API.
//!
//! Work notifications go through `asyncsend_v2` and carry only `text` and
//! `image` messages. The user listing reads the first 100 members of the
//! root department.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::{check_auth, check_upstream, require_recipients, ImClient, ImError, Provider};
use crate::directory::{stringify_dept_ids, Department, User};
use crate::message::Message;
use crate::token::{IssuedToken, TokenCache};
use crate::transport::{decode, endpoint, null_as_default, HttpTransport};

/// Default DingTalk API base URL.
pub const DINGTALK_API_BASE: &str = "https://oapi.dingtalk.com";

const ROOT_DEPARTMENT_ID: &str = "1";
const USER_PAGE_SIZE: &str = "100";

/// Business-call codes meaning the access token was rejected:
/// `40014` invalid token, `42001` expired token.
const TOKEN_REJECTED_CODES: [i64; 2] = [40014, 42001];

/// `gettoken` response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkTokenResponse {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
    /// Issued access token.
    #[serde(default)]
    pub access_token: String,
    /// Token lifetime in seconds.
    #[serde(default)]
    pub expires_in: i64,
}

/// Status envelope returned by `asyncsend_v2`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkStatus {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
}

/// `department/list` response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkDepartmentList {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
    /// Departments in provider order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: Vec<DingTalkDepartment>,
}

/// A department record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkDepartment {
    /// Department ID.
    pub id: i64,
    /// Department name.
    #[serde(default)]
    pub name: String,
    /// Parent department ID.
    #[serde(default)]
    pub parentid: i64,
}

/// `user/listbypage` response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkUserPage {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
    /// Users on this page.
    #[serde(default, deserialize_with = "null_as_default")]
    pub userlist: Vec<DingTalkUser>,
}

/// A user record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct DingTalkUser {
    /// User ID.
    pub userid: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Department memberships.
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: Vec<i64>,
}

/// Encode the `msg` object of an `asyncsend_v2` body.
///
/// # Errors
///
/// Returns [`ImError::UnsupportedType`] for anything but text and image.
#[doc(hidden)]
pub fn encode_message(msg: &Message) -> Result<Value, ImError> {
    match msg {
        Message::Text(text) => Ok(json!({
            "msgtype": "text",
            "text": { "content": text },
        })),
        Message::Image(img) => Ok(json!({
            "msgtype": "image",
            "image": { "media_id": img.media_id },
        })),
        other => Err(ImError::UnsupportedType {
            msg_type: other.message_type(),
            provider: Provider::DingTalk,
        }),
    }
}

/// Build the full `asyncsend_v2` body.
///
/// # Errors
///
/// Returns [`ImError::UnsupportedType`] for anything but text and image.
#[doc(hidden)]
pub fn build_send_body(agent_id: i64, to_user_ids: &[String], msg: &Message) -> Result<Value, ImError> {
    Ok(json!({
        "agent_id": agent_id,
        "userid_list": to_user_ids.join(","),
        "msg": encode_message(msg)?,
    }))
}

/// Map a `department/list` response to canonical departments.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_departments(resp: DingTalkDepartmentList) -> Result<Vec<Department>, ImError> {
    check_upstream(Provider::DingTalk, resp.errcode, resp.errmsg)?;
    Ok(resp
        .department
        .into_iter()
        .map(|d| Department {
            id: d.id,
            name: d.name,
        })
        .collect())
}

/// Map a `user/listbypage` response to canonical users.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_users(resp: DingTalkUserPage) -> Result<Vec<User>, ImError> {
    check_upstream(Provider::DingTalk, resp.errcode, resp.errmsg)?;
    Ok(resp
        .userlist
        .into_iter()
        .map(|u| User {
            dept_ids: stringify_dept_ids(&u.department),
            id: u.userid,
            name: u.name,
            phone: None,
        })
        .collect())
}

/// DingTalk adapter authenticated with an app key and secret.
pub struct DingTalkClient {
    app_key: String,
    app_secret: String,
    agent_id: i64,
    api_base: String,
    transport: HttpTransport,
    tokens: TokenCache,
}

impl std::fmt::Debug for DingTalkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DingTalkClient")
            .field("app_key", &self.app_key)
            .field("app_secret", &"[REDACTED]")
            .field("agent_id", &self.agent_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl DingTalkClient {
    /// Create a client for the public DingTalk API.
    ///
    /// `agent_id` identifies the micro-app that work notifications are sent from.
    pub fn new(app_key: impl Into<String>, app_secret: impl Into<String>, agent_id: i64) -> Self {
        Self {
            app_key: app_key.into(),
            app_secret: app_secret.into(),
            agent_id,
            api_base: DINGTALK_API_BASE.to_owned(),
            transport: HttpTransport::new(),
            tokens: TokenCache::new(Provider::DingTalk),
        }
    }

    /// Point the client at a different API base.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// The client's token cache.
    pub fn tokens(&self) -> &TokenCache {
        &self.tokens
    }

    /// Return a valid access token, refreshing it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ImError::Auth`] when `gettoken` reports an error, or a
    /// transport error.
    pub async fn access_token(&self) -> Result<String, ImError> {
        self.tokens.get_or_refresh(|| self.fetch_token()).await
    }

    async fn fetch_token(&self) -> Result<IssuedToken, ImError> {
        let url = endpoint(
            &self.api_base,
            "gettoken",
            &[
                ("appkey", self.app_key.as_str()),
                ("appsecret", self.app_secret.as_str()),
            ],
        )?;
        let resp: DingTalkTokenResponse = decode(&self.transport.get(&url, None).await?)?;
        check_auth(Provider::DingTalk, resp.errcode, resp.errmsg)?;
        Ok(IssuedToken {
            value: resp.access_token,
            ttl_secs: resp.expires_in,
        })
    }

    /// Drop the cached token when a business call reports it rejected, so the
    /// next operation fetches a fresh one.
    async fn discard_rejected_token(&self, code: i64) {
        if TOKEN_REJECTED_CODES.contains(&code) {
            warn!(code, "dingtalk rejected the cached access token; clearing it");
            self.tokens.clear().await;
        }
    }
}

#[async_trait]
impl ImClient for DingTalkClient {
    async fn send_message(
        &self,
        to_user_ids: &[String],
        to_dept_ids: &[String],
        msg: &Message,
    ) -> Result<(), ImError> {
        require_recipients(Provider::DingTalk, to_user_ids)?;
        if !to_dept_ids.is_empty() {
            debug!(
                departments = to_dept_ids.len(),
                "dingtalk work notifications ignore department recipients"
            );
        }
        let body = build_send_body(self.agent_id, to_user_ids, msg)?;

        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "topapi/message/corpconversation/asyncsend_v2",
            &[("access_token", token.as_str())],
        )?;
        let resp: DingTalkStatus = decode(&self.transport.post_json(&url, &body, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        check_upstream(Provider::DingTalk, resp.errcode, resp.errmsg)?;

        debug!(
            msg_type = %msg.message_type(),
            users = to_user_ids.len(),
            "dingtalk message sent"
        );
        Ok(())
    }

    async fn get_departments(&self) -> Result<Vec<Department>, ImError> {
        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "department/list",
            &[("access_token", token.as_str())],
        )?;
        let resp: DingTalkDepartmentList = decode(&self.transport.get(&url, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        normalize_departments(resp)
    }

    async fn get_users(&self) -> Result<Vec<User>, ImError> {
        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "user/listbypage",
            &[
                ("access_token", token.as_str()),
                ("department_id", ROOT_DEPARTMENT_ID),
                ("offset", "0"),
                ("size", USER_PAGE_SIZE),
            ],
        )?;
        let resp: DingTalkUserPage = decode(&self.transport.get(&url, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        normalize_users(resp)
    }

    fn provider(&self) -> Provider {
        Provider::DingTalk
    }
}
