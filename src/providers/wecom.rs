//! WeCom (WeChat Work) adapter using the `cgi-bin` API.
//!
//! Supports every [`MessageType`]. Users are listed from the root department
//! with `fetch_child=1`; the listing is not paginated.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::client::{check_auth, check_upstream, require_recipients, ImClient, ImError, Provider};
use crate::directory::{stringify_dept_ids, Department, User};
use crate::message::Message;
use crate::token::{IssuedToken, TokenCache};
use crate::transport::{decode, endpoint, null_as_default, HttpTransport};

/// Default WeCom API base URL.
pub const WECOM_API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin";

const ROOT_DEPARTMENT_ID: &str = "1";

/// Business-call codes meaning the access token was rejected:
/// `40014` invalid token, `42001` expired token.
const TOKEN_REJECTED_CODES: [i64; 2] = [40014, 42001];

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `gettoken` response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WeComTokenResponse {
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

/// Bare status envelope returned by `message/send`.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WeComStatus {
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
pub struct WeComDepartmentList {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
    /// Departments in provider order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: Vec<WeComDepartment>,
}

/// A department record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WeComDepartment {
    /// Department ID.
    pub id: i64,
    /// Department name.
    #[serde(default)]
    pub name: String,
    /// Parent department ID.
    #[serde(default)]
    pub parentid: i64,
}

/// `user/list` response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WeComUserList {
    /// Error code, `0` on success.
    #[serde(default)]
    pub errcode: i64,
    /// Error message.
    #[serde(default, deserialize_with = "null_as_default")]
    pub errmsg: String,
    /// Users in provider order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub userlist: Vec<WeComUser>,
}

/// A user record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct WeComUser {
    /// User ID.
    pub userid: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Department memberships.
    #[serde(default, deserialize_with = "null_as_default")]
    pub department: Vec<i64>,
}

// ---------------------------------------------------------------------------
// Encoding / normalization (pub for integration testing)
// ---------------------------------------------------------------------------

/// Encode the type-specific part of a `message/send` body.
///
/// Returns a single-entry object keyed by the message type, e.g.
/// `{"text": {"content": "..."}}`.
#[doc(hidden)]
pub fn encode_message(msg: &Message) -> Map<String, Value> {
    let (key, value) = match msg {
        Message::Text(text) => ("text", json!({ "content": text })),
        Message::Image(img) => ("image", json!({ "media_id": img.media_id })),
        Message::Voice(voice) => ("voice", json!({ "media_id": voice.media_id })),
        Message::Video(video) => (
            "video",
            json!({
                "media_id": video.media_id,
                "title": video.title,
                "description": video.description,
            }),
        ),
        Message::File(file) => ("file", json!({ "media_id": file.media_id })),
        Message::TextCard(card) => (
            "textcard",
            json!({
                "title": card.title,
                "description": card.description,
                "url": card.url,
                "btntxt": card.button_text,
            }),
        ),
        Message::News(news) => {
            let articles: Vec<Value> = news
                .articles
                .iter()
                .map(|art| {
                    json!({
                        "title": art.title,
                        "description": art.description,
                        "url": art.url,
                        "picurl": art.pic_url,
                    })
                })
                .collect();
            ("news", json!({ "articles": articles }))
        }
        Message::Markdown(md) => ("markdown", json!({ "content": md.content })),
    };
    let mut payload = Map::new();
    payload.insert(key.to_owned(), value);
    payload
}

/// Build the full `message/send` body.
#[doc(hidden)]
pub fn build_send_body(to_user_ids: &[String], to_dept_ids: &[String], msg: &Message) -> Value {
    let mut body = Map::new();
    body.insert("touser".to_owned(), Value::String(to_user_ids.join("|")));
    body.insert("toparty".to_owned(), Value::String(to_dept_ids.join("|")));
    body.insert(
        "msgtype".to_owned(),
        Value::String(msg.message_type().as_str().to_owned()),
    );
    body.extend(encode_message(msg));
    Value::Object(body)
}

/// Map a `department/list` response to canonical departments.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_departments(resp: WeComDepartmentList) -> Result<Vec<Department>, ImError> {
    check_upstream(Provider::WeCom, resp.errcode, resp.errmsg)?;
    Ok(resp
        .department
        .into_iter()
        .map(|d| Department {
            id: d.id,
            name: d.name,
        })
        .collect())
}

/// Map a `user/list` response to canonical users.
///
/// # Errors
///
/// Returns [`ImError::Upstream`] when the envelope reports an error.
#[doc(hidden)]
pub fn normalize_users(resp: WeComUserList) -> Result<Vec<User>, ImError> {
    check_upstream(Provider::WeCom, resp.errcode, resp.errmsg)?;
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

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// WeCom adapter authenticated with a corp ID and app secret.
pub struct WeComClient {
    corp_id: String,
    corp_secret: String,
    api_base: String,
    transport: HttpTransport,
    tokens: TokenCache,
}

impl std::fmt::Debug for WeComClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeComClient")
            .field("corp_id", &self.corp_id)
            .field("corp_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl WeComClient {
    /// Create a client for the public WeCom API.
    pub fn new(corp_id: impl Into<String>, corp_secret: impl Into<String>) -> Self {
        Self {
            corp_id: corp_id.into(),
            corp_secret: corp_secret.into(),
            api_base: WECOM_API_BASE.to_owned(),
            transport: HttpTransport::new(),
            tokens: TokenCache::new(Provider::WeCom),
        }
    }

    /// Point the client at a different API base (private deployment, test server).
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
                ("corpid", self.corp_id.as_str()),
                ("corpsecret", self.corp_secret.as_str()),
            ],
        )?;
        let resp: WeComTokenResponse = decode(&self.transport.get(&url, None).await?)?;
        check_auth(Provider::WeCom, resp.errcode, resp.errmsg)?;
        Ok(IssuedToken {
            value: resp.access_token,
            ttl_secs: resp.expires_in,
        })
    }

    /// Drop the cached token when a business call reports it rejected, so the
    /// next operation fetches a fresh one.
    async fn discard_rejected_token(&self, code: i64) {
        if TOKEN_REJECTED_CODES.contains(&code) {
            warn!(code, "wecom rejected the cached access token; clearing it");
            self.tokens.clear().await;
        }
    }
}

#[async_trait]
impl ImClient for WeComClient {
    async fn send_message(
        &self,
        to_user_ids: &[String],
        to_dept_ids: &[String],
        msg: &Message,
    ) -> Result<(), ImError> {
        require_recipients(Provider::WeCom, to_user_ids)?;
        let body = build_send_body(to_user_ids, to_dept_ids, msg);

        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "message/send",
            &[("access_token", token.as_str())],
        )?;
        let resp: WeComStatus = decode(&self.transport.post_json(&url, &body, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        check_upstream(Provider::WeCom, resp.errcode, resp.errmsg)?;

        debug!(
            msg_type = %msg.message_type(),
            users = to_user_ids.len(),
            departments = to_dept_ids.len(),
            "wecom message sent"
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
        let resp: WeComDepartmentList = decode(&self.transport.get(&url, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        normalize_departments(resp)
    }

    async fn get_users(&self) -> Result<Vec<User>, ImError> {
        let token = self.access_token().await?;
        let url = endpoint(
            &self.api_base,
            "user/list",
            &[
                ("access_token", token.as_str()),
                ("department_id", ROOT_DEPARTMENT_ID),
                ("fetch_child", "1"),
            ],
        )?;
        let resp: WeComUserList = decode(&self.transport.get(&url, None).await?)?;
        self.discard_rejected_token(resp.errcode).await;
        normalize_users(resp)
    }

    fn provider(&self) -> Provider {
        Provider::WeCom
    }
}
