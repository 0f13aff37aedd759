//! Webhook relay server.
//!
//! Registers ephemeral hooks that forward whatever is posted to them to a
//! target URL, keeping a short newest-first log of deliveries per hook.
//! Hooks live in memory only and vanish when the process exits.
//!
//! Routes:
//! - `GET /`: usage text
//! - `POST /create`: form field `target_url`, returns the new hook's paths
//! - `ANY /hook/{id}`: forward the request body to the hook's target
//! - `GET /logs/{id}`: delivery log as JSON

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::transport::REQUEST_TIMEOUT;

/// Status recorded when the target could not be reached at all.
pub const FORWARD_FAILED_STATUS: u16 = 500;

const USAGE: &str = "imbridge webhook relay\n\n\
POST /create   (form: target_url)  register a hook\n\
ANY  /hook/ID                      forward the body to the hook target\n\
GET  /logs/ID                      recent deliveries, newest first\n";

/// One forwarded delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the delivery was received.
    pub timestamp: DateTime<Utc>,
    /// Raw request body, lossily decoded as UTF-8.
    pub body: String,
    /// Status returned by the target, or [`FORWARD_FAILED_STATUS`].
    pub status_code: u16,
}

#[derive(Debug)]
struct Hook {
    target_url: String,
    logs: VecDeque<LogEntry>,
}

/// Response body of `POST /create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedHook {
    /// Hook ID.
    pub id: String,
    /// Path that forwards to the target.
    pub hook_path: String,
    /// Path serving the delivery log.
    pub logs_path: String,
}

/// Shared relay state: the hook registry plus an outbound HTTP client.
#[derive(Debug)]
pub struct RelayState {
    hooks: RwLock<HashMap<String, Hook>>,
    client: reqwest::Client,
    max_log_entries: usize,
}

impl RelayState {
    /// Empty registry keeping at most `max_log_entries` deliveries per hook.
    pub fn new(max_log_entries: usize) -> Self {
        Self {
            hooks: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
            max_log_entries,
        }
    }

    /// Register a hook forwarding to `target_url` and return its ID.
    pub async fn register(&self, target_url: &str) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.hooks.write().await.insert(
            id.clone(),
            Hook {
                target_url: target_url.to_owned(),
                logs: VecDeque::new(),
            },
        );
        id
    }

    /// Delivery log for a hook, newest first. `None` for unknown IDs.
    pub async fn logs(&self, id: &str) -> Option<Vec<LogEntry>> {
        self.hooks
            .read()
            .await
            .get(id)
            .map(|hook| hook.logs.iter().cloned().collect())
    }

    async fn target(&self, id: &str) -> Option<String> {
        self.hooks
            .read()
            .await
            .get(id)
            .map(|hook| hook.target_url.clone())
    }

    async fn record(&self, id: &str, entry: LogEntry) {
        let mut hooks = self.hooks.write().await;
        if let Some(hook) = hooks.get_mut(id) {
            hook.logs.push_front(entry);
            hook.logs.truncate(self.max_log_entries);
        }
    }

    async fn forward(&self, target_url: &str, body: Bytes) -> u16 {
        let sent = self
            .client
            .post(target_url)
            .timeout(REQUEST_TIMEOUT)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        match sent {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                warn!(error = %e.without_url(), "relay forward failed");
                FORWARD_FAILED_STATUS
            }
        }
    }
}

/// Build the relay router over shared state.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/create", post(create_hook))
        .route("/hook/{id}", any(forward_hook))
        .route("/logs/{id}", get(hook_logs))
        .with_state(state)
}

/// Bind `config.bind` and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(config: &RelayConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind relay on {}: {e}", config.bind))?;
    let state = Arc::new(RelayState::new(config.max_log_entries));
    info!(addr = %config.bind, "webhook relay listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("webhook relay stopped");
    Ok(())
}

async fn index() -> &'static str {
    USAGE
}

#[derive(Debug, Deserialize)]
struct CreateForm {
    #[serde(default)]
    target_url: String,
}

async fn create_hook(State(state): State<Arc<RelayState>>, Form(form): Form<CreateForm>) -> Response {
    let target = form.target_url.trim();
    if target.is_empty() {
        return (StatusCode::BAD_REQUEST, "target_url is required").into_response();
    }
    if let Err(e) = reqwest::Url::parse(target) {
        return (StatusCode::BAD_REQUEST, format!("invalid target_url: {e}")).into_response();
    }

    let id = state.register(target).await;
    info!(hook = %id, "webhook created");
    Json(CreatedHook {
        hook_path: format!("/hook/{id}"),
        logs_path: format!("/logs/{id}"),
        id,
    })
    .into_response()
}

async fn forward_hook(
    State(state): State<Arc<RelayState>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let Some(target) = state.target(&id).await else {
        return (StatusCode::NOT_FOUND, "webhook not found").into_response();
    };

    let logged_body = String::from_utf8_lossy(&body).into_owned();
    let status_code = state.forward(&target, body).await;
    state
        .record(
            &id,
            LogEntry {
                timestamp: Utc::now(),
                body: logged_body,
                status_code,
            },
        )
        .await;

    info!(hook = %id, status_code, "webhook forwarded");
    (
        StatusCode::OK,
        format!("forwarded, target status {status_code}"),
    )
        .into_response()
}

async fn hook_logs(State(state): State<Arc<RelayState>>, Path(id): Path<String>) -> Response {
    match state.logs(&id).await {
        Some(logs) => Json(logs).into_response(),
        None => (StatusCode::NOT_FOUND, "webhook not found").into_response(),
    }
}
