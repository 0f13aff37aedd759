//! Webhook relay tests over a real listener.

use std::sync::Arc;

use tokio::net::TcpListener;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use imbridge::relay::{router, CreatedHook, LogEntry, RelayState, FORWARD_FAILED_STATUS};

async fn spawn_relay(max_log_entries: usize) -> String {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };
    let app = router(Arc::new(RelayState::new(max_log_entries)));
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn create_hook(http: &reqwest::Client, relay: &str, target: &str) -> CreatedHook {
    let response = http
        .post(format!("{relay}/create"))
        .form(&[("target_url", target)])
        .send()
        .await
        .expect("create should complete");
    assert_eq!(response.status(), 200);
    response.json().await.expect("create should return json")
}

async fn fetch_logs(http: &reqwest::Client, relay: &str, hook: &CreatedHook) -> Vec<LogEntry> {
    http.get(format!("{relay}{}", hook.logs_path))
        .send()
        .await
        .expect("logs should complete")
        .json()
        .await
        .expect("logs should be json")
}

#[tokio::test]
async fn forwards_body_and_records_status() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sink"))
        .and(body_string(r#"{"event":"push"}"#))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&target)
        .await;

    let relay = spawn_relay(10).await;
    let http = reqwest::Client::new();
    let hook = create_hook(&http, &relay, &format!("{}/sink", target.uri())).await;
    assert_eq!(hook.hook_path, format!("/hook/{}", hook.id));

    let reply = http
        .post(format!("{relay}{}", hook.hook_path))
        .body(r#"{"event":"push"}"#)
        .send()
        .await
        .expect("hook should complete");
    assert_eq!(reply.status(), 200);
    let text = reply.text().await.expect("reply should have text");
    assert!(text.contains("202"), "reply was {text}");

    let logs = fetch_logs(&http, &relay, &hook).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].body, r#"{"event":"push"}"#);
    assert_eq!(logs[0].status_code, 202);
}

#[tokio::test]
async fn logs_are_newest_first_and_capped() {
    let target = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&target)
        .await;

    let relay = spawn_relay(2).await;
    let http = reqwest::Client::new();
    let hook = create_hook(&http, &relay, &target.uri()).await;

    for n in 1..=3 {
        let reply = http
            .post(format!("{relay}{}", hook.hook_path))
            .body(n.to_string())
            .send()
            .await
            .expect("hook should complete");
        assert_eq!(reply.status(), 200);
    }

    let bodies: Vec<String> = fetch_logs(&http, &relay, &hook)
        .await
        .into_iter()
        .map(|entry| entry.body)
        .collect();
    assert_eq!(bodies, vec!["3", "2"]);
}

#[tokio::test]
async fn unreachable_target_is_logged_as_failure() {
    let relay = spawn_relay(10).await;
    let http = reqwest::Client::new();
    let hook = create_hook(&http, &relay, "http://127.0.0.1:9/down").await;

    let reply = http
        .post(format!("{relay}{}", hook.hook_path))
        .body("ping")
        .send()
        .await
        .expect("hook should complete");
    assert_eq!(reply.status(), 200);

    let logs = fetch_logs(&http, &relay, &hook).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status_code, FORWARD_FAILED_STATUS);
}

#[tokio::test]
async fn unknown_hook_is_not_found() {
    let relay = spawn_relay(10).await;
    let http = reqwest::Client::new();

    let hook = http
        .post(format!("{relay}/hook/does-not-exist"))
        .body("x")
        .send()
        .await
        .expect("request should complete");
    assert_eq!(hook.status(), 404);

    let logs = http
        .get(format!("{relay}/logs/does-not-exist"))
        .send()
        .await
        .expect("request should complete");
    assert_eq!(logs.status(), 404);
}

#[tokio::test]
async fn create_rejects_missing_or_invalid_target() {
    let relay = spawn_relay(10).await;
    let http = reqwest::Client::new();

    for target in ["", "   ", "not a url"] {
        let response = http
            .post(format!("{relay}/create"))
            .form(&[("target_url", target)])
            .send()
            .await
            .expect("request should complete");
        assert_eq!(response.status(), 400, "target {target:?}");
    }
}

#[tokio::test]
async fn index_describes_routes() {
    let relay = spawn_relay(10).await;
    let text = reqwest::get(format!("{relay}/"))
        .await
        .expect("request should complete")
        .text()
        .await
        .expect("index should have text");
    assert!(text.contains("/create"));
}

#[tokio::test]
async fn register_and_logs_work_without_http() {
    let state = RelayState::new(5);
    let id = state.register("http://127.0.0.1:9/").await;
    assert_eq!(state.logs(&id).await, Some(Vec::new()));
    assert_eq!(state.logs("missing").await, None);
}
