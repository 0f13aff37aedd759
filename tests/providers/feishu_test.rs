//! Feishu adapter tests against a mock `open-apis` server.

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use imbridge::message::{Message, MessageType, VoiceContent};
use imbridge::providers::feishu::{build_send_body, FeishuClient};
use imbridge::token::{expiry_from_ttl, Token};
use imbridge::{Department, ImClient, ImError, Provider};

fn client_for(server: &MockServer) -> FeishuClient {
    FeishuClient::new("cli_app", "app-secret").with_api_base(server.uri())
}

async fn mount_token(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/v3/tenant_access_token/internal/"))
        .and(body_json(json!({"app_id": "cli_app", "app_secret": "app-secret"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "tenant_access_token": "t-abc",
            "expire": 7200
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_owned()).collect()
}

#[test]
fn image_uses_image_key() {
    let body = match build_send_body("ou_1", &Message::image("img_v2_1")) {
        Ok(body) => body,
        Err(err) => panic!("image should encode: {err}"),
    };
    assert_eq!(
        body,
        json!({
            "user_id": "ou_1",
            "msg_type": "image",
            "content": { "image_key": "img_v2_1" }
        })
    );
}

#[tokio::test]
async fn sends_to_first_recipient_only() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/message/v4/send/"))
        .and(header("authorization", "Bearer t-abc"))
        .and(body_json(json!({
            "user_id": "first",
            "msg_type": "text",
            "content": { "text": "hello" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "ok",
            "data": {"message_id": "om_1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sent = client_for(&server)
        .send_message(&ids(&["first", "second"]), &ids(&["d1"]), &Message::text("hello"))
        .await;
    assert!(sent.is_ok(), "send should succeed: {sent:?}");
}

#[tokio::test]
async fn voice_is_unsupported() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;

    let voice = Message::Voice(VoiceContent {
        media_id: "v-1".to_owned(),
        duration: 2,
    });
    let result = client_for(&server)
        .send_message(&ids(&["ou_1"]), &[], &voice)
        .await;
    assert!(matches!(
        result,
        Err(ImError::UnsupportedType {
            msg_type: MessageType::Voice,
            provider: Provider::Feishu,
        })
    ));
}

#[tokio::test]
async fn no_recipients_is_rejected() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;

    let result = client_for(&server)
        .send_message(&[], &[], &Message::text("hello"))
        .await;
    assert!(matches!(
        result,
        Err(ImError::NoRecipients {
            provider: Provider::Feishu
        })
    ));
}

#[tokio::test]
async fn string_department_ids_fall_back_to_zero() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/departments"))
        .and(header("authorization", "Bearer t-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msg": "success",
            "data": {"items": [
                {"department_id": "od-xxx", "name": "Sales"},
                {"department_id": "12", "name": "Ops"}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let departments = match client_for(&server).get_departments().await {
        Ok(departments) => departments,
        Err(err) => panic!("departments should load: {err}"),
    };
    assert_eq!(
        departments,
        vec![
            Department { id: 0, name: "Sales".to_owned() },
            Department { id: 12, name: "Ops".to_owned() },
        ]
    );
}

#[tokio::test]
async fn users_keep_string_department_ids() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/users"))
        .and(query_param("page_size", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"items": [
                {"user_id": "ou_7", "name": "Wang Wu", "department_ids": ["od-a", "od-b"]}
            ]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let users = match client_for(&server).get_users().await {
        Ok(users) => users,
        Err(err) => panic!("users should load: {err}"),
    };
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].dept_ids, vec!["od-a", "od-b"]);
    assert!(users[0].phone.is_none());
}

#[tokio::test]
async fn tenant_token_error_is_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/v3/tenant_access_token/internal/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 10014,
            "msg": "app secret invalid"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
        .expect(0)
        .mount(&server)
        .await;

    match client_for(&server).get_users().await {
        Err(err @ ImError::Auth { .. }) => {
            assert!(err.to_string().contains("app secret invalid"));
        }
        other => panic!("expected auth error, got {other:?}"),
    }
}

#[tokio::test]
async fn null_data_still_reports_upstream_error() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 99991672,
            "msg": "no permission",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    match client_for(&server).get_users().await {
        Err(ImError::Upstream { code, message, .. }) => {
            assert_eq!(code, 99991672);
            assert_eq!(message, "no permission");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn send_error_code_is_upstream_failure() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/message/v4/send/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 230013,
            "msg": "bot has no availability to this user",
            "data": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/departments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0})))
        .expect(0)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .send_message(&ids(&["ou_1"]), &[], &Message::text("hello"))
        .await;
    match result {
        Err(ImError::Upstream {
            provider,
            code,
            message,
        }) => {
            assert_eq!(provider, Provider::Feishu);
            assert_eq!(code, 230013);
            assert_eq!(message, "bot has no availability to this user");
        }
        other => panic!("expected upstream error, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_tenant_token_clears_cache() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    Mock::given(method("GET"))
        .and(path("/contact/v3/departments"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 99991663,
            "msg": "Invalid access token for authorization",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .tokens()
        .store(Token::new("stale", expiry_from_ttl(Utc::now(), 3600)))
        .await;

    let result = client.get_departments().await;
    assert!(matches!(
        result,
        Err(ImError::Upstream { code: 99991663, .. })
    ));
    assert!(client.tokens().current().await.is_none());
}
