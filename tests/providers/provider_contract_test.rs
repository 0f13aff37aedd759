//! Client capability contract tests.

use std::sync::Arc;

use imbridge::message::{Message, MessageType, VoiceContent};
use imbridge::providers::{DingTalkClient, FeishuClient, WeComClient};
use imbridge::{ImClient, ImError, Provider};

fn all_clients() -> Vec<Arc<dyn ImClient>> {
    // Port 9 is discard; any request that escapes would fail, not hang.
    let base = "http://127.0.0.1:9";
    vec![
        Arc::new(WeComClient::new("corp", "secret").with_api_base(base)),
        Arc::new(DingTalkClient::new("key", "secret", 1).with_api_base(base)),
        Arc::new(FeishuClient::new("app", "secret").with_api_base(base)),
    ]
}

#[test]
fn clients_report_their_provider() {
    let providers: Vec<Provider> = all_clients().iter().map(|c| c.provider()).collect();
    assert_eq!(
        providers,
        vec![Provider::WeCom, Provider::DingTalk, Provider::Feishu]
    );
}

#[test]
fn clients_are_shareable_across_tasks() {
    fn assert_send_sync<T: Send + Sync + ?Sized>() {}
    assert_send_sync::<dyn ImClient>();
    assert_send_sync::<WeComClient>();
    assert_send_sync::<DingTalkClient>();
    assert_send_sync::<FeishuClient>();
}

#[test]
fn debug_output_hides_secrets() {
    let wecom = WeComClient::new("corp", "super-secret-value");
    let dingtalk = DingTalkClient::new("key", "super-secret-value", 1);
    let feishu = FeishuClient::new("app", "super-secret-value");
    for rendered in [
        format!("{wecom:?}"),
        format!("{dingtalk:?}"),
        format!("{feishu:?}"),
    ] {
        assert!(!rendered.contains("super-secret-value"), "{rendered}");
        assert!(rendered.contains("[REDACTED]"));
    }
}

#[tokio::test]
async fn every_client_rejects_empty_recipients_first() {
    for client in all_clients() {
        let result = client.send_message(&[], &[], &Message::text("x")).await;
        match result {
            Err(ImError::NoRecipients { provider }) => assert_eq!(provider, client.provider()),
            other => panic!("{}: expected NoRecipients, got {other:?}", client.provider()),
        }
    }
}

#[tokio::test]
async fn only_wecom_carries_rich_types() {
    let voice = Message::Voice(VoiceContent {
        media_id: "m".to_owned(),
        duration: 1,
    });
    for client in all_clients() {
        let result = client
            .send_message(&["u1".to_owned()], &[], &voice)
            .await;
        match client.provider() {
            // WeCom encodes voice and then fails on the unreachable base.
            Provider::WeCom => assert!(matches!(result, Err(ImError::Transport(_)))),
            _ => assert!(matches!(
                result,
                Err(ImError::UnsupportedType {
                    msg_type: MessageType::Voice,
                    ..
                })
            )),
        }
    }
}
