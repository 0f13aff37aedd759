//! Integration tests for building clients from config.

use std::collections::BTreeMap;
use std::sync::Arc;

use imbridge::config::Config;
use imbridge::credentials::Credentials;
use imbridge::providers::{ClientRegistry, RegistryError, WeComClient};
use imbridge::Provider;

fn parse_config(raw: &str) -> Config {
    match toml::from_str(raw) {
        Ok(config) => config,
        Err(err) => panic!("config should parse: {err}"),
    }
}

fn credentials(pairs: &[(&str, &str)]) -> Credentials {
    let vars: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Credentials::from_map(vars)
}

#[test]
fn builds_only_configured_providers() {
    let config = parse_config(
        r#"
[wecom]
corp_id = "ww1"
secret_env = "REGISTRY_TEST_WECOM_SECRET"

[feishu]
app_id = "cli_1"
secret_env = "REGISTRY_TEST_FEISHU_SECRET"
"#,
    );
    let creds = credentials(&[
        ("REGISTRY_TEST_WECOM_SECRET", "w"),
        ("REGISTRY_TEST_FEISHU_SECRET", "f"),
    ]);

    let registry = ClientRegistry::from_config(&config, &creds);
    assert_eq!(registry.available(), vec![Provider::WeCom, Provider::Feishu]);

    let wecom = match registry.resolve(Provider::WeCom) {
        Ok(client) => client,
        Err(err) => panic!("wecom should resolve: {err}"),
    };
    assert_eq!(wecom.provider(), Provider::WeCom);
    assert_eq!(
        registry.resolve(Provider::DingTalk).err(),
        Some(RegistryError::NotConfigured {
            provider: Provider::DingTalk
        })
    );
}

#[test]
fn missing_secret_is_reported_on_resolve() {
    let config = parse_config(
        r#"
[dingtalk]
app_key = "ding1"
agent_id = 42
secret_env = "REGISTRY_TEST_ABSENT_DINGTALK_SECRET"
"#,
    );
    let registry = ClientRegistry::from_config(&config, &Credentials::default());
    assert!(registry.available().is_empty());
    assert_eq!(
        registry.resolve(Provider::DingTalk).err(),
        Some(RegistryError::MissingCredential {
            provider: Provider::DingTalk,
            key: "REGISTRY_TEST_ABSENT_DINGTALK_SECRET".to_owned(),
        })
    );
}

#[test]
fn blank_secret_counts_as_missing() {
    let config = parse_config(
        r#"
[feishu]
app_id = "cli_1"
secret_env = "REGISTRY_TEST_BLANK_FEISHU_SECRET"
"#,
    );
    let creds = credentials(&[("REGISTRY_TEST_BLANK_FEISHU_SECRET", "  ")]);
    let registry = ClientRegistry::from_config(&config, &creds);
    assert!(matches!(
        registry.resolve(Provider::Feishu),
        Err(RegistryError::MissingCredential { .. })
    ));
}

#[test]
fn testing_registry_resolves_same_instance() {
    let client: Arc<dyn imbridge::ImClient> = Arc::new(WeComClient::new("ww1", "s"));
    let registry = ClientRegistry::for_testing(vec![Arc::clone(&client)]);
    let first = match registry.resolve(Provider::WeCom) {
        Ok(client) => client,
        Err(err) => panic!("should resolve: {err}"),
    };
    assert!(Arc::ptr_eq(&first, &client));
}
