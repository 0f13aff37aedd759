//! Configuration loading.
//!
//! `config.toml` holds non-secret settings: which providers are enabled,
//! their public identifiers, and the relay server. Secrets are never stored
//! in the file; each provider section names the environment variable (or
//! `.env` key) that holds its secret.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "IMBRIDGE_CONFIG_PATH";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// WeCom adapter settings. Absent means disabled.
    #[serde(default)]
    pub wecom: Option<WeComConfig>,

    /// DingTalk adapter settings. Absent means disabled.
    #[serde(default)]
    pub dingtalk: Option<DingTalkConfig>,

    /// Feishu adapter settings. Absent means disabled.
    #[serde(default)]
    pub feishu: Option<FeishuConfig>,

    /// Webhook relay server settings.
    #[serde(default)]
    pub relay: RelayConfig,
}

/// WeCom settings.
#[derive(Debug, Deserialize)]
pub struct WeComConfig {
    /// Corp ID (`corpid`).
    pub corp_id: String,

    /// Credential key holding the app secret.
    #[serde(default = "default_wecom_secret_env")]
    pub secret_env: String,

    /// API base override.
    #[serde(default)]
    pub api_base: Option<String>,
}

/// DingTalk settings.
#[derive(Debug, Deserialize)]
pub struct DingTalkConfig {
    /// App key (`appkey`).
    pub app_key: String,

    /// Micro-app agent ID used for work notifications.
    pub agent_id: i64,

    /// Credential key holding the app secret.
    #[serde(default = "default_dingtalk_secret_env")]
    pub secret_env: String,

    /// API base override.
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Feishu settings.
#[derive(Debug, Deserialize)]
pub struct FeishuConfig {
    /// App ID (`app_id`).
    pub app_id: String,

    /// Credential key holding the app secret.
    #[serde(default = "default_feishu_secret_env")]
    pub secret_env: String,

    /// API base override, e.g. `https://open.larksuite.com/open-apis`.
    #[serde(default)]
    pub api_base: Option<String>,
}

/// Webhook relay server settings.
#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    /// Socket address to listen on.
    #[serde(default = "default_relay_bind")]
    pub bind: String,

    /// Log entries kept per hook, newest first.
    #[serde(default = "default_max_log_entries")]
    pub max_log_entries: usize,

    /// Directory for rotated JSON logs. Console-only logging when absent.
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: default_relay_bind(),
            max_log_entries: default_max_log_entries(),
            logs_dir: None,
        }
    }
}

// Default value functions for serde

fn default_wecom_secret_env() -> String {
    "IMBRIDGE_WECOM_CORP_SECRET".to_owned()
}
fn default_dingtalk_secret_env() -> String {
    "IMBRIDGE_DINGTALK_APP_SECRET".to_owned()
}
fn default_feishu_secret_env() -> String {
    "IMBRIDGE_FEISHU_APP_SECRET".to_owned()
}
fn default_relay_bind() -> String {
    "127.0.0.1:8080".to_owned()
}
fn default_max_log_entries() -> usize {
    10
}

/// Load the config from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config at {}: {e}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {e}", path.display()))?;
    Ok(config)
}

/// Resolve the default config directory (`~/.imbridge/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".imbridge"))
}

/// Well-known files under the config directory.
#[derive(Debug, Clone)]
pub struct RuntimePaths {
    /// `~/.imbridge`
    pub root: PathBuf,
    /// `~/.imbridge/config.toml`
    pub config_file: PathBuf,
    /// `~/.imbridge/.env`
    pub env_file: PathBuf,
}

impl RuntimePaths {
    /// Paths rooted at `root`.
    pub fn under(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.toml"),
            env_file: root.join(".env"),
            root,
        }
    }
}

/// Resolve runtime paths under `~/.imbridge`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn runtime_paths() -> anyhow::Result<RuntimePaths> {
    Ok(RuntimePaths::under(config_dir()?))
}

/// Pick the config file: explicit path, then `$IMBRIDGE_CONFIG_PATH`, then
/// the default under `paths`.
///
/// Takes an env resolver so tests need not mutate the process environment.
pub fn resolve_config_path(
    explicit: Option<&Path>,
    paths: &RuntimePaths,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(path);
    }
    paths.config_file.clone()
}
