//! `imbridge` command-line entry point.
//!
//! One-shot commands talk to a single provider and print JSON on stdout;
//! `relay` runs the webhook relay server until interrupted.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};

use imbridge::config::{load_config, resolve_config_path, runtime_paths, Config};
use imbridge::credentials::load_default_credentials;
use imbridge::logging;
use imbridge::message::{Message, MessageType};
use imbridge::providers::ClientRegistry;
use imbridge::relay;
use imbridge::Provider;

/// imbridge: messaging and directory access for enterprise IM platforms.
#[derive(Debug, Parser)]
#[command(
    name = "imbridge",
    version,
    about = "Send messages and read directories across WeCom, DingTalk and Feishu"
)]
struct Cli {
    /// Config file (default: $IMBRIDGE_CONFIG_PATH, then ~/.imbridge/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Send a message.
    Send {
        /// Provider to send through (wecom, dingtalk, feishu).
        #[arg(long, short)]
        provider: Provider,
        /// Recipient user IDs, comma separated.
        #[arg(long, value_delimiter = ',', required = true)]
        to: Vec<String>,
        /// Recipient department IDs, comma separated.
        #[arg(long, value_delimiter = ',')]
        dept: Vec<String>,
        /// Message type.
        #[arg(long = "type", default_value = "text")]
        msg_type: MessageType,
        /// Message content as JSON. Non-JSON input is taken as a plain string.
        #[arg(long)]
        content: String,
    },
    /// List departments.
    Departments {
        /// Provider to query.
        #[arg(long, short)]
        provider: Provider,
    },
    /// List users of the root department.
    Users {
        /// Provider to query.
        #[arg(long, short)]
        provider: Provider,
    },
    /// Run the webhook relay server.
    Relay {
        /// Listen address, overriding `[relay].bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let paths = runtime_paths()?;
    let config_path = resolve_config_path(cli.config.as_deref(), &paths, |key| {
        std::env::var(key).ok()
    });

    match cli.command {
        Command::Send {
            provider,
            to,
            dept,
            msg_type,
            content,
        } => {
            let message = Message::from_parts(msg_type, parse_content(&content))
                .context("invalid message content")?;
            let registry = load_registry(&config_path)?;
            handle_send(&registry, provider, &to, &dept, &message).await
        }
        Command::Departments { provider } => {
            handle_departments(&load_registry(&config_path)?, provider).await
        }
        Command::Users { provider } => handle_users(&load_registry(&config_path)?, provider).await,
        Command::Relay { bind } => handle_relay(&config_path, bind).await,
    }
}

/// Set up CLI logging and build the configured provider clients.
fn load_registry(config_path: &Path) -> anyhow::Result<ClientRegistry> {
    logging::init_cli("warn");
    let config = load_config(config_path)?;
    let credentials = load_default_credentials()?;
    let registry = ClientRegistry::from_config(&config, &credentials);
    debug!(available = ?registry.available(), "providers loaded");
    Ok(registry)
}

/// Send one message and report the outcome.
async fn handle_send(
    registry: &ClientRegistry,
    provider: Provider,
    to: &[String],
    dept: &[String],
    message: &Message,
) -> anyhow::Result<()> {
    let client = registry.resolve(provider)?;
    client
        .send_message(to, dept, message)
        .await
        .with_context(|| format!("{provider} send failed"))?;
    println!("sent {} message via {provider}", message.message_type());
    Ok(())
}

async fn handle_departments(registry: &ClientRegistry, provider: Provider) -> anyhow::Result<()> {
    let departments = registry
        .resolve(provider)?
        .get_departments()
        .await
        .with_context(|| format!("{provider} department listing failed"))?;
    println!("{}", serde_json::to_string_pretty(&departments)?);
    Ok(())
}

async fn handle_users(registry: &ClientRegistry, provider: Provider) -> anyhow::Result<()> {
    let users = registry
        .resolve(provider)?
        .get_users()
        .await
        .with_context(|| format!("{provider} user listing failed"))?;
    println!("{}", serde_json::to_string_pretty(&users)?);
    Ok(())
}

/// Run the webhook relay. A missing config file means relay defaults.
async fn handle_relay(config_path: &Path, bind: Option<String>) -> anyhow::Result<()> {
    let config = if config_path.exists() {
        load_config(config_path)?
    } else {
        Config::default()
    };
    let mut relay_config = config.relay;
    if let Some(bind) = bind {
        relay_config.bind = bind;
    }

    // Keep the guard alive for the whole server run.
    let _logging_guard = match &relay_config.logs_dir {
        Some(dir) => Some(logging::init_production(dir)?),
        None => {
            logging::init_cli("info");
            None
        }
    };
    info!(config = %config_path.display(), "starting relay");
    relay::serve(&relay_config).await
}

/// Parse `--content` as JSON, falling back to a plain string.
fn parse_content(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}
