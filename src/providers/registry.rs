//! Registry of configured provider clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{ImClient, Provider};
use crate::config::Config;
use crate::credentials::Credentials;

use super::dingtalk::DingTalkClient;
use super::feishu::FeishuClient;
use super::wecom::WeComClient;

/// Client construction and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The provider has no section in the config.
    #[error("provider '{provider}' is not configured")]
    NotConfigured {
        /// Requested provider.
        provider: Provider,
    },
    /// The secret named by the provider section could not be found.
    #[error("missing credential for provider '{provider}': {key}")]
    MissingCredential {
        /// Provider name.
        provider: Provider,
        /// Missing credential key.
        key: String,
    },
}

/// Configured clients keyed by provider.
///
/// Each client is built once, so its token cache is shared by every caller
/// that resolves it.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: BTreeMap<Provider, Arc<dyn ImClient>>,
    failures: BTreeMap<Provider, RegistryError>,
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("clients", &self.clients.keys().collect::<Vec<_>>())
            .field("failures", &self.failures)
            .finish()
    }
}

impl ClientRegistry {
    /// Build every provider that has a config section.
    ///
    /// Providers whose secret is missing are skipped with a warning; resolving
    /// them later reports why.
    pub fn from_config(config: &Config, credentials: &Credentials) -> Self {
        let mut registry = Self::default();
        for provider in [Provider::WeCom, Provider::DingTalk, Provider::Feishu] {
            match instantiate_client(provider, config, credentials) {
                Ok(client) => {
                    debug!(%provider, "provider client ready");
                    registry.clients.insert(provider, client);
                }
                Err(RegistryError::NotConfigured { .. }) => {}
                Err(err) => {
                    warn!(%provider, error = %err, "provider client unavailable");
                    registry.failures.insert(provider, err);
                }
            }
        }
        registry
    }

    /// Create a registry from prebuilt clients for integration tests.
    #[doc(hidden)]
    pub fn for_testing(clients: Vec<Arc<dyn ImClient>>) -> Self {
        let clients = clients
            .into_iter()
            .map(|client| (client.provider(), client))
            .collect();
        Self {
            clients,
            failures: BTreeMap::new(),
        }
    }

    /// Resolve the client for `provider`.
    ///
    /// # Errors
    ///
    /// Returns the construction error recorded for the provider, or
    /// [`RegistryError::NotConfigured`].
    pub fn resolve(&self, provider: Provider) -> Result<Arc<dyn ImClient>, RegistryError> {
        if let Some(client) = self.clients.get(&provider) {
            return Ok(Arc::clone(client));
        }
        Err(self
            .failures
            .get(&provider)
            .cloned()
            .unwrap_or(RegistryError::NotConfigured { provider }))
    }

    /// Providers with a ready client.
    pub fn available(&self) -> Vec<Provider> {
        self.clients.keys().copied().collect()
    }
}

/// Build the client for one provider from its config section.
///
/// # Errors
///
/// Returns [`RegistryError::NotConfigured`] when the section is absent and
/// [`RegistryError::MissingCredential`] when its secret cannot be found.
pub fn instantiate_client(
    provider: Provider,
    config: &Config,
    credentials: &Credentials,
) -> Result<Arc<dyn ImClient>, RegistryError> {
    let secret = |key: &str| {
        credentials
            .lookup(key)
            .ok_or_else(|| RegistryError::MissingCredential {
                provider,
                key: key.to_owned(),
            })
    };

    match provider {
        Provider::WeCom => {
            let section = config
                .wecom
                .as_ref()
                .ok_or(RegistryError::NotConfigured { provider })?;
            let mut client = WeComClient::new(&section.corp_id, secret(&section.secret_env)?);
            if let Some(base) = &section.api_base {
                client = client.with_api_base(base);
            }
            Ok(Arc::new(client))
        }
        Provider::DingTalk => {
            let section = config
                .dingtalk
                .as_ref()
                .ok_or(RegistryError::NotConfigured { provider })?;
            let mut client = DingTalkClient::new(
                &section.app_key,
                secret(&section.secret_env)?,
                section.agent_id,
            );
            if let Some(base) = &section.api_base {
                client = client.with_api_base(base);
            }
            Ok(Arc::new(client))
        }
        Provider::Feishu => {
            let section = config
                .feishu
                .as_ref()
                .ok_or(RegistryError::NotConfigured { provider })?;
            let mut client = FeishuClient::new(&section.app_id, secret(&section.secret_env)?);
            if let Some(base) = &section.api_base {
                client = client.with_api_base(base);
            }
            Ok(Arc::new(client))
        }
    }
}
