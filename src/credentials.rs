//! Provider secrets loaded from the runtime `.env` file.
//!
//! Secrets never live in `config.toml`. Each provider section names a key,
//! which is looked up in `~/.imbridge/.env` first and then in the process
//! environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

use crate::config::runtime_paths;

/// Secrets loaded from the `.env` file.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a credential value from the loaded file, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Look a key up in the loaded file, then in the process environment.
    ///
    /// Blank values are treated as missing.
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.lookup_with(key, |k| std::env::var(k).ok())
    }

    /// [`Credentials::lookup`] with a custom environment resolver.
    pub fn lookup_with(&self, key: &str, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        if let Some(value) = self.get(key).filter(|v| !v.trim().is_empty()) {
            return Some(value.to_owned());
        }
        env(key).filter(|v| !v.trim().is_empty())
    }
}

/// Load credentials from a specific `.env` path.
///
/// # Errors
///
/// Returns an error if the file does not exist, permissions are too broad,
/// or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "credentials file does not exist: {}",
            path.display()
        ));
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

/// Load credentials from `~/.imbridge/.env`, or none if the file is absent.
///
/// A missing file is not an error: secrets may come from the process
/// environment instead.
///
/// # Errors
///
/// Returns an error when runtime paths cannot be resolved or an existing
/// credentials file is invalid.
pub fn load_default_credentials() -> anyhow::Result<Credentials> {
    let paths = runtime_paths()?;
    if !paths.env_file.exists() {
        debug!(path = %paths.env_file.display(), "no credentials file; using process environment");
        return Ok(Credentials::default());
    }
    load_credentials(&paths.env_file)
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
