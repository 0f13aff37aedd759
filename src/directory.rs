//! Canonical directory model shared by every provider.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::client::Provider;

/// An organizational department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Numeric department ID.
    pub id: i64,
    /// Display name.
    pub name: String,
}

/// A directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Provider user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Phone number. No current provider listing populates it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// IDs of the departments the user belongs to, in provider order.
    pub dept_ids: Vec<String>,
}

/// Stringify numeric department memberships, preserving order.
pub fn stringify_dept_ids(ids: &[i64]) -> Vec<String> {
    ids.iter().map(i64::to_string).collect()
}

/// Parse a string department ID into the canonical numeric form.
///
/// Unparseable IDs become `0` and are reported with a warning so the loss is
/// visible in logs.
pub fn parse_department_id(provider: Provider, raw: &str) -> i64 {
    match raw.trim().parse::<i64>() {
        Ok(id) => id,
        Err(e) => {
            warn!(
                %provider,
                department_id = raw,
                error = %e,
                "department ID is not numeric; substituting 0"
            );
            0
        }
    }
}
