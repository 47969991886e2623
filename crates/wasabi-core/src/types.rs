use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ReporterError, Result};

/// Stable identity of one replica process, written as the lease holder.
///
/// Defaults to the machine hostname so that a restarted pod keeps renewing
/// the lease it already holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub String);

impl ReplicaId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    /// Identity derived from the OS hostname.
    pub fn from_hostname() -> Result<Self> {
        let name = hostname::get()?
            .into_string()
            .map_err(|raw| ReporterError::Identity(format!("hostname is not UTF-8: {raw:?}")))?;
        if name.is_empty() {
            return Err(ReporterError::Identity("hostname is empty".to_string()));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ReplicaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
