use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Result, WorkflowError};

/// Named-secret lookup (Key Vault in production).
#[async_trait]
pub trait SecretStore: Send + Sync {
    fn name(&self) -> &str;

    /// Raw value of the secret called `name`.
    async fn get_secret(&self, name: &str) -> Result<String>;
}

/// Mailgun credential bundle, stored as one JSON secret.
#[derive(Clone, Deserialize)]
pub struct MailgunCredentials {
    #[serde(rename = "MAILGUN_API_KEY")]
    pub api_key: String,
    /// API base, e.g. `https://api.eu.mailgun.net/v3`.
    #[serde(rename = "MAILGUN_API")]
    pub api_base: String,
    #[serde(rename = "MAILGUN_DOMAIN")]
    pub domain: String,
}

impl MailgunCredentials {
    /// Parse the JSON value of secret `name`.
    pub fn from_secret(name: &str, value: &str) -> Result<Self> {
        serde_json::from_str(value).map_err(|e| WorkflowError::Secret {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.api_base.trim_end_matches('/'),
            self.domain
        )
    }
}

impl fmt::Debug for MailgunCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailgunCredentials")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("domain", &self.domain)
            .finish()
    }
}
