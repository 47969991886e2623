use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::azure::credential::TokenCredential;
use crate::error::{Result, WorkflowError};
use crate::secrets::SecretStore;

const API_VERSION: &str = "7.4";
const VAULT_SCOPE: &str = "https://vault.azure.net/.default";

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
}

/// Key Vault secrets, read with a bearer token.
pub struct KeyVaultClient {
    client: reqwest::Client,
    vault_url: String,
    credential: Arc<dyn TokenCredential>,
}

impl KeyVaultClient {
    pub fn new(vault_url: &str, credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            client: reqwest::Client::new(),
            vault_url: vault_url.trim_end_matches('/').to_string(),
            credential,
        }
    }

    fn secret_url(&self, name: &str) -> String {
        format!(
            "{}/secrets/{}?api-version={API_VERSION}",
            self.vault_url,
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl SecretStore for KeyVaultClient {
    fn name(&self) -> &str {
        "keyvault"
    }

    async fn get_secret(&self, name: &str) -> Result<String> {
        let token = self.credential.get_token(VAULT_SCOPE).await?;
        let resp = self
            .client
            .get(self.secret_url(name))
            .bearer_auth(&token.token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(WorkflowError::Api {
                service: "keyvault",
                status,
                message,
            });
        }

        let bundle: SecretBundle = resp.json().await.map_err(|e| WorkflowError::Secret {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!(vault = %self.vault_url, secret = name, "secret fetched");
        Ok(bundle.value)
    }
}
