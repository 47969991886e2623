//! Entra ID (Azure AD) access tokens.
//!
//! Sources are tried in order until one yields a token:
//!   1. client secret from AZURE_TENANT_ID / AZURE_CLIENT_ID / AZURE_CLIENT_SECRET
//!      (skipped when the environment credential is disabled)
//!   2. workload identity from AZURE_FEDERATED_TOKEN_FILE (AKS)
//!   3. managed identity through the instance metadata service
//!
//! The winning token is cached until two minutes before it expires.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, WorkflowError};

const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const JWT_BEARER_ASSERTION: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
/// Refresh this many seconds before the reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 120;

#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    /// Unix timestamp (seconds).
    pub expires_at: i64,
}

impl AccessToken {
    fn fresh_at(&self, now: i64) -> bool {
        now + EXPIRY_MARGIN_SECS < self.expires_at
    }
}

/// Anything that can mint a bearer token for a scope such as
/// `https://vault.azure.net/.default`.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    fn name(&self) -> &str;
    async fn get_token(&self, scope: &str) -> Result<AccessToken>;
}

/// Token endpoint reply. IMDS sends `expires_in` as a string.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Seconds,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Seconds {
    Number(i64),
    Text(String),
}

impl Seconds {
    fn value(&self) -> Result<i64> {
        match self {
            Seconds::Number(n) => Ok(*n),
            Seconds::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| WorkflowError::Parse(format!("expires_in {s:?} is not a number"))),
        }
    }
}

fn into_access_token(resp: TokenResponse, now: i64) -> Result<AccessToken> {
    Ok(AccessToken {
        expires_at: now + resp.expires_in.value()?,
        token: resp.access_token,
    })
}

async fn read_token(source: &'static str, resp: reqwest::Response) -> Result<AccessToken> {
    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        return Err(WorkflowError::Api {
            service: source,
            status,
            message,
        });
    }
    let body: TokenResponse = resp
        .json()
        .await
        .map_err(|e| WorkflowError::Parse(format!("{source} token response: {e}")))?;
    into_access_token(body, chrono::Utc::now().timestamp())
}

fn env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn authority() -> String {
    env("AZURE_AUTHORITY_HOST").unwrap_or_else(|| DEFAULT_AUTHORITY.to_string())
}

/// Service principal with a client secret.
pub struct ClientSecretCredential {
    client: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            client: reqwest::Client::new(),
            authority: authority(),
            tenant_id: env("AZURE_TENANT_ID")?,
            client_id: env("AZURE_CLIENT_ID")?,
            client_secret: env("AZURE_CLIENT_SECRET")?,
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &str {
        "environment"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let url = token_url(&self.authority, &self.tenant_id);
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await?;
        read_token("environment", resp).await
    }
}

/// Federated workload identity: the projected service account token is
/// exchanged as a client assertion.
pub struct WorkloadIdentityCredential {
    client: reqwest::Client,
    authority: String,
    tenant_id: String,
    client_id: String,
    token_file: String,
}

impl WorkloadIdentityCredential {
    pub fn from_env() -> Option<Self> {
        Some(Self {
            client: reqwest::Client::new(),
            authority: authority(),
            tenant_id: env("AZURE_TENANT_ID")?,
            client_id: env("AZURE_CLIENT_ID")?,
            token_file: env("AZURE_FEDERATED_TOKEN_FILE")?,
        })
    }
}

#[async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn name(&self) -> &str {
        "workload_identity"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        // Re-read every time: the kubelet rotates the projected token.
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                WorkflowError::Credential(format!("cannot read {}: {e}", self.token_file))
            })?;
        let url = token_url(&self.authority, &self.tenant_id);
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_assertion_type", JWT_BEARER_ASSERTION),
                ("client_assertion", assertion.trim()),
                ("scope", scope),
            ])
            .send()
            .await?;
        read_token("workload_identity", resp).await
    }
}

/// Managed identity through the instance metadata service.
pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    client_id: Option<String>,
}

impl ManagedIdentityCredential {
    pub fn new(client_id: Option<String>) -> Result<Self> {
        // IMDS is link-local; fail fast when it is not there.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, client_id })
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &str {
        "managed_identity"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let resource = scope_to_resource(scope);
        let mut query = vec![("api-version", "2018-02-01"), ("resource", resource)];
        if let Some(id) = self.client_id.as_deref() {
            query.push(("client_id", id));
        }
        let resp = self
            .client
            .get(IMDS_ENDPOINT)
            .header("Metadata", "true")
            .query(&query)
            .send()
            .await?;
        read_token("managed_identity", resp).await
    }
}

fn token_url(authority: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority.trim_end_matches('/'),
        tenant_id
    )
}

/// v1 endpoints (IMDS) take a resource instead of a `/.default` scope.
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Ordered credential chain with a single cached token per scope.
pub struct DefaultCredential {
    sources: Vec<Box<dyn TokenCredential>>,
    cached: RwLock<Option<(String, AccessToken)>>,
}

impl DefaultCredential {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            cached: RwLock::new(None),
        }
    }

    /// Build the chain from the process environment.
    pub fn from_env(exclude_environment_credential: bool) -> Result<Self> {
        let mut sources: Vec<Box<dyn TokenCredential>> = Vec::new();
        if !exclude_environment_credential {
            if let Some(c) = ClientSecretCredential::from_env() {
                sources.push(Box::new(c));
            }
        }
        if let Some(c) = WorkloadIdentityCredential::from_env() {
            sources.push(Box::new(c));
        }
        sources.push(Box::new(ManagedIdentityCredential::new(env(
            "AZURE_CLIENT_ID",
        ))?));

        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        info!(sources = ?names, "azure credential chain configured");
        Ok(Self::new(sources))
    }
}

#[async_trait]
impl TokenCredential for DefaultCredential {
    fn name(&self) -> &str {
        "default"
    }

    async fn get_token(&self, scope: &str) -> Result<AccessToken> {
        let now = chrono::Utc::now().timestamp();

        // Fast path
        {
            let cached = self.cached.read().await;
            if let Some((s, token)) = cached.as_ref() {
                if s == scope && token.fresh_at(now) {
                    return Ok(token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;
        let mut failures = Vec::new();
        for source in &self.sources {
            match source.get_token(scope).await {
                Ok(token) => {
                    debug!(source = source.name(), "azure access token obtained");
                    *cached = Some((scope.to_string(), token.clone()));
                    return Ok(token);
                }
                Err(e) => failures.push(format!("{}: {e}", source.name())),
            }
        }
        Err(WorkflowError::Credential(if failures.is_empty() {
            "no credential sources configured".to_string()
        } else {
            failures.join("; ")
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Fixed {
        calls: Arc<AtomicUsize>,
        token: Option<&'static str>,
        lifetime: i64,
    }

    #[async_trait]
    impl TokenCredential for Fixed {
        fn name(&self) -> &str {
            if self.token.is_some() {
                "fixed"
            } else {
                "broken"
            }
        }
        async fn get_token(&self, _scope: &str) -> Result<AccessToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.token {
                Some(t) => Ok(AccessToken {
                    token: t.to_string(),
                    expires_at: chrono::Utc::now().timestamp() + self.lifetime,
                }),
                None => Err(WorkflowError::Credential("not available here".into())),
            }
        }
    }

    const SCOPE: &str = "https://vault.azure.net/.default";

    #[tokio::test]
    async fn falls_through_to_next_source() {
        let broken = Arc::new(AtomicUsize::new(0));
        let fixed = Arc::new(AtomicUsize::new(0));
        let chain = DefaultCredential::new(vec![
            Box::new(Fixed { calls: broken.clone(), token: None, lifetime: 0 }),
            Box::new(Fixed { calls: fixed.clone(), token: Some("tok"), lifetime: 3600 }),
        ]);

        assert_eq!(chain.get_token(SCOPE).await.unwrap().token, "tok");
        // cached: neither source is asked again
        assert_eq!(chain.get_token(SCOPE).await.unwrap().token, "tok");
        assert_eq!(broken.load(Ordering::SeqCst), 1);
        assert_eq!(fixed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nearly_expired_token_is_refreshed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = DefaultCredential::new(vec![Box::new(Fixed {
            calls: calls.clone(),
            token: Some("short"),
            lifetime: 60,
        })]);

        chain.get_token(SCOPE).await.unwrap();
        chain.get_token(SCOPE).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn all_sources_failing_reports_each() {
        let chain = DefaultCredential::new(vec![Box::new(Fixed {
            calls: Arc::new(AtomicUsize::new(0)),
            token: None,
            lifetime: 0,
        })]);
        let err = chain.get_token(SCOPE).await.err().unwrap();
        assert!(err.to_string().contains("broken: "));
    }

    #[test]
    fn token_response_accepts_string_or_number_lifetimes() {
        let aad: TokenResponse =
            serde_json::from_str(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"a"}"#)
                .unwrap();
        let imds: TokenResponse = serde_json::from_str(
            r#"{"access_token":"b","expires_in":"86399","expires_on":"1710400000","token_type":"Bearer"}"#,
        )
        .unwrap();
        assert_eq!(into_access_token(aad, 1_000).unwrap().expires_at, 4_599);
        assert_eq!(into_access_token(imds, 1_000).unwrap().expires_at, 87_399);
    }

    #[test]
    fn urls_and_resources() {
        assert_eq!(
            token_url("https://login.microsoftonline.com/", "tenant-1"),
            "https://login.microsoftonline.com/tenant-1/oauth2/v2.0/token"
        );
        assert_eq!(scope_to_resource(SCOPE), "https://vault.azure.net");
    }
}
