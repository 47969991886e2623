use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ReporterError, Result};
use crate::types::ReplicaId;

pub const DEFAULT_REDIS_URL: &str = "redis://redis:6379/0";
pub const DEFAULT_LEASE_KEY: &str = "wasabi-report-lock";
pub const DEFAULT_LEASE_TTL_SECS: u64 = 10;
/// Every day at 07:00 UTC.
pub const DEFAULT_CRON: &str = "0 7 * * *";
pub const DEFAULT_CONTAINER: &str = "harmonia-archive";
pub const DEFAULT_VAULT_URL: &str = "https://uksouth-prod-qj46.vault.azure.net/";

/// Top-level config (wasabi.toml + WASABI_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WasabiConfig {
    #[serde(default)]
    pub lease: LeaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub secrets: SecretsConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared lease store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_lease_key")]
    pub key: String,
    /// Lease lifetime. Must stay far shorter than the interval between ticks.
    #[serde(default = "default_lease_ttl")]
    pub ttl_secs: u64,
    /// Override for the lease holder identity. Falls back to the hostname.
    #[serde(default)]
    pub holder: Option<String>,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            key: default_lease_key(),
            ttl_secs: DEFAULT_LEASE_TTL_SECS,
            holder: None,
        }
    }
}

impl LeaseConfig {
    /// Identity this replica writes into the lease.
    pub fn resolve_holder(&self) -> Result<ReplicaId> {
        match self.holder.as_deref() {
            Some(h) if !h.trim().is_empty() => Ok(ReplicaId::new(h.trim())),
            _ => ReplicaId::from_hostname(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Five-field crontab expression, evaluated in UTC.
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
        }
    }
}

/// Where the daily catch-all file is archived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Azure storage connection string. Also read from BLOB_CONNECTION_STRING.
    #[serde(default)]
    pub connection_string: Option<String>,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    /// Column whose distinct values are reported.
    #[serde(default = "default_date_column")]
    pub date_column: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            container: default_container(),
            folder: default_folder(),
            file_name: default_file_name(),
            date_column: default_date_column(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default = "default_vault_url")]
    pub vault_url: String,
    /// Name of the Key Vault secret holding the Mailgun JSON bundle.
    #[serde(default = "default_mailgun_secret")]
    pub mailgun_secret: String,
    /// Skip the AZURE_CLIENT_SECRET credential (hides a noisy startup warning
    /// on pods that authenticate with workload or managed identity).
    #[serde(default = "bool_true", deserialize_with = "literal_true")]
    pub disable_env_credential: bool,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            vault_url: default_vault_url(),
            mailgun_secret: default_mailgun_secret(),
            disable_env_credential: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default = "default_recipients")]
    pub recipients: Vec<String>,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: default_from(),
            recipients: default_recipients(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn bool_true() -> bool {
    true
}

/// Only a literal `true` switches the flag on; `1` or `yes` read as
/// false.
fn literal_true<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Other(#[allow(dead_code)] serde::de::IgnoredAny),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s == "true",
        Flag::Other(_) => false,
    })
}

fn default_redis_url() -> String {
    DEFAULT_REDIS_URL.to_string()
}
fn default_lease_key() -> String {
    DEFAULT_LEASE_KEY.to_string()
}
fn default_lease_ttl() -> u64 {
    DEFAULT_LEASE_TTL_SECS
}
fn default_cron() -> String {
    DEFAULT_CRON.to_string()
}
fn default_container() -> String {
    DEFAULT_CONTAINER.to_string()
}
fn default_folder() -> String {
    "wasabi-club".to_string()
}
fn default_file_name() -> String {
    "Bink Catch All File".to_string()
}
fn default_date_column() -> String {
    "Date".to_string()
}
fn default_vault_url() -> String {
    DEFAULT_VAULT_URL.to_string()
}
fn default_mailgun_secret() -> String {
    "mailgun".to_string()
}
fn default_from() -> String {
    "Wasabi Report <wasabireport@bink.com>".to_string()
}
fn default_recipients() -> Vec<String> {
    vec![
        "operations@bink.com".to_string(),
        "devops@bink.com".to_string(),
    ]
}
fn default_subject_prefix() -> String {
    "Wasabi Catch All File".to_string()
}

impl WasabiConfig {
    /// Load config from a TOML file with WASABI_* env var overrides.
    ///
    /// Precedence (lowest first):
    ///   1. built-in defaults
    ///   2. TOML file (explicit path, else ~/.wasabi/wasabi.toml; missing is fine)
    ///   3. WASABI_SECTION__KEY env vars, e.g. WASABI_LEASE__TTL_SECS=30
    ///   4. legacy deployment vars: REDIS_URL, BLOB_CONNECTION_STRING, DISABLE_ENV_CRED
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: WasabiConfig = Self::figment(&path)
            .extract()
            .map_err(|e| ReporterError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(WasabiConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("WASABI_").ignore(&["config"]).split("__"))
            .merge(legacy_env())
    }

    /// Reject values that would break the lease or scheduler at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.lease.key.trim().is_empty() {
            return Err(ReporterError::Config("lease.key must not be empty".into()));
        }
        if self.lease.ttl_secs == 0 {
            return Err(ReporterError::Config(
                "lease.ttl_secs must be at least 1".into(),
            ));
        }
        if self.schedule.cron.trim().is_empty() {
            return Err(ReporterError::Config("schedule.cron must not be empty".into()));
        }
        Ok(())
    }

    /// The storage connection string, or a config error naming both sources.
    pub fn blob_connection_string(&self) -> Result<&str> {
        self.blob
            .connection_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                ReporterError::Config(
                    "no blob storage connection string \
                     (set blob.connection_string or BLOB_CONNECTION_STRING)"
                        .into(),
                )
            })
    }
}

/// Unprefixed variables the container manifests already set.
fn legacy_env() -> Env {
    Env::raw()
        .only(&["REDIS_URL", "BLOB_CONNECTION_STRING", "DISABLE_ENV_CRED"])
        .map(|key| {
            if key == "REDIS_URL" {
                "lease.redis_url".into()
            } else if key == "BLOB_CONNECTION_STRING" {
                "blob.connection_string".into()
            } else {
                "secrets.disable_env_credential".into()
            }
        })
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.wasabi/wasabi.toml", home)
}
