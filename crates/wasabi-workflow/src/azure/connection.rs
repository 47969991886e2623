//! Storage connection strings and Shared Key request signing.
//!
//! Signing follows the Blob service Shared Key scheme: an HMAC-SHA256 over
//! the verb, eleven standard header slots, the sorted `x-ms-*` headers and
//! the canonicalized resource, keyed with the base64-decoded account key.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Result, WorkflowError};

/// Well-known Azurite development account.
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// How requests to the account are authorised.
#[derive(Clone)]
pub enum StorageAuth {
    /// Decoded account key bytes.
    SharedKey(Vec<u8>),
    /// SAS token without the leading `?`.
    Sas(String),
}

impl std::fmt::Debug for StorageAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageAuth::SharedKey(_) => f.write_str("SharedKey(<redacted>)"),
            StorageAuth::Sas(_) => f.write_str("Sas(<redacted>)"),
        }
    }
}

/// Parsed `Key=Value;...` storage connection string.
#[derive(Debug, Clone)]
pub struct StorageConnection {
    pub account: String,
    /// Blob service endpoint without trailing slash.
    pub blob_endpoint: String,
    pub auth: StorageAuth,
}

impl StorageConnection {
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut account = None;
        let mut key = None;
        let mut sas = None;
        let mut protocol = "https".to_string();
        let mut suffix = "core.windows.net".to_string();
        let mut endpoint = None;

        for part in connection_string.split(';').map(str::trim) {
            if part.is_empty() {
                continue;
            }
            let (name, value) = part.split_once('=').ok_or_else(|| {
                WorkflowError::ConnectionString("segment is not Key=Value".to_string())
            })?;
            match name.trim().to_ascii_lowercase().as_str() {
                "usedevelopmentstorage" if value.eq_ignore_ascii_case("true") => {
                    return Self::development();
                }
                "accountname" => account = Some(value.to_string()),
                "accountkey" => key = Some(value.to_string()),
                "sharedaccesssignature" => {
                    sas = Some(value.trim_start_matches('?').to_string())
                }
                "defaultendpointsprotocol" => protocol = value.to_string(),
                "endpointsuffix" => suffix = value.to_string(),
                "blobendpoint" => endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        let account = account.ok_or_else(|| {
            WorkflowError::ConnectionString("AccountName is required".to_string())
        })?;
        let auth = match (key, sas) {
            (Some(key), _) => StorageAuth::SharedKey(STANDARD.decode(key.trim()).map_err(|e| {
                WorkflowError::ConnectionString(format!("AccountKey is not base64: {e}"))
            })?),
            (None, Some(sas)) => StorageAuth::Sas(sas),
            (None, None) => {
                return Err(WorkflowError::ConnectionString(
                    "either AccountKey or SharedAccessSignature is required".to_string(),
                ))
            }
        };
        let blob_endpoint =
            endpoint.unwrap_or_else(|| format!("{protocol}://{account}.blob.{suffix}"));

        Ok(Self {
            account,
            blob_endpoint,
            auth,
        })
    }

    fn development() -> Result<Self> {
        Ok(Self {
            account: DEV_ACCOUNT.to_string(),
            blob_endpoint: DEV_ENDPOINT.to_string(),
            auth: StorageAuth::SharedKey(STANDARD.decode(DEV_KEY).map_err(|e| {
                WorkflowError::ConnectionString(format!("development key: {e}"))
            })?),
        })
    }

    /// Path component of the blob endpoint (`""` for account-per-host,
    /// `/devstoreaccount1` for path-style emulators).
    pub fn endpoint_path(&self) -> &str {
        let after_scheme = self
            .blob_endpoint
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.blob_endpoint);
        match after_scheme.find('/') {
            Some(i) => after_scheme[i..].trim_end_matches('/'),
            None => "",
        }
    }

    /// `/{account}{path}` followed by `\nname:value` for each query
    /// parameter, names lowercased and sorted. Values are unencoded.
    pub fn canonicalized_resource(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut params: Vec<(String, &str)> = query
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), *v))
            .collect();
        params.sort();

        let mut resource = format!("/{}{}", self.account, path);
        for (name, value) in params {
            resource.push('\n');
            resource.push_str(&name);
            resource.push(':');
            resource.push_str(value);
        }
        resource
    }

    /// Value for the `Authorization` header of a body-less request, or
    /// `None` when the connection uses a SAS token.
    pub fn authorization(
        &self,
        verb: &str,
        ms_headers: &[(&str, &str)],
        canonicalized_resource: &str,
    ) -> Result<Option<String>> {
        let StorageAuth::SharedKey(key) = &self.auth else {
            return Ok(None);
        };
        let to_sign = string_to_sign(verb, ms_headers, canonicalized_resource);
        let signature = sign(key, &to_sign)?;
        Ok(Some(format!("SharedKey {}:{}", self.account, signature)))
    }
}

/// Verb, eleven empty standard header slots, canonicalized `x-ms-*`
/// headers, then the resource.
pub(crate) fn string_to_sign(
    verb: &str,
    ms_headers: &[(&str, &str)],
    canonicalized_resource: &str,
) -> String {
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .collect();
    headers.sort();

    let mut out = String::with_capacity(256);
    out.push_str(verb);
    out.push('\n');
    out.push_str(&"\n".repeat(11));
    for (name, value) in headers {
        out.push_str(&name);
        out.push(':');
        out.push_str(value);
        out.push('\n');
    }
    out.push_str(canonicalized_resource);
    out
}

fn sign(key: &[u8], payload: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| WorkflowError::ConnectionString(format!("unusable AccountKey: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
