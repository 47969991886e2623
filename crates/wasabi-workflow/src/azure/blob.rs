use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::azure::connection::{StorageAuth, StorageConnection};
use crate::blob::{BlobDescriptor, BlobStore};
use crate::error::{Result, WorkflowError};

/// Blob service REST version sent in `x-ms-version`.
const API_VERSION: &str = "2021-08-06";

/// One container in an Azure storage account.
pub struct AzureBlobStore {
    client: reqwest::Client,
    connection: StorageConnection,
    container: String,
}

impl AzureBlobStore {
    pub fn from_connection_string(connection_string: &str, container: &str) -> Result<Self> {
        Ok(Self::new(
            StorageConnection::parse(connection_string)?,
            container,
        ))
    }

    pub fn new(connection: StorageConnection, container: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            connection,
            container: container.to_string(),
        }
    }

    fn container_path(&self) -> String {
        format!("/{}", self.container)
    }

    fn blob_path(&self, name: &str) -> String {
        format!("/{}/{}", self.container, encode_blob_name(name))
    }

    /// Signed GET against `rel_path` (relative to the blob endpoint).
    async fn get(&self, rel_path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let ms_headers = [("x-ms-date", date.as_str()), ("x-ms-version", API_VERSION)];

        let mut url = format!("{}{}", self.connection.blob_endpoint, rel_path);
        let mut params: Vec<String> = query
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect();
        if let StorageAuth::Sas(sas) = &self.connection.auth {
            params.push(sas.clone());
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }

        let mut req = self.client.get(&url);
        for (name, value) in ms_headers {
            req = req.header(name, value);
        }
        let resource = self.connection.canonicalized_resource(
            &format!("{}{}", self.connection.endpoint_path(), rel_path),
            query,
        );
        if let Some(auth) = self
            .connection
            .authorization("GET", &ms_headers, &resource)?
        {
            req = req.header("Authorization", auth);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(WorkflowError::Api {
                service: "blob",
                status,
                message,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    fn name(&self) -> &str {
        "azure-blob"
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<BlobDescriptor>> {
        let path = self.container_path();
        let mut blobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut query = vec![("restype", "container"), ("comp", "list"), ("prefix", prefix)];
            if let Some(m) = marker.as_deref() {
                query.push(("marker", m));
            }
            let body = self.get(&path, &query).await?.text().await?;
            let page = parse_list_page(&body)?;
            debug!(container = %self.container, count = page.blobs.len(), "listed blob page");
            blobs.extend(page.blobs);

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }
        Ok(blobs)
    }

    async fn read_object(&self, blob: &BlobDescriptor) -> Result<Vec<u8>> {
        let bytes = self.get(&self.blob_path(&blob.name), &[]).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Percent-encode each path segment, keeping the `/` separators.
fn encode_blob_name(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

struct ListPage {
    blobs: Vec<BlobDescriptor>,
    next_marker: Option<String>,
}

#[derive(Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties", default)]
    properties: BlobProperties,
}

#[derive(Default, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Content-Length", default)]
    content_length: Option<u64>,
    #[serde(rename = "Last-Modified", default)]
    last_modified: Option<String>,
}

fn parse_list_page(xml: &str) -> Result<ListPage> {
    let xml = xml.trim_start_matches('\u{feff}');
    let results: EnumerationResults = quick_xml::de::from_str(xml)
        .map_err(|e| WorkflowError::Parse(format!("blob listing: {e}")))?;

    let blobs = results
        .blobs
        .items
        .into_iter()
        .map(|item| BlobDescriptor {
            name: item.name,
            size: item.properties.content_length,
            last_modified: item.properties.last_modified,
        })
        .collect();
    Ok(ListPage {
        blobs,
        next_marker: results.next_marker.filter(|m| !m.trim().is_empty()),
    })
}
