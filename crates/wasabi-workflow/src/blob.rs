use async_trait::async_trait;
use tracing::info;

use crate::error::{Result, WorkflowError};

/// One object returned by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobDescriptor {
    /// Full object name inside the container, e.g.
    /// `2024/03/14/wasabi-club/Bink Catch All File.csv`.
    pub name: String,
    pub size: Option<u64>,
    pub last_modified: Option<String>,
}

impl BlobDescriptor {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: None,
            last_modified: None,
        }
    }
}

/// Read-only access to an object store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store name for logging and error messages.
    fn name(&self) -> &str;

    /// All objects whose name starts with `prefix`, in store order.
    async fn list_objects(&self, prefix: &str) -> Result<Vec<BlobDescriptor>>;

    /// Full contents of one object.
    async fn read_object(&self, blob: &BlobDescriptor) -> Result<Vec<u8>>;
}

/// Outcome of looking for the day's file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSearch {
    Found(BlobDescriptor),
    NotFound,
}

/// First object matching `prefix`, if any.
pub async fn find_first(store: &dyn BlobStore, prefix: &str) -> Result<FileSearch> {
    let mut matches = store.list_objects(prefix).await?;
    if matches.is_empty() {
        info!(store = store.name(), %prefix, "did not find file");
        return Ok(FileSearch::NotFound);
    }
    let first = matches.swap_remove(0);
    info!(store = store.name(), filename = %first.name, "found file");
    Ok(FileSearch::Found(first))
}

/// Stand-in for storage that could not be configured at startup. Every
/// call fails with the startup reason.
pub struct UnconfiguredBlobStore {
    reason: String,
}

impl UnconfiguredBlobStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl BlobStore for UnconfiguredBlobStore {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn list_objects(&self, _prefix: &str) -> Result<Vec<BlobDescriptor>> {
        Err(WorkflowError::ConnectionString(self.reason.clone()))
    }

    async fn read_object(&self, _blob: &BlobDescriptor) -> Result<Vec<u8>> {
        Err(WorkflowError::ConnectionString(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Listing(Vec<&'static str>);

    #[async_trait]
    impl BlobStore for Listing {
        fn name(&self) -> &str {
            "listing"
        }
        async fn list_objects(&self, prefix: &str) -> Result<Vec<BlobDescriptor>> {
            Ok(self
                .0
                .iter()
                .filter(|n| n.starts_with(prefix))
                .map(|n| BlobDescriptor::named(n))
                .collect())
        }
        async fn read_object(&self, _blob: &BlobDescriptor) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn first_match_in_store_order_is_found() {
        let store = Listing(vec![
            "2024/03/14/wasabi-club/Bink Catch All File_1.csv",
            "2024/03/14/wasabi-club/Bink Catch All File_2.csv",
        ]);
        let found = find_first(&store, "2024/03/14/wasabi-club/Bink Catch All File")
            .await
            .unwrap();
        assert_eq!(
            found,
            FileSearch::Found(BlobDescriptor::named(
                "2024/03/14/wasabi-club/Bink Catch All File_1.csv"
            ))
        );
    }

    #[tokio::test]
    async fn no_match_is_not_found() {
        let store = Listing(vec!["2024/03/13/wasabi-club/Bink Catch All File.csv"]);
        let found = find_first(&store, "2024/03/14/wasabi-club/Bink Catch All File")
            .await
            .unwrap();
        assert_eq!(found, FileSearch::NotFound);
    }

    #[tokio::test]
    async fn unconfigured_store_fails_every_search() {
        let store = UnconfiguredBlobStore::new("no blob storage connection string");
        for _ in 0..2 {
            let err = find_first(&store, "2024/03/14/wasabi-club/Bink Catch All File")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "connection_string");
            assert!(err.to_string().contains("no blob storage connection string"));
        }
    }
}
