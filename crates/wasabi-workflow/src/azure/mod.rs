//! Minimal Azure REST clients: Blob Storage (Shared Key or SAS), Entra ID
//! token credentials, and Key Vault secrets.

pub mod blob;
pub mod connection;
pub mod credential;
pub mod keyvault;

pub use blob::AzureBlobStore;
pub use connection::{StorageAuth, StorageConnection};
pub use credential::{AccessToken, DefaultCredential, TokenCredential};
pub use keyvault::KeyVaultClient;
