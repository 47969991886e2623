//! `wasabi-core` — configuration, shared error type and replica identity.

pub mod config;
pub mod error;
pub mod types;

pub use config::WasabiConfig;
pub use error::{ReporterError, Result};
pub use types::ReplicaId;
