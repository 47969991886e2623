//! `wasabi-workflow` — the daily catch-all report and the job runner that
//! guards it with the leader lease.
//!
//! Collaborators sit behind small traits ([`blob::BlobStore`],
//! [`secrets::SecretStore`], [`notify::Notifier`]) with Azure and Mailgun
//! implementations in [`azure`] and [`mailgun`].

pub mod azure;
pub mod blob;
pub mod error;
pub mod mailgun;
pub mod notify;
pub mod runner;
pub mod secrets;
pub mod tabular;
pub mod workflow;

pub use error::{Result, WorkflowError};
pub use runner::{JobRunner, RunnerState, TickOutcome};
pub use workflow::{ReportOutcome, ReportSettings, ReportWorkflow};
