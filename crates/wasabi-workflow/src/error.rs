use thiserror::Error;

/// Anything that can end a report run early.
///
/// None of these touch the lease: the run is logged and the next tick is
/// the retry.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} API error ({status}): {message}")]
    Api {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid storage connection string: {0}")]
    ConnectionString(String),

    #[error("Credential unavailable: {0}")]
    Credential(String),

    #[error("Secret {name:?} is malformed: {reason}")]
    Secret { name: String, reason: String },

    #[error("Column {column:?} not found in CSV header")]
    MissingColumn { column: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl WorkflowError {
    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowError::Http(_) => "http",
            WorkflowError::Api { .. } => "api",
            WorkflowError::ConnectionString(_) => "connection_string",
            WorkflowError::Credential(_) => "credential",
            WorkflowError::Secret { .. } => "secret",
            WorkflowError::MissingColumn { .. } => "missing_column",
            WorkflowError::Csv(_) => "csv",
            WorkflowError::Parse(_) => "parse",
        }
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;
