use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Host identity unavailable: {0}")]
    Identity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReporterError {
    /// Short error code string used as a structured log field.
    pub fn code(&self) -> &'static str {
        match self {
            ReporterError::Config(_) => "CONFIG_ERROR",
            ReporterError::Identity(_) => "IDENTITY_ERROR",
            ReporterError::Io(_) => "IO_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReporterError>;
