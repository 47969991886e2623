use thiserror::Error;

/// Errors raised while talking to the lease store.
///
/// The manager never lets these escape as leadership: any error means
/// "not leader this tick".
#[derive(Debug, Error)]
pub enum LeaseError {
    /// Redis command failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The store URL or options could not be used.
    #[error("Invalid store configuration: {0}")]
    Config(String),

    /// The store could not be reached.
    #[error("Lease store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, LeaseError>;
