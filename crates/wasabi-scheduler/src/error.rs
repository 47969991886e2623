use thiserror::Error;

/// Errors that can occur within the scheduler subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("Invalid schedule {expression:?}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    /// The expression parses but never fires again.
    #[error("Schedule {expression:?} has no upcoming occurrence")]
    Exhausted { expression: String },
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
