use chrono::{DateTime, Utc};
use croner::Cron;
use tracing::warn;

use crate::error::{Result, SchedulerError};

/// A parsed five-field crontab expression (`min hour dom month dow`).
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    cron: Cron,
}

impl CronSchedule {
    /// Parse `expression` and make sure it fires at least once more.
    pub fn parse(expression: &str) -> Result<Self> {
        let cron = Cron::new(expression.trim())
            .parse()
            .map_err(|e| SchedulerError::InvalidSchedule {
                expression: expression.to_string(),
                reason: e.to_string(),
            })?;
        let schedule = Self {
            expression: expression.trim().to_string(),
            cron,
        };
        if compute_next_run(&schedule, Utc::now()).is_none() {
            return Err(SchedulerError::Exhausted {
                expression: schedule.expression,
            });
        }
        Ok(schedule)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

/// Compute the next UTC execution time for `schedule` strictly *after* `from`.
///
/// Returns `None` when the expression has no future occurrence.
pub fn compute_next_run(schedule: &CronSchedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule.cron.find_next_occurrence(&from, false) {
        Ok(next) => Some(next),
        Err(e) => {
            warn!(expression = %schedule.expression, "no next occurrence: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).single().unwrap()
    }

    #[test]
    fn daily_seven_am_before_window() {
        let s = CronSchedule::parse("0 7 * * *").unwrap();
        let next = compute_next_run(&s, at(2024, 3, 14, 6, 59, 30)).unwrap();
        assert_eq!(next, at(2024, 3, 14, 7, 0, 0));
    }

    #[test]
    fn daily_seven_am_after_window_rolls_to_tomorrow() {
        let s = CronSchedule::parse("0 7 * * *").unwrap();
        let next = compute_next_run(&s, at(2024, 3, 14, 7, 0, 1)).unwrap();
        assert_eq!(next, at(2024, 3, 15, 7, 0, 0));
    }

    #[test]
    fn exactly_on_occurrence_is_exclusive() {
        let s = CronSchedule::parse("0 7 * * *").unwrap();
        let next = compute_next_run(&s, at(2024, 12, 31, 7, 0, 0)).unwrap();
        assert_eq!(next, at(2025, 1, 1, 7, 0, 0));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = CronSchedule::parse("every morning").unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidSchedule { .. }));
    }

    #[test]
    fn expression_is_trimmed() {
        let s = CronSchedule::parse("  */5 * * * * ").unwrap();
        assert_eq!(s.expression(), "*/5 * * * *");
    }
}
