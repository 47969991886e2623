//! `wasabi-scheduler` — cron-driven tick loop.
//!
//! # Overview
//!
//! [`engine::SchedulerEngine`] sleeps until the next occurrence of a
//! [`schedule::CronSchedule`], hands the tick to a [`engine::TickHandler`],
//! waits for it to finish, then computes the following occurrence. Ticks
//! never overlap: an occurrence that passes while a handler is still running
//! is skipped rather than queued.
//!
//! All times are UTC.

pub mod engine;
pub mod error;
pub mod schedule;

pub use engine::{SchedulerEngine, TickHandler};
pub use error::{Result, SchedulerError};
pub use schedule::CronSchedule;
