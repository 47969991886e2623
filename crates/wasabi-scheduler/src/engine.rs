use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info};

use crate::schedule::{compute_next_run, CronSchedule};

/// Callback fired once per schedule occurrence.
#[async_trait]
pub trait TickHandler: Send + Sync {
    /// Handle the occurrence planned for `scheduled_for`.
    ///
    /// Must not panic on ordinary failures; the engine keeps ticking
    /// regardless of what a single tick did.
    async fn on_tick(&self, scheduled_for: DateTime<Utc>);
}

/// Drives one [`TickHandler`] from a cron schedule.
pub struct SchedulerEngine {
    schedule: CronSchedule,
    handler: Arc<dyn TickHandler>,
}

impl SchedulerEngine {
    pub fn new(schedule: CronSchedule, handler: Arc<dyn TickHandler>) -> Self {
        Self { schedule, handler }
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true` or its
    /// sender is dropped. Shutdown is observed between ticks only; a tick in
    /// progress always runs to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(cron = %self.schedule.expression(), "scheduler engine started");
        let mut last_fired: Option<DateTime<Utc>> = None;

        loop {
            // Never fire the same occurrence twice, even if the timer woke a
            // hair before the wall clock reached it.
            let from = match last_fired {
                Some(prev) => prev.max(Utc::now()),
                None => Utc::now(),
            };
            let Some(next) = compute_next_run(&self.schedule, from) else {
                error!(cron = %self.schedule.expression(), "schedule exhausted, stopping engine");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            info!(next_run = %next.to_rfc3339(), "waiting for next tick");

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
                _ = tokio::time::sleep(wait) => {
                    last_fired = Some(next);
                    self.handler.on_tick(next).await;
                }
            }
        }
    }
}
