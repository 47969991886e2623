use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;
use wasabi_lease::LeaderLease;
use wasabi_scheduler::TickHandler;

use crate::error::WorkflowError;
use crate::workflow::{ReportOutcome, ReportWorkflow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunnerState {
    Idle = 0,
    Executing = 1,
}

impl RunnerState {
    fn from_u8(raw: u8) -> Self {
        if raw == RunnerState::Executing as u8 {
            RunnerState::Executing
        } else {
            RunnerState::Idle
        }
    }
}

/// What a single tick ended up doing.
#[derive(Debug)]
pub enum TickOutcome {
    /// Another replica has this tick (or the store could not confirm us).
    NotLeader,
    Reported(ReportOutcome),
    /// The workflow failed; the lease is left to expire on its own.
    Failed(WorkflowError),
}

/// Runs the report on the ticks this replica wins.
pub struct JobRunner {
    lease: LeaderLease,
    workflow: ReportWorkflow,
    state: AtomicU8,
}

/// Puts the runner back to `Idle` however the run ends.
struct Executing<'a>(&'a AtomicU8);

impl<'a> Executing<'a> {
    fn enter(state: &'a AtomicU8) -> Self {
        state.store(RunnerState::Executing as u8, Ordering::Release);
        Self(state)
    }
}

impl Drop for Executing<'_> {
    fn drop(&mut self) {
        self.0.store(RunnerState::Idle as u8, Ordering::Release);
    }
}

impl JobRunner {
    pub fn new(lease: LeaderLease, workflow: ReportWorkflow) -> Self {
        Self {
            lease,
            workflow,
            state: AtomicU8::new(RunnerState::Idle as u8),
        }
    }

    pub fn state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// One scheduled occurrence: contend for the lease, and report for the
    /// occurrence's UTC date if we win.
    pub async fn tick(&self, scheduled_for: DateTime<Utc>) -> TickOutcome {
        let run_id = Uuid::now_v7();
        let span = info_span!(
            "tick",
            %run_id,
            scheduled_for = %scheduled_for.to_rfc3339(),
            holder = %self.lease.holder(),
        );
        self.run_tick(scheduled_for).instrument(span).await
    }

    async fn run_tick(&self, scheduled_for: DateTime<Utc>) -> TickOutcome {
        if !self.lease.try_become_leader().await {
            info!("not the leader, skipping this tick");
            return TickOutcome::NotLeader;
        }

        let _executing = Executing::enter(&self.state);
        let date = scheduled_for.date_naive();
        info!(%date, "leader for this tick, running report");

        match self.workflow.run(date).await {
            Ok(outcome) => {
                info!(
                    subject = %outcome.subject,
                    file = outcome.file.as_deref().unwrap_or("-"),
                    delivered = outcome.deliveries.iter().filter(|d| d.accepted()).count(),
                    "report finished"
                );
                TickOutcome::Reported(outcome)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "report failed, next tick will retry");
                TickOutcome::Failed(e)
            }
        }
    }
}

#[async_trait]
impl TickHandler for JobRunner {
    async fn on_tick(&self, scheduled_for: DateTime<Utc>) {
        self.tick(scheduled_for).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::TimeZone;
    use wasabi_core::ReplicaId;
    use wasabi_lease::{LeaseStore, MemoryLeaseStore};

    use super::*;
    use crate::blob::UnconfiguredBlobStore;
    use crate::workflow::testing::{RecordingBlobs, RecordingNotifier};
    use crate::workflow::ReportSettings;

    const KEY: &str = "wasabi-report-lock";
    const TTL: Duration = Duration::from_secs(10);
    const FILE: &str = "2024/03/14/wasabi-club/Bink Catch All File.csv";

    /// Sees the key as free but always loses the write.
    struct AlwaysLoses;

    #[async_trait]
    impl LeaseStore for AlwaysLoses {
        fn name(&self) -> &str {
            "always-loses"
        }
        async fn read(&self, _key: &str) -> wasabi_lease::Result<Option<String>> {
            Ok(None)
        }
        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<&str>,
            _new: &str,
            _ttl: Duration,
        ) -> wasabi_lease::Result<bool> {
            Ok(false)
        }
    }

    fn settings() -> ReportSettings {
        ReportSettings {
            folder: "wasabi-club".into(),
            file_name: "Bink Catch All File".into(),
            date_column: "Date".into(),
            subject_prefix: "Wasabi Catch All File".into(),
            from: "Wasabi Report <wasabireport@bink.com>".into(),
            recipients: vec!["ops@example.com".into()],
        }
    }

    struct Harness {
        runner: JobRunner,
        blobs: Arc<RecordingBlobs>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(store: Arc<dyn LeaseStore>, holder: &str, csv: &'static str) -> Harness {
        let blobs = Arc::new(RecordingBlobs::with(vec![(FILE, csv)]));
        let notifier = Arc::new(RecordingNotifier::new(200));
        let workflow = ReportWorkflow::new(blobs.clone(), notifier.clone(), settings());
        let lease = LeaderLease::new(store, KEY, ReplicaId::from(holder), TTL);
        Harness {
            runner: JobRunner::new(lease, workflow),
            blobs,
            notifier,
        }
    }

    fn seven_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, 7, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn leader_reports_for_the_tick_date() {
        let h = harness(Arc::new(MemoryLeaseStore::new()), "a", "Date\n2024-03-13\n");

        let outcome = h.runner.tick(seven_am()).await;
        let TickOutcome::Reported(report) = &outcome else {
            panic!("expected a report, got {outcome:?}");
        };
        assert_eq!(report.subject, "Wasabi Catch All File 2024/03/14");
        assert_eq!(report.body, "Found dates: 2024-03-13");
        assert_eq!(h.notifier.sent().len(), 1);
        assert_eq!(h.runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn losing_the_race_touches_nothing() {
        let h = harness(Arc::new(AlwaysLoses), "b", "Date\n2024-03-13\n");

        assert!(matches!(h.runner.tick(seven_am()).await, TickOutcome::NotLeader));
        assert_eq!(h.blobs.calls(), 0);
        assert!(h.notifier.sent().is_empty());
        assert_eq!(h.runner.state(), RunnerState::Idle);
    }

    #[tokio::test]
    async fn only_one_of_two_replicas_reports() {
        let store = Arc::new(MemoryLeaseStore::new());
        let a = harness(store.clone(), "a", "Date\n2024-03-13\n");
        let b = harness(store, "b", "Date\n2024-03-13\n");

        let (ra, rb) = tokio::join!(a.runner.tick(seven_am()), b.runner.tick(seven_am()));
        let reported = [&ra, &rb]
            .iter()
            .filter(|o| matches!(o, TickOutcome::Reported(_)))
            .count();
        assert_eq!(reported, 1);
        assert_eq!(a.notifier.sent().len() + b.notifier.sent().len(), 1);
        assert_eq!(a.blobs.calls() + b.blobs.calls(), 2);
    }

    #[tokio::test]
    async fn failed_workflow_returns_to_idle_and_keeps_the_lease() {
        let store = Arc::new(MemoryLeaseStore::new());
        let h = harness(store.clone(), "a", "Day\n2024-03-13\n");

        let outcome = h.runner.tick(seven_am()).await;
        assert!(matches!(
            outcome,
            TickOutcome::Failed(WorkflowError::MissingColumn { .. })
        ));
        assert_eq!(h.runner.state(), RunnerState::Idle);
        assert_eq!(store.read(KEY).await.unwrap().as_deref(), Some("a"));
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_storage_fails_each_tick_without_stopping() {
        let store = Arc::new(MemoryLeaseStore::new());
        let notifier = Arc::new(RecordingNotifier::new(200));
        let workflow = ReportWorkflow::new(
            Arc::new(UnconfiguredBlobStore::new("no blob storage connection string")),
            notifier.clone(),
            settings(),
        );
        let lease = LeaderLease::new(store, KEY, ReplicaId::from("a"), TTL);
        let runner = JobRunner::new(lease, workflow);

        for _ in 0..2 {
            assert!(matches!(
                runner.tick(seven_am()).await,
                TickOutcome::Failed(WorkflowError::ConnectionString(_))
            ));
            assert_eq!(runner.state(), RunnerState::Idle);
        }
        assert!(notifier.sent().is_empty());
    }
}
