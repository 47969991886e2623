use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use wasabi_core::ReplicaId;

use crate::error::Result;
use crate::store::LeaseStore;

/// Detailed result of one acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// The key was free and this replica now holds it.
    Acquired,
    /// This replica already held the key and refreshed its TTL.
    Renewed,
    /// Another replica holds an unexpired lease.
    HeldBy(String),
    /// The key changed between our read and our write.
    LostRace,
}

impl Acquisition {
    pub fn is_leader(&self) -> bool {
        matches!(self, Acquisition::Acquired | Acquisition::Renewed)
    }
}

/// Time-bounded leadership over one job key.
///
/// Each call is a single non-blocking attempt: read the holder, and if the
/// key is free or ours, compare-and-swap our identity back in with a fresh
/// TTL. Leadership is never released explicitly; it lapses with the TTL.
pub struct LeaderLease {
    store: Arc<dyn LeaseStore>,
    key: String,
    holder: ReplicaId,
    ttl: Duration,
}

impl LeaderLease {
    pub fn new(store: Arc<dyn LeaseStore>, key: &str, holder: ReplicaId, ttl: Duration) -> Self {
        Self {
            store,
            key: key.to_string(),
            holder,
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn holder(&self) -> &ReplicaId {
        &self.holder
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `true` only when this replica holds the lease for the current tick.
    ///
    /// Store errors are logged and reported as `false`: a replica never
    /// assumes leadership it could not confirm.
    pub async fn try_become_leader(&self) -> bool {
        match self.try_acquire().await {
            Ok(outcome) => {
                match &outcome {
                    Acquisition::Acquired => {
                        info!(key = %self.key, holder = %self.holder, "lease acquired")
                    }
                    Acquisition::Renewed => {
                        info!(key = %self.key, holder = %self.holder, "lease renewed")
                    }
                    Acquisition::HeldBy(other) => {
                        info!(key = %self.key, leader = %other, "lease held by another replica")
                    }
                    Acquisition::LostRace => {
                        info!(key = %self.key, "lost lease race to another replica")
                    }
                }
                outcome.is_leader()
            }
            Err(e) => {
                warn!(
                    key = %self.key,
                    store = self.store.name(),
                    error = %e,
                    "lease store error, not leader this tick"
                );
                false
            }
        }
    }

    /// One acquisition attempt with the detailed outcome.
    pub async fn try_acquire(&self) -> Result<Acquisition> {
        let current = self.store.read(&self.key).await?;
        let renewing = match current.as_deref() {
            None => false,
            Some(h) if h == self.holder.as_str() => true,
            Some(other) => return Ok(Acquisition::HeldBy(other.to_string())),
        };

        debug!(key = %self.key, ?current, "lease eligible, attempting write");
        let swapped = self
            .store
            .compare_and_swap(
                &self.key,
                current.as_deref(),
                self.holder.as_str(),
                self.ttl,
            )
            .await?;

        Ok(match (swapped, renewing) {
            (false, _) => Acquisition::LostRace,
            (true, true) => Acquisition::Renewed,
            (true, false) => Acquisition::Acquired,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LeaseError;
    use crate::memory::MemoryLeaseStore;
    use async_trait::async_trait;

    const KEY: &str = "wasabi-report-lock";
    const TTL: Duration = Duration::from_secs(10);

    fn replica(store: &Arc<MemoryLeaseStore>, name: &str) -> LeaderLease {
        LeaderLease::new(store.clone(), KEY, ReplicaId::from(name), TTL)
    }

    /// Store that lets a competitor write between our read and our swap.
    struct RacingStore {
        inner: MemoryLeaseStore,
        competitor: &'static str,
    }

    #[async_trait]
    impl LeaseStore for RacingStore {
        fn name(&self) -> &str {
            "racing"
        }
        async fn read(&self, key: &str) -> Result<Option<String>> {
            let seen = self.inner.read(key).await?;
            self.inner
                .compare_and_swap(key, seen.as_deref(), self.competitor, TTL)
                .await?;
            Ok(seen)
        }
        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&str>,
            new: &str,
            ttl: Duration,
        ) -> Result<bool> {
            self.inner.compare_and_swap(key, expected, new, ttl).await
        }
    }

    /// Store whose records lapse right after they are read.
    struct LapsingStore {
        inner: MemoryLeaseStore,
    }

    #[async_trait]
    impl LeaseStore for LapsingStore {
        fn name(&self) -> &str {
            "lapsing"
        }
        async fn read(&self, key: &str) -> Result<Option<String>> {
            let seen = self.inner.read(key).await?;
            tokio::time::advance(TTL).await;
            Ok(seen)
        }
        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&str>,
            new: &str,
            ttl: Duration,
        ) -> Result<bool> {
            self.inner.compare_and_swap(key, expected, new, ttl).await
        }
    }

    struct UnreachableStore;

    #[async_trait]
    impl LeaseStore for UnreachableStore {
        fn name(&self) -> &str {
            "unreachable"
        }
        async fn read(&self, _key: &str) -> Result<Option<String>> {
            Err(LeaseError::Unavailable("connection refused".to_string()))
        }
        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<&str>,
            _new: &str,
            _ttl: Duration,
        ) -> Result<bool> {
            Err(LeaseError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn free_key_is_acquired() {
        let store = Arc::new(MemoryLeaseStore::new());
        let a = replica(&store, "A");
        assert_eq!(a.try_acquire().await.unwrap(), Acquisition::Acquired);
        assert_eq!(store.read(KEY).await.unwrap().as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn holder_renews_its_own_lease() {
        let store = Arc::new(MemoryLeaseStore::new());
        let a = replica(&store, "A");
        assert!(a.try_become_leader().await);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(a.try_acquire().await.unwrap(), Acquisition::Renewed);

        // renewal pushed expiry out: 6 + 6 > original 10s window
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.read(KEY).await.unwrap().as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn other_holder_blocks_until_expiry() {
        let store = Arc::new(MemoryLeaseStore::new());
        let a = replica(&store, "A");
        let b = replica(&store, "B");

        assert!(a.try_become_leader().await);
        assert_eq!(
            b.try_acquire().await.unwrap(),
            Acquisition::HeldBy("A".to_string())
        );
        assert!(!b.try_become_leader().await);
    }

    #[tokio::test(start_paused = true)]
    async fn crashed_leader_lease_is_taken_over_after_ttl() {
        let store = Arc::new(MemoryLeaseStore::new());
        let a = replica(&store, "A");
        let b = replica(&store, "B");

        assert!(a.try_become_leader().await);
        // A crashes without releasing anything.
        drop(a);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(b.try_acquire().await.unwrap(), Acquisition::Acquired);
        assert_eq!(store.read(KEY).await.unwrap().as_deref(), Some("B"));
    }

    #[tokio::test(start_paused = true)]
    async fn both_read_absent_first_write_wins() {
        let store = Arc::new(MemoryLeaseStore::new());

        // A and B both observe the key as absent at tick T.
        let seen_by_a = store.read(KEY).await.unwrap();
        let seen_by_b = store.read(KEY).await.unwrap();
        assert_eq!(seen_by_a, None);
        assert_eq!(seen_by_b, None);

        assert!(store
            .compare_and_swap(KEY, seen_by_a.as_deref(), "A", TTL)
            .await
            .unwrap());
        assert!(!store
            .compare_and_swap(KEY, seen_by_b.as_deref(), "B", TTL)
            .await
            .unwrap());
        assert_eq!(store.read(KEY).await.unwrap().as_deref(), Some("A"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_write_between_read_and_swap_loses() {
        let store = Arc::new(RacingStore {
            inner: MemoryLeaseStore::new(),
            competitor: "A",
        });
        let b = LeaderLease::new(store.clone(), KEY, ReplicaId::from("B"), TTL);

        assert_eq!(b.try_acquire().await.unwrap(), Acquisition::LostRace);
        assert!(!b.try_become_leader().await);
        assert_eq!(store.inner.read(KEY).await.unwrap().as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn store_error_means_not_leader() {
        let lease = LeaderLease::new(Arc::new(UnreachableStore), KEY, ReplicaId::from("A"), TTL);
        assert!(lease.try_acquire().await.is_err());
        assert!(!lease.try_become_leader().await);
    }

    #[tokio::test]
    async fn at_most_one_of_many_concurrent_replicas_leads() {
        let store = Arc::new(MemoryLeaseStore::new());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let lease = replica(&store, &format!("replica-{i}"));
            tasks.push(tokio::spawn(async move { lease.try_become_leader().await }));
        }

        let mut leaders = 0;
        for task in tasks {
            if task.await.unwrap() {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn own_lease_lapsing_mid_attempt_defers_to_next_tick() {
        let inner = MemoryLeaseStore::new();
        assert!(inner.compare_and_swap(KEY, None, "A", TTL).await.unwrap());
        let store = Arc::new(LapsingStore { inner });
        let a = LeaderLease::new(store.clone(), KEY, ReplicaId::from("A"), TTL);

        // Read saw our own record, the swap found the key already expired.
        assert_eq!(a.try_acquire().await.unwrap(), Acquisition::LostRace);
        assert_eq!(store.inner.read(KEY).await.unwrap(), None);

        // The key is free now, so the next attempt takes it.
        assert_eq!(a.try_acquire().await.unwrap(), Acquisition::Acquired);
    }
}
