use std::time::Duration;

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use tokio::time::Instant;

use crate::error::Result;
use crate::store::LeaseStore;

struct Record {
    value: String,
    expires_at: Instant,
}

impl Record {
    fn live_value(&self, now: Instant) -> Option<&str> {
        (self.expires_at > now).then_some(self.value.as_str())
    }
}

/// In-process lease store with per-key atomic compare-and-swap.
///
/// Expiry follows the tokio clock, so tests can pause and advance time.
/// Replicas sharing one `Arc<MemoryLeaseStore>` behave like processes
/// sharing one Redis key.
#[derive(Default)]
pub struct MemoryLeaseStore {
    entries: DashMap<String, Record>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .and_then(|r| r.live_value(now).map(str::to_string)))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let now = Instant::now();
        let record = Record {
            value: new.to_string(),
            expires_at: now + ttl,
        };

        // The entry guard holds the shard lock for the whole check-and-set.
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut slot) => {
                if slot.get().live_value(now) != expected {
                    return Ok(false);
                }
                slot.insert(record);
            }
            Entry::Vacant(slot) => {
                if expected.is_some() {
                    return Ok(false);
                }
                slot.insert(record);
            }
        }
        Ok(true)
    }
}
