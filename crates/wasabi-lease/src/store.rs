use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Minimal capability a shared key-value store must offer to host a lease.
///
/// Implementations must be `Send + Sync` so one store can back every tick of
/// the scheduler without extra locking.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Store name for logging and error messages.
    fn name(&self) -> &str;

    /// Current live value of `key`, or `None` when absent or expired.
    async fn read(&self, key: &str) -> Result<Option<String>>;

    /// Write `new` with a fresh `ttl`, but only if the live value of `key`
    /// still equals `expected` (`None` meaning absent) and nobody else
    /// modified `key` while the write was being prepared.
    ///
    /// Returns `Ok(false)` on conflict. Never retries.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool>;
}
