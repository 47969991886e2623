use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use crate::error::{LeaseError, Result};
use crate::store::LeaseStore;

/// Lease store backed by a shared Redis instance.
///
/// The client lives as long as the process; every operation opens its own
/// connection and drops it when the call returns, so a `WATCH` never leaks
/// into another caller's commands.
pub struct RedisLeaseStore {
    client: redis::Client,
}

impl RedisLeaseStore {
    /// Parse `url` (e.g. `redis://redis:6379/0`). Does not connect yet.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| LeaseError::Config(format!("bad redis url {url:?}: {e}")))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| LeaseError::Unavailable(e.to_string()))
    }
}

/// Redis `EX` takes whole seconds; sub-second TTLs round up to one.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn read(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.connection().await?;
        if !watch_matching(&mut conn, key, expected).await? {
            return Ok(false);
        }
        commit_watched(&mut conn, key, new, ttl).await
    }
}

/// `WATCH` the key and check it still holds `expected`. On a mismatch the
/// watch is dropped and `false` returned.
async fn watch_matching(
    conn: &mut redis::aio::MultiplexedConnection,
    key: &str,
    expected: Option<&str>,
) -> Result<bool> {
    let _: () = redis::cmd("WATCH").arg(key).query_async(conn).await?;
    let current: Option<String> = conn.get(key).await?;
    if current.as_deref() != expected {
        debug!(%key, ?current, ?expected, "lease value changed before write");
        let _: () = redis::cmd("UNWATCH").query_async(conn).await?;
        return Ok(false);
    }
    Ok(true)
}

/// `MULTI` / `SET key value EX ttl` / `EXEC` on a watched connection.
/// `false` when the key was touched after `WATCH`.
async fn commit_watched(
    conn: &mut redis::aio::MultiplexedConnection,
    key: &str,
    new: &str,
    ttl: Duration,
) -> Result<bool> {
    // EXEC replies nil when the watched key changed.
    let committed: Option<redis::Value> = redis::pipe()
        .atomic()
        .cmd("SET")
        .arg(key)
        .arg(new)
        .arg("EX")
        .arg(ttl_secs(ttl))
        .query_async(conn)
        .await?;
    if committed.is_none() {
        debug!(%key, "lease key changed between watch and exec");
    }
    Ok(committed.is_some())
}
