//! `wasabi-lease` — single-runner election over a shared key-value store.
//!
//! # Overview
//!
//! Every replica runs the same cron trigger. On each tick it asks
//! [`manager::LeaderLease`] whether it may run the job. The manager reads the
//! current holder of a fixed key and, when the key is free or already held by
//! this replica, writes its own identity back with a short TTL through the
//! store's compare-and-swap. Whichever write lands first wins; the others see
//! a conflict and sit the tick out.
//!
//! The lease is never released. It expires on its own, so a crashed leader
//! only blocks the slot for one TTL window.
//!
//! | Store                      | Use                                      |
//! |----------------------------|------------------------------------------|
//! | [`RedisLeaseStore`]        | Production: `WATCH`/`MULTI`/`EXEC`       |
//! | [`MemoryLeaseStore`]       | Tests and single-process runs            |

pub mod error;
pub mod manager;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{LeaseError, Result};
pub use manager::{Acquisition, LeaderLease};
pub use memory::MemoryLeaseStore;
pub use redis_store::RedisLeaseStore;
pub use store::LeaseStore;
