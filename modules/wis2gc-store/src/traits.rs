use std::time::Duration;

use async_trait::async_trait;

use wis2gc_common::Wis2Error;

/// Shared key/value store backing per-`data_id` dedup records and the
/// centre/dataserver metric counters and gauges (C2).
///
/// Every operation is bounded by an explicit timeout in the implementation
/// and fails with `Wis2Error::StoreUnavailable` rather than blocking
/// indefinitely — callers never need their own timeout wrapper.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Linearizable read of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, Wis2Error>;

    /// Unconditional set with a TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), Wis2Error>;

    /// Atomic increment of an integer counter, returning the new value.
    async fn incr(&self, key: &str, delta: i64) -> Result<i64, Wis2Error>;

    /// Set only if `key` is currently absent; returns whether the set took
    /// effect. Not used by the pipeline's current call sites — kept for
    /// completeness per the C2 contract.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, Wis2Error>;
}
