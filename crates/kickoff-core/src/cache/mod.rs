//! Per-date fixture cache.
//!
//! - `FixtureStore`: the date → fixtures map, last writer wins by fetch time
//! - `FreshnessPolicy`: 6h TTL for past days, 15m for today, future days and
//!   any day with a match in progress
//! - `CacheCoordinator`: get-or-fetch with coalescing, forced refresh,
//!   invalidation and stale fallback
//! - `SnapshotStore`: optional JSON snapshot on disk

pub mod coordinator;
pub mod freshness;
pub mod snapshot;
pub mod store;

pub use coordinator::{CacheCoordinator, CoordinatorBuilder, EntrySummary, FixtureRead, Freshness};
pub use freshness::{DayClass, FreshnessPolicy};
pub use snapshot::SnapshotStore;
pub use store::{CacheEntry, FixtureStore, PutOutcome, SourceTag};
