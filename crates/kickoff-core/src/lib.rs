//! Kickoff core - fixture cache and live score overlay for a football app.
//!
//! Fixture lists are cached per calendar day with date-dependent TTLs;
//! concurrent requests for the same day share one provider fetch. Matches in
//! progress get real-time score deltas merged over the cached fixture
//! without touching the cache.
//!
//! # Modules
//!
//! - [`cache`]: store, freshness policy, fetch coordinator, disk snapshot
//! - [`live`]: live delta feed trait and the overlay engine
//! - [`scheduler`]: periodic refresh of today and in-play days
//! - [`signals`]: cache control messages (clear, invalidate a day)
//! - [`config`]: user configuration
//! - [`models`]: fixtures, deltas, merged scores

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod live;
pub mod models;
pub mod provider;
pub mod scheduler;
pub mod signals;

pub use cache::{CacheCoordinator, FixtureRead, FreshnessPolicy, SnapshotStore};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{FetchError, SubscriptionError};
pub use live::{ExponentialBackoff, LiveDeltaFeed, LiveOverlayEngine, LiveScoreHandle};
pub use models::{CacheKey, Fixture, FixtureId, FixtureStatus, LiveDelta, LiveScore};
pub use provider::FixtureProvider;
pub use scheduler::{RefreshScheduler, SchedulerHandle};
pub use signals::{spawn_control_listener, CacheControl};
