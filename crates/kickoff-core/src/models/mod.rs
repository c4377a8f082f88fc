//! Data models shared by the cache and the live overlay.
//!
//! - `Fixture`, `FixtureStatus`, `CacheKey`: the cached match list for a day
//! - `LiveDelta`, `LiveScore`: real-time updates and the merged score views render

pub mod fixture;
pub mod live;

pub use fixture::{CacheKey, Fixture, FixtureId, FixtureStatus};
pub use live::{LiveDelta, LiveScore, ScoreOrigin};
