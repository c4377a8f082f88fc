//! Live match overlay.
//!
//! - `LiveDeltaFeed`: the push transport, one subscription per fixture
//! - `LiveOverlayEngine`: reference-counted subscriptions and merged scores
//! - `ExponentialBackoff`: reconnect pacing after disconnects

pub mod backoff;
pub mod feed;
pub mod overlay;

pub use backoff::ExponentialBackoff;
pub use feed::{FeedSubscription, LiveDeltaFeed, SubscriptionHandle};
pub use overlay::{LiveOverlayEngine, LiveScoreHandle};
