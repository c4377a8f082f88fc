use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SubscriptionError;
use crate::models::{FixtureId, LiveDelta};

/// Opaque id the feed hands out per subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// An open subscription to one fixture's deltas.
///
/// The channel closing means the transport disconnected.
pub struct FeedSubscription {
    pub handle: SubscriptionHandle,
    pub deltas: mpsc::Receiver<Result<LiveDelta, SubscriptionError>>,
}

/// Push-based real-time transport for live match deltas.
#[async_trait]
pub trait LiveDeltaFeed: Send + Sync {
    async fn subscribe(&self, fixture_id: FixtureId) -> Result<FeedSubscription, SubscriptionError>;

    /// Release a subscription. Must not block.
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
