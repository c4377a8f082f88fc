//! Live score overlay on top of cached fixtures.
//!
//! Each watched fixture goes Unwatched → Subscribed → Terminated. Observers
//! of the same fixture share one feed subscription; the last observer
//! leaving, or the match leaving play, closes it and drops the overlay state.
//! The cached fixture list is never touched.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backoff::ExponentialBackoff;
use super::feed::{LiveDeltaFeed, SubscriptionHandle};
use crate::models::{Fixture, FixtureId, FixtureStatus, LiveDelta, LiveScore};

/// Subscription state for one watched fixture.
struct Watch {
    generation: u64,
    observers: usize,
    baseline: Fixture,
    overlay: Option<LiveDelta>,
    outdated: bool,
    scores: watch::Sender<LiveScore>,
    task: JoinHandle<()>,
}

impl Watch {
    fn current_score(&self) -> LiveScore {
        let mut score = LiveScore::merge(&self.baseline, self.overlay.as_ref());
        score.outdated = self.outdated;
        score
    }

    fn publish(&self) {
        self.scores.send_replace(self.current_score());
    }
}

/// A suspended match may resume, so it keeps its subscription. Any other
/// status outside play (finished, postponed, back to not started) ends it.
fn ends_live_coverage(status: FixtureStatus) -> bool {
    !status.is_in_progress() && status != FixtureStatus::Suspended
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeltaOutcome {
    Applied,
    Dropped,
    Terminated,
    /// The watch this task served is gone (or was replaced).
    Gone,
}

struct EngineInner {
    feed: Arc<dyn LiveDeltaFeed>,
    backoff: ExponentialBackoff,
    watches: Mutex<HashMap<FixtureId, Watch>>,
    next_generation: Mutex<u64>,
}

/// Merges real-time deltas over cached fixtures for the matches views are
/// looking at. Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct LiveOverlayEngine {
    inner: Arc<EngineInner>,
}

struct ObserverTicket {
    engine: Weak<EngineInner>,
    fixture_id: FixtureId,
    generation: u64,
}

/// A view's claim on one fixture's live score. Dropping it (or passing it
/// to `stop_observing`) releases the claim.
pub struct LiveScoreHandle {
    fixture_id: FixtureId,
    scores: watch::Receiver<LiveScore>,
    ticket: Option<ObserverTicket>,
}

impl LiveScoreHandle {
    pub fn fixture_id(&self) -> FixtureId {
        self.fixture_id
    }

    /// True when backed by a feed subscription, false for a fixture that
    /// was not in progress when observed.
    pub fn is_live(&self) -> bool {
        self.ticket.is_some()
    }

    pub fn current(&self) -> LiveScore {
        self.scores.borrow().clone()
    }

    /// Wait for the next score. False once no more updates will come.
    pub async fn changed(&mut self) -> bool {
        self.scores.changed().await.is_ok()
    }
}

impl Drop for LiveScoreHandle {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            if let Some(engine) = ticket.engine.upgrade() {
                engine.release(ticket.fixture_id, ticket.generation);
            }
        }
    }
}

impl LiveOverlayEngine {
    pub fn new(feed: Arc<dyn LiveDeltaFeed>, backoff: ExponentialBackoff) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                feed,
                backoff,
                watches: Mutex::new(HashMap::new()),
                next_generation: Mutex::new(0),
            }),
        }
    }

    /// Start observing `fixture`'s score.
    ///
    /// Only an in-progress fixture opens (or joins) a feed subscription;
    /// anything else gets a handle fixed at its cached score.
    pub fn observe_live_score(&self, fixture: &Fixture) -> LiveScoreHandle {
        if !fixture.is_live() {
            let (_tx, rx) = watch::channel(LiveScore::merge(fixture, None));
            return LiveScoreHandle {
                fixture_id: fixture.id,
                scores: rx,
                ticket: None,
            };
        }

        let mut watches = self.inner.watches.lock();
        if let Some(existing) = watches.get_mut(&fixture.id) {
            existing.observers += 1;
            existing.baseline = fixture.clone();
            existing.publish();
            debug!(fixture_id = fixture.id, observers = existing.observers, "Joined live subscription");
            return LiveScoreHandle {
                fixture_id: fixture.id,
                scores: existing.scores.subscribe(),
                ticket: Some(self.ticket(fixture.id, existing.generation)),
            };
        }

        let generation = {
            let mut next = self.inner.next_generation.lock();
            *next += 1;
            *next
        };
        let (tx, rx) = watch::channel(LiveScore::merge(fixture, None));
        let task = tokio::spawn(run_subscription(Arc::clone(&self.inner), fixture.id, generation));
        watches.insert(
            fixture.id,
            Watch {
                generation,
                observers: 1,
                baseline: fixture.clone(),
                overlay: None,
                outdated: false,
                scores: tx,
                task,
            },
        );
        info!(fixture_id = fixture.id, generation, "Live subscription opened");

        LiveScoreHandle {
            fixture_id: fixture.id,
            scores: rx,
            ticket: Some(self.ticket(fixture.id, generation)),
        }
    }

    fn ticket(&self, fixture_id: FixtureId, generation: u64) -> ObserverTicket {
        ObserverTicket {
            engine: Arc::downgrade(&self.inner),
            fixture_id,
            generation,
        }
    }

    /// Release `handle`'s share of its fixture's subscription.
    pub fn stop_observing(&self, handle: LiveScoreHandle) {
        drop(handle);
    }

    /// Latest accepted delta for a watched fixture.
    pub fn overlay_state(&self, fixture_id: FixtureId) -> Option<LiveDelta> {
        self.inner
            .watches
            .lock()
            .get(&fixture_id)
            .and_then(|w| w.overlay.clone())
    }

    pub fn observer_count(&self, fixture_id: FixtureId) -> usize {
        self.inner
            .watches
            .lock()
            .get(&fixture_id)
            .map_or(0, |w| w.observers)
    }

    pub fn active_subscriptions(&self) -> usize {
        self.inner.watches.lock().len()
    }
}

impl EngineInner {
    fn release(&self, fixture_id: FixtureId, generation: u64) {
        let mut watches = self.watches.lock();
        let Some(watch) = watches.get_mut(&fixture_id) else {
            return;
        };
        if watch.generation != generation {
            return;
        }
        watch.observers = watch.observers.saturating_sub(1);
        if watch.observers > 0 {
            debug!(fixture_id, observers = watch.observers, "Observer left live subscription");
            return;
        }
        if let Some(watch) = watches.remove(&fixture_id) {
            watch.task.abort();
            info!(fixture_id, generation, "Live subscription closed, no observers left");
        }
    }

    fn apply_delta(&self, fixture_id: FixtureId, generation: u64, delta: LiveDelta) -> DeltaOutcome {
        let mut watches = self.watches.lock();
        let Some(watch) = watches
            .get_mut(&fixture_id)
            .filter(|w| w.generation == generation)
        else {
            return DeltaOutcome::Gone;
        };

        if delta.fixture_id != fixture_id || !delta.supersedes(watch.overlay.as_ref()) {
            debug!(
                fixture_id,
                event_timestamp = delta.event_timestamp,
                applied = ?watch.overlay.as_ref().map(|d| d.event_timestamp),
                "Dropping out-of-order delta"
            );
            return DeltaOutcome::Dropped;
        }

        let status = delta.status;
        watch.overlay = Some(delta);
        watch.outdated = false;
        watch.publish();

        if ends_live_coverage(status) {
            watches.remove(&fixture_id);
            info!(fixture_id, generation, %status, "Fixture no longer in play, live subscription closed");
            return DeltaOutcome::Terminated;
        }
        DeltaOutcome::Applied
    }

    /// Flag the score as possibly out of date. False if the watch is gone.
    fn set_outdated(&self, fixture_id: FixtureId, generation: u64, outdated: bool) -> bool {
        let mut watches = self.watches.lock();
        match watches.get_mut(&fixture_id) {
            Some(watch) if watch.generation == generation => {
                if watch.outdated != outdated {
                    watch.outdated = outdated;
                    watch.publish();
                }
                true
            }
            _ => false,
        }
    }
}

/// Calls the feed's `unsubscribe` when the subscription loop lets go of a
/// subscription, including when its task is aborted.
struct UnsubscribeOnDrop {
    feed: Arc<dyn LiveDeltaFeed>,
    handle: SubscriptionHandle,
}

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        self.feed.unsubscribe(self.handle);
    }
}

async fn run_subscription(inner: Arc<EngineInner>, fixture_id: FixtureId, generation: u64) {
    let mut attempt = 0;
    loop {
        match inner.feed.subscribe(fixture_id).await {
            Ok(subscription) => {
                let _guard = UnsubscribeOnDrop {
                    feed: Arc::clone(&inner.feed),
                    handle: subscription.handle,
                };
                if !inner.set_outdated(fixture_id, generation, false) {
                    return;
                }
                attempt = 0;
                debug!(fixture_id, handle = ?subscription.handle, "Subscribed to live feed");

                let mut deltas = subscription.deltas;
                loop {
                    match deltas.recv().await {
                        Some(Ok(delta)) => match inner.apply_delta(fixture_id, generation, delta) {
                            DeltaOutcome::Applied | DeltaOutcome::Dropped => {}
                            DeltaOutcome::Terminated | DeltaOutcome::Gone => return,
                        },
                        Some(Err(e)) if !e.is_retryable() => {
                            warn!(fixture_id, error = %e, "Live feed refused subscription");
                            inner.set_outdated(fixture_id, generation, true);
                            return;
                        }
                        Some(Err(e)) => {
                            warn!(fixture_id, error = %e, "Live feed error, reconnecting");
                            break;
                        }
                        None => {
                            warn!(fixture_id, "Live feed disconnected, reconnecting");
                            break;
                        }
                    }
                }
            }
            Err(e) if !e.is_retryable() => {
                warn!(fixture_id, error = %e, "Live feed refused subscription");
                inner.set_outdated(fixture_id, generation, true);
                return;
            }
            Err(e) => {
                warn!(fixture_id, attempt, error = %e, "Live feed subscribe failed");
            }
        }

        match inner.backoff.next_delay(attempt) {
            Some(delay) => {
                attempt += 1;
                debug!(fixture_id, attempt, ?delay, "Waiting before live feed reconnect");
                tokio::time::sleep(delay).await;
            }
            None => {
                warn!(fixture_id, attempts = attempt, "Giving up on live feed, score may be outdated");
                inner.set_outdated(fixture_id, generation, true);
                return;
            }
        }
    }
}
