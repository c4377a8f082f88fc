//! Simulated live feed for the debug driver.
//!
//! Each subscription plays a match forward from its seeded state on a fixed
//! tick, with random goals, the occasional replayed stale delta and the
//! occasional dropped connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use kickoff_core::live::{FeedSubscription, SubscriptionHandle};
use kickoff_core::{Fixture, FixtureId, FixtureStatus, LiveDelta, LiveDeltaFeed, SubscriptionError};

const GOAL_CHANCE: f64 = 0.06;
const STALE_REPLAY_CHANCE: f64 = 0.05;
const DEFAULT_DISCONNECT_CHANCE: f64 = 0.02;

#[derive(Debug, Clone, PartialEq, Eq)]
struct MatchState {
    status: FixtureStatus,
    home: u32,
    away: u32,
    minute: u32,
}

impl MatchState {
    fn from_fixture(fixture: &Fixture) -> Self {
        Self {
            status: if fixture.is_live() { fixture.status } else { FixtureStatus::FirstHalf },
            home: fixture.home_goals.unwrap_or(0),
            away: fixture.away_goals.unwrap_or(0),
            minute: fixture.elapsed_minutes.unwrap_or(1),
        }
    }

    /// Play one tick. Returns false once the match is over.
    fn step(&mut self, rng: &mut impl Rng) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        match self.status {
            FixtureStatus::HalfTime => {
                self.status = FixtureStatus::SecondHalf;
                self.minute = self.minute.max(46);
            }
            FixtureStatus::BreakTime => {
                self.status = FixtureStatus::ExtraTime;
                self.minute = self.minute.max(91);
            }
            _ => {
                self.minute += rng.gen_range(1..=3);
                if rng.gen_bool(GOAL_CHANCE) {
                    if rng.gen_bool(0.5) {
                        self.home += 1;
                    } else {
                        self.away += 1;
                    }
                }
                self.status = match self.status {
                    FixtureStatus::Penalties => FixtureStatus::FinishedAfterPenalties,
                    FixtureStatus::FirstHalf if self.minute >= 45 => FixtureStatus::HalfTime,
                    FixtureStatus::ExtraTime if self.minute >= 120 => FixtureStatus::FinishedAfterExtraTime,
                    FixtureStatus::ExtraTime => FixtureStatus::ExtraTime,
                    FixtureStatus::FirstHalf => FixtureStatus::FirstHalf,
                    _ if self.minute >= 90 => FixtureStatus::Finished,
                    _ => FixtureStatus::SecondHalf,
                };
            }
        }
        true
    }

    fn delta(&self, fixture_id: FixtureId, event_timestamp: i64) -> LiveDelta {
        LiveDelta {
            fixture_id,
            status: self.status,
            home_goals: Some(self.home),
            away_goals: Some(self.away),
            elapsed_minutes: Some(self.minute),
            event_timestamp,
        }
    }
}

pub struct SimulatedFeed {
    tick: Duration,
    disconnect_chance: f64,
    next_handle: AtomicU64,
    /// Latest state per fixture, shared with the playing tasks.
    seeds: Arc<Mutex<HashMap<FixtureId, MatchState>>>,
    tasks: Mutex<HashMap<SubscriptionHandle, JoinHandle<()>>>,
}

impl SimulatedFeed {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            disconnect_chance: DEFAULT_DISCONNECT_CHANCE,
            next_handle: AtomicU64::new(1),
            seeds: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_disconnect_chance(mut self, chance: f64) -> Self {
        self.disconnect_chance = chance.clamp(0.0, 1.0);
        self
    }

    /// Start the simulated match for `fixture` from its cached score.
    /// Reconnects resume from wherever the match had got to.
    pub fn seed(&self, fixture: &Fixture) {
        self.seeds.lock().insert(fixture.id, MatchState::from_fixture(fixture));
    }

    fn play(&self, fixture_id: FixtureId, tx: mpsc::Sender<Result<LiveDelta, SubscriptionError>>) -> JoinHandle<()> {
        let tick = self.tick;
        let disconnect_chance = self.disconnect_chance;
        let seeds = Arc::clone(&self.seeds);
        let mut state = self
            .seeds
            .lock()
            .get(&fixture_id)
            .cloned()
            .unwrap_or(MatchState {
                status: FixtureStatus::FirstHalf,
                home: 0,
                away: 0,
                minute: 1,
            });

        tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut clock: i64 = chrono::Utc::now().timestamp_millis();
            let mut previous: Option<LiveDelta> = None;

            loop {
                tokio::time::sleep(tick).await;
                if rng.gen_bool(disconnect_chance) {
                    info!(fixture_id, "Simulated feed dropping connection");
                    return;
                }
                if let Some(stale) = previous.as_ref().filter(|_| rng.gen_bool(STALE_REPLAY_CHANCE)) {
                    debug!(fixture_id, event_timestamp = stale.event_timestamp, "Replaying stale delta");
                    if tx.send(Ok(stale.clone())).await.is_err() {
                        return;
                    }
                }

                let playing = state.step(&mut rng);
                seeds.lock().insert(fixture_id, state.clone());
                clock += tick.as_millis() as i64;
                let delta = state.delta(fixture_id, clock);
                if tx.send(Ok(delta.clone())).await.is_err() || !playing {
                    return;
                }
                previous = Some(delta);
            }
        })
    }
}

#[async_trait]
impl LiveDeltaFeed for SimulatedFeed {
    async fn subscribe(&self, fixture_id: FixtureId) -> Result<FeedSubscription, SubscriptionError> {
        let handle = SubscriptionHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        let (tx, rx) = mpsc::channel(64);
        let task = self.play(fixture_id, tx);
        self.tasks.lock().insert(handle, task);
        debug!(fixture_id, ?handle, "Simulated subscription opened");
        Ok(FeedSubscription { handle, deltas: rx })
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(task) = self.tasks.lock().remove(&handle) {
            task.abort();
            debug!(?handle, "Simulated subscription closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_match_plays_to_full_time() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut state = MatchState {
            status: FixtureStatus::FirstHalf,
            home: 0,
            away: 0,
            minute: 1,
        };

        let mut saw_half_time = false;
        let mut last_minute = 0;
        let mut steps = 0;
        while state.step(&mut rng) {
            saw_half_time |= state.status == FixtureStatus::HalfTime;
            assert!(state.minute >= last_minute);
            last_minute = state.minute;
            steps += 1;
            assert!(steps < 200, "match never ended");
        }
        assert!(saw_half_time);
        assert_eq!(state.status, FixtureStatus::Finished);
    }

    #[test]
    fn test_seed_keeps_cached_score() {
        let kickoff = Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap();
        let mut fixture = Fixture::new(555, FixtureStatus::SecondHalf, kickoff).with_score(1, 0);
        fixture.elapsed_minutes = Some(60);

        let state = MatchState::from_fixture(&fixture);
        assert_eq!((state.home, state.away, state.minute), (1, 0, 60));
        assert_eq!(state.status, FixtureStatus::SecondHalf);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_emits_increasing_timestamps() {
        let feed = SimulatedFeed::new(Duration::from_secs(1)).with_disconnect_chance(0.0);
        let mut sub = feed.subscribe(9).await.unwrap();

        let mut timestamps = Vec::new();
        for _ in 0..5 {
            let delta = sub.deltas.recv().await.unwrap().unwrap();
            assert_eq!(delta.fixture_id, 9);
            timestamps.push(delta.event_timestamp);
        }
        // Replays repeat the previous delta, so the stream never goes backwards.
        assert!(timestamps.windows(2).all(|w| w[1] >= w[0]));
        assert!(timestamps[4] > timestamps[0]);

        feed.unsubscribe(sub.handle);
        assert!(feed.tasks.lock().is_empty());
    }
}
