//! Background refresh of today's fixtures and any day with a match in play.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cache::CacheCoordinator;
use crate::models::CacheKey;

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub dates: Vec<CacheKey>,
    /// Dates whose fetch failed, whether or not stale data covered for it.
    pub failed: Vec<CacheKey>,
}

/// Periodically asks the coordinator for the dates that can change.
///
/// It never forces: the freshness policy decides whether a pass actually
/// reaches the provider.
pub struct RefreshScheduler {
    coordinator: CacheCoordinator,
    interval: Duration,
}

impl RefreshScheduler {
    pub fn new(coordinator: CacheCoordinator, interval: Duration) -> Self {
        Self {
            coordinator,
            interval: interval.max(Duration::from_secs(1)),
        }
    }

    /// Today plus every cached date holding an in-progress fixture.
    pub fn targets(&self) -> Vec<CacheKey> {
        let mut dates: BTreeSet<CacheKey> = self.coordinator.live_dates().into_iter().collect();
        dates.insert(self.coordinator.today());
        dates.into_iter().collect()
    }

    pub async fn refresh_once(&self) -> RefreshReport {
        let dates = self.targets();
        let mut failed = Vec::new();

        for &date in &dates {
            match self.coordinator.get_fixtures(date, false).await {
                Ok(read) => {
                    if let Some(e) = &read.fallback_error {
                        warn!(date = %date, error = %e, "Scheduled refresh failed, serving cached data");
                        failed.push(date);
                    } else {
                        debug!(date = %date, fixtures = read.fixtures.len(), "Scheduled refresh checked date");
                    }
                }
                Err(e) => {
                    warn!(date = %date, error = %e, "Scheduled refresh failed");
                    failed.push(date);
                }
            }
        }

        RefreshReport { dates, failed }
    }

    /// Run passes on a fixed interval until the returned handle shuts down.
    /// The first pass runs immediately.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(interval_secs = self.interval.as_secs(), "Refresh scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = self.refresh_once().await;
                        debug!(dates = report.dates.len(), failed = report.failed.len(), "Refresh pass done");
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
            info!("Refresh scheduler stopped");
        });

        SchedulerHandle { shutdown_tx, task }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for it to exit. A pass already running is
    /// allowed to finish.
    pub async fn shutdown(self) {
        self.shutdown_tx.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Refresh scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FreshnessPolicy;
    use crate::clock::ManualClock;
    use crate::error::FetchError;
    use crate::models::{Fixture, FixtureStatus};
    use crate::provider::FixtureProvider;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDate, TimeZone, Utc};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct DayProvider {
        calls: AtomicUsize,
        fail: AtomicBool,
        days: Mutex<HashMap<NaiveDate, Vec<Fixture>>>,
        fetched: Mutex<Vec<NaiveDate>>,
    }

    impl DayProvider {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FixtureProvider for DayProvider {
        async fn fetch(&self, date: NaiveDate, _league_filter: Option<&[i64]>) -> Result<Vec<Fixture>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fetched.lock().push(date);
            if self.fail.load(Ordering::SeqCst) {
                return Err(FetchError::Network("connection reset".into()));
            }
            Ok(self.days.lock().get(&date).cloned().unwrap_or_default())
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, day).unwrap()
    }

    fn setup() -> (Arc<DayProvider>, CacheCoordinator, Arc<ManualClock>) {
        let provider = Arc::new(DayProvider::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let policy = FreshnessPolicy::new(FixedOffset::east_opt(0).unwrap());
        let coordinator = CacheCoordinator::new(provider.clone(), policy, clock.clone());
        (provider, coordinator, clock)
    }

    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_targets_today_and_live_dates() {
        let (provider, coordinator, clock) = setup();
        provider.days.lock().insert(
            date(9),
            vec![Fixture::new(1, FixtureStatus::ExtraTime, t0()).with_score(1, 1)],
        );
        provider
            .days
            .lock()
            .insert(date(8), vec![Fixture::new(2, FixtureStatus::Finished, t0())]);
        coordinator.get_fixtures(date(9), false).await.unwrap();
        coordinator.get_fixtures(date(8), false).await.unwrap();

        let scheduler = RefreshScheduler::new(coordinator, Duration::from_secs(180));
        assert_eq!(
            scheduler.targets(),
            vec![CacheKey::new(date(9)), CacheKey::new(date(10))]
        );

        clock.advance(ChronoDuration::minutes(16));
        let report = scheduler.refresh_once().await;
        assert!(report.failed.is_empty());
        // Two seeds, then today (cold) and the live day (past its 15m TTL).
        assert_eq!(provider.calls(), 4);
        assert_eq!(&provider.fetched.lock()[2..], &[date(9), date(10)]);
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_fatal() {
        let (provider, coordinator, _clock) = setup();
        provider.fail.store(true, Ordering::SeqCst);

        let scheduler = RefreshScheduler::new(coordinator, Duration::from_secs(180));
        let report = scheduler.refresh_once().await;
        assert_eq!(report.failed, vec![CacheKey::new(date(10))]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_relies_on_staleness() {
        let (provider, coordinator, clock) = setup();
        let handle = RefreshScheduler::new(coordinator, Duration::from_secs(180)).spawn();
        settle().await;
        assert_eq!(provider.calls(), 1);

        // A tick while today is still fresh costs nothing.
        tokio::time::sleep(Duration::from_secs(181)).await;
        settle().await;
        assert_eq!(provider.calls(), 1);

        clock.advance(ChronoDuration::minutes(16));
        tokio::time::sleep(Duration::from_secs(180)).await;
        settle().await;
        assert_eq!(provider.calls(), 2);

        handle.shutdown().await;
        clock.advance(ChronoDuration::minutes(16));
        tokio::time::sleep(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(provider.calls(), 2);
    }
}
