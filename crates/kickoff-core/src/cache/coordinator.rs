//! Get-or-fetch orchestration over the fixture store.
//!
//! One in-flight provider fetch per date: callers arriving while a fetch is
//! outstanding await the same shared result. Fetches run in their own task,
//! so a caller that gives up does not cancel the fetch for the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::freshness::FreshnessPolicy;
use super::snapshot::SnapshotStore;
use super::store::{CacheEntry, FixtureStore, PutOutcome, SourceTag};
use crate::clock::Clock;
use crate::error::FetchError;
use crate::models::{CacheKey, Fixture};
use crate::provider::FixtureProvider;

/// Fetch timeout when none is configured.
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

type SharedFetch = Shared<BoxFuture<'static, Result<CacheEntry, FetchError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Served past its TTL because the refetch failed.
    Stale,
}

/// Fixtures for one date as returned to a caller.
#[derive(Debug, Clone)]
pub struct FixtureRead {
    pub key: CacheKey,
    pub fixtures: Arc<[Fixture]>,
    pub fetched_at: DateTime<Utc>,
    pub source: SourceTag,
    pub freshness: Freshness,
    /// Set when the provider failed and cached data was served instead.
    pub fallback_error: Option<FetchError>,
}

impl FixtureRead {
    fn from_entry(entry: CacheEntry, freshness: Freshness, fallback_error: Option<FetchError>) -> Self {
        Self {
            key: entry.key,
            fixtures: entry.fixtures,
            fetched_at: entry.fetched_at,
            source: entry.source,
            freshness,
            fallback_error,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback_error.is_some()
    }
}

/// Per-entry info for debug screens.
#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub key: CacheKey,
    pub fixture_count: usize,
    pub live_count: usize,
    pub age: String,
    pub expires_in_minutes: i64,
    pub source: SourceTag,
    pub stale: bool,
}

struct InFlight {
    seq: u64,
    fetch: SharedFetch,
}

/// Bookkeeping for outstanding fetches and invalidations.
///
/// Every fetch and every invalidation takes a sequence number; a fetch that
/// started before its date was invalidated must not write its result back.
#[derive(Default)]
struct FetchRegistry {
    next_seq: u64,
    /// The fetch new readers join, per date.
    in_flight: HashMap<CacheKey, InFlight>,
    /// Every fetch still running per date, including ones no longer joinable
    /// after a forced refresh or invalidation replaced them.
    running: HashMap<CacheKey, Vec<u64>>,
    /// Kept only while a fetch older than the invalidation is running.
    invalidated_at: HashMap<CacheKey, u64>,
    cleared_at: u64,
}

impl FetchRegistry {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn invalidated_since(&self, key: CacheKey, seq: u64) -> bool {
        self.cleared_at > seq || self.invalidated_at.get(&key).is_some_and(|&at| at > seq)
    }

    fn start(&mut self, key: CacheKey, seq: u64) {
        self.running.entry(key).or_default().push(seq);
    }

    /// Record an invalidation; only matters to fetches already running.
    fn invalidate(&mut self, key: CacheKey) {
        let seq = self.next_seq();
        self.in_flight.remove(&key);
        if self.running.get(&key).is_some_and(|r| !r.is_empty()) {
            self.invalidated_at.insert(key, seq);
        } else {
            self.invalidated_at.remove(&key);
        }
    }

    /// Mark fetch `seq` finished. Returns whether its date was invalidated
    /// (or the cache cleared) after it started.
    fn finish(&mut self, key: CacheKey, seq: u64) -> bool {
        if self.in_flight.get(&key).is_some_and(|f| f.seq == seq) {
            self.in_flight.remove(&key);
        }
        let invalidated = self.invalidated_since(key, seq);

        let oldest_running = match self.running.get_mut(&key) {
            Some(running) => {
                running.retain(|&s| s != seq);
                running.iter().min().copied()
            }
            None => None,
        };
        if oldest_running.is_none() {
            self.running.remove(&key);
        }
        let still_needed = matches!(
            (oldest_running, self.invalidated_at.get(&key)),
            (Some(oldest), Some(&at)) if oldest < at
        );
        if !still_needed {
            self.invalidated_at.remove(&key);
        }
        invalidated
    }
}

/// Options fixed before the coordinator is shared.
pub struct CoordinatorBuilder {
    provider: Arc<dyn FixtureProvider>,
    policy: FreshnessPolicy,
    clock: Arc<dyn Clock>,
    fetch_timeout: Duration,
    league_filter: Option<Vec<i64>>,
}

impl CoordinatorBuilder {
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn league_filter(mut self, leagues: Option<Vec<i64>>) -> Self {
        self.league_filter = leagues;
        self
    }

    pub fn build(self) -> CacheCoordinator {
        CacheCoordinator {
            inner: Arc::new(Inner {
                store: FixtureStore::new(),
                policy: self.policy,
                provider: self.provider,
                clock: self.clock,
                registry: Mutex::new(FetchRegistry::default()),
                league_filter: RwLock::new(self.league_filter),
                fetch_timeout: self.fetch_timeout,
            }),
        }
    }
}

struct Inner {
    store: FixtureStore,
    policy: FreshnessPolicy,
    provider: Arc<dyn FixtureProvider>,
    clock: Arc<dyn Clock>,
    registry: Mutex<FetchRegistry>,
    league_filter: RwLock<Option<Vec<i64>>>,
    fetch_timeout: Duration,
}

/// Cache front door for views. Cloning is cheap and shares all state.
#[derive(Clone)]
pub struct CacheCoordinator {
    inner: Arc<Inner>,
}

impl CacheCoordinator {
    /// Coordinator with the default fetch timeout and no league filter.
    pub fn new(
        provider: Arc<dyn FixtureProvider>,
        policy: FreshnessPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::builder(provider, policy, clock).build()
    }

    pub fn builder(
        provider: Arc<dyn FixtureProvider>,
        policy: FreshnessPolicy,
        clock: Arc<dyn Clock>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            provider,
            policy,
            clock,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            league_filter: None,
        }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.inner.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Today's key under the configured offset.
    pub fn today(&self) -> CacheKey {
        self.inner.policy.today(self.now())
    }

    /// Fixtures for `date`, from cache when fresh, otherwise from the provider.
    ///
    /// `force_refresh` always issues a new provider fetch. If the provider
    /// fails and anything is cached for the date, that is returned with
    /// `fallback_error` set instead of failing.
    pub async fn get_fixtures(
        &self,
        date: impl Into<CacheKey>,
        force_refresh: bool,
    ) -> Result<FixtureRead, FetchError> {
        let key = date.into();
        let fetch = {
            let mut registry = self.inner.registry.lock();
            if force_refresh {
                debug!(date = %key, "Forced refresh");
                self.start_fetch(&mut registry, key, SourceTag::ForcedRefresh)
            } else {
                let now = self.now();
                match self.inner.store.get(key) {
                    Some(entry) if !self.inner.policy.is_stale(&entry, now) => {
                        debug!(date = %key, age = %entry.age_display(now), "Cache hit");
                        return Ok(FixtureRead::from_entry(entry, Freshness::Fresh, None));
                    }
                    Some(_) => debug!(date = %key, "Cache entry stale"),
                    None => debug!(date = %key, "Cache miss"),
                }
                match registry.in_flight.get(&key) {
                    Some(in_flight) => {
                        debug!(date = %key, seq = in_flight.seq, "Joining in-flight fetch");
                        in_flight.fetch.clone()
                    }
                    None => self.start_fetch(&mut registry, key, SourceTag::Network),
                }
            }
        };

        match fetch.await {
            Ok(entry) => Ok(FixtureRead::from_entry(entry, Freshness::Fresh, None)),
            Err(err) => self.fall_back(key, err),
        }
    }

    fn fall_back(&self, key: CacheKey, err: FetchError) -> Result<FixtureRead, FetchError> {
        match self.inner.store.get(key) {
            Some(entry) => {
                let freshness = if self.inner.policy.is_stale(&entry, self.now()) {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                };
                warn!(date = %key, error = %err, ?freshness, "Fetch failed, serving cached fixtures");
                Ok(FixtureRead::from_entry(entry, freshness, Some(err)))
            }
            None => {
                warn!(date = %key, error = %err, "Fetch failed with nothing cached");
                Err(err)
            }
        }
    }

    fn start_fetch(&self, registry: &mut FetchRegistry, key: CacheKey, source: SourceTag) -> SharedFetch {
        let seq = registry.next_seq();
        registry.start(key, seq);
        let issued_at = self.now();
        let leagues = self.inner.league_filter.read().clone();
        let inner = Arc::clone(&self.inner);

        let handle = tokio::spawn(async move { inner.run_fetch(key, seq, issued_at, source, leagues).await });
        let fetch = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(date = %key, error = %e, "Fetch task failed");
                    Err(FetchError::Aborted)
                }
            }
        }
        .boxed()
        .shared();

        registry.in_flight.insert(
            key,
            InFlight {
                seq,
                fetch: fetch.clone(),
            },
        );
        fetch
    }

    /// Drop the entry for one date; the next read refetches.
    pub fn invalidate(&self, date: impl Into<CacheKey>) {
        let key = date.into();
        let mut registry = self.inner.registry.lock();
        registry.invalidate(key);
        let removed = self.inner.store.remove(key).is_some();
        info!(date = %key, removed, "Cache entry invalidated");
    }

    /// Drop every entry.
    pub fn clear_all(&self) {
        let mut registry = self.inner.registry.lock();
        let seq = registry.next_seq();
        registry.cleared_at = seq;
        registry.invalidated_at.clear();
        registry.in_flight.clear();
        let removed = self.inner.store.remove_all();
        info!(removed, "Fixture cache cleared");
    }

    /// Change the leagues requested from the provider. Keys are date-only,
    /// so everything cached under the old filter is dropped.
    pub fn set_league_filter(&self, leagues: Option<Vec<i64>>) {
        *self.inner.league_filter.write() = leagues;
        self.clear_all();
    }

    pub fn league_filter(&self) -> Option<Vec<i64>> {
        self.inner.league_filter.read().clone()
    }

    /// Cached entry for `date` without any freshness check or fetch.
    pub fn peek(&self, date: impl Into<CacheKey>) -> Option<CacheEntry> {
        self.inner.store.get(date.into())
    }

    /// Dates whose cached fixtures include a match in progress.
    pub fn live_dates(&self) -> Vec<CacheKey> {
        self.inner
            .store
            .entries()
            .into_iter()
            .filter(CacheEntry::has_live_fixtures)
            .map(|e| e.key)
            .collect()
    }

    pub fn entry_summaries(&self) -> Vec<EntrySummary> {
        let now = self.now();
        let policy = &self.inner.policy;
        self.inner
            .store
            .entries()
            .into_iter()
            .map(|entry| EntrySummary {
                key: entry.key,
                fixture_count: entry.fixtures.len(),
                live_count: entry.fixtures.iter().filter(|f| f.is_live()).count(),
                age: entry.age_display(now),
                expires_in_minutes: policy.time_until_stale(&entry, now).num_minutes(),
                source: entry.source,
                stale: policy.is_stale(&entry, now),
            })
            .collect()
    }

    pub fn save_snapshot(&self, snapshots: &SnapshotStore) -> anyhow::Result<usize> {
        let entries = self.inner.store.entries();
        snapshots.save(&entries, self.now())?;
        Ok(entries.len())
    }

    /// Load saved entries into the store. Entries older than what is
    /// already cached lose to it.
    pub fn restore_snapshot(&self, snapshots: &SnapshotStore) -> anyhow::Result<usize> {
        let restored = snapshots
            .load()?
            .into_iter()
            .map(|entry| self.inner.store.put(entry))
            .filter(PutOutcome::is_stored)
            .count();
        info!(restored, "Fixture snapshot restored");
        Ok(restored)
    }
}

impl Inner {
    async fn run_fetch(
        &self,
        key: CacheKey,
        seq: u64,
        issued_at: DateTime<Utc>,
        source: SourceTag,
        leagues: Option<Vec<i64>>,
    ) -> Result<CacheEntry, FetchError> {
        debug!(date = %key, seq, ?source, "Fetching fixtures from provider");
        let fetched = tokio::time::timeout(
            self.fetch_timeout,
            self.provider.fetch(key.date(), leagues.as_deref()),
        )
        .await
        .unwrap_or_else(|_| Err(FetchError::Timeout(self.fetch_timeout.as_secs())));

        let mut registry = self.registry.lock();
        let invalidated = registry.finish(key, seq);

        let fixtures = match fetched {
            Ok(fixtures) => fixtures,
            Err(e) => {
                if e.is_transient() {
                    warn!(date = %key, seq, error = %e, "Provider fetch failed");
                } else {
                    debug!(date = %key, seq, error = %e, "Provider fetch failed");
                }
                return Err(e);
            }
        };

        // fetched_at is the issue time, so a slow fetch cannot beat a newer one.
        let entry = CacheEntry::new(key, fixtures, issued_at, source);
        if invalidated {
            debug!(date = %key, seq, "Date invalidated during fetch, result not cached");
            return Ok(entry);
        }

        match self.store.put(entry.clone()) {
            PutOutcome::Rejected => {
                // A newer write landed while this one was in flight; hand
                // callers the newer data.
                Ok(self.store.get(key).unwrap_or(entry))
            }
            outcome => {
                debug!(date = %key, seq, fixtures = entry.fixtures.len(), ?outcome, "Fixtures cached");
                Ok(entry)
            }
        }
    }
}
