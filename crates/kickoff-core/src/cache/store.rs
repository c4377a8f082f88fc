use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{CacheKey, Fixture};

/// How an entry got into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceTag {
    Network,
    ForcedRefresh,
}

/// Fixtures for one day plus fetch metadata.
///
/// The fixture list is shared and immutable: cloning an entry is cheap and
/// an update always builds a new entry. An empty list is a real result
/// ("no matches that day"), not a missing one.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub fixtures: Arc<[Fixture]>,
    pub fetched_at: DateTime<Utc>,
    pub source: SourceTag,
}

impl CacheEntry {
    pub fn new(
        key: CacheKey,
        fixtures: Vec<Fixture>,
        fetched_at: DateTime<Utc>,
        source: SourceTag,
    ) -> Self {
        Self {
            key,
            fixtures: fixtures.into(),
            fetched_at,
            source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fixtures.is_empty()
    }

    pub fn has_live_fixtures(&self) -> bool {
        self.fixtures.iter().any(Fixture::is_live)
    }

    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_minutes()
    }

    pub fn age_display(&self, now: DateTime<Utc>) -> String {
        let minutes = self.age_minutes(now);
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Result of a `FixtureStore::put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Replaced,
    /// The stored entry was fetched later than the incoming one.
    Rejected,
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        !matches!(self, PutOutcome::Rejected)
    }
}

/// In-memory date → fixtures map. Knows nothing about time or the network.
#[derive(Debug, Default)]
pub struct FixtureStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CacheKey) -> Option<CacheEntry> {
        self.entries.read().get(&key).cloned()
    }

    /// Atomically replace the entry for `entry.key`, unless the stored one
    /// has a strictly newer `fetched_at`.
    pub fn put(&self, entry: CacheEntry) -> PutOutcome {
        let mut entries = self.entries.write();
        match entries.get(&entry.key) {
            Some(current) if current.fetched_at > entry.fetched_at => {
                debug!(
                    date = %entry.key,
                    stored_at = %current.fetched_at,
                    incoming_at = %entry.fetched_at,
                    "Rejecting superseded cache write"
                );
                PutOutcome::Rejected
            }
            Some(_) => {
                entries.insert(entry.key, entry);
                PutOutcome::Replaced
            }
            None => {
                entries.insert(entry.key, entry);
                PutOutcome::Inserted
            }
        }
    }

    pub fn remove(&self, key: CacheKey) -> Option<CacheEntry> {
        self.entries.write().remove(&key)
    }

    pub fn remove_all(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self.entries.read().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Snapshot of every entry, ordered by date.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut all: Vec<CacheEntry> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|e| e.key);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FixtureStatus;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn key() -> CacheKey {
        CacheKey::new(NaiveDate::from_ymd_opt(2025, 5, 10).unwrap())
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap()
    }

    fn entry_with(ids: &[i64], fetched_at: DateTime<Utc>, source: SourceTag) -> CacheEntry {
        let fixtures = ids
            .iter()
            .map(|&id| Fixture::new(id, FixtureStatus::NotStarted, t0()))
            .collect();
        CacheEntry::new(key(), fixtures, fetched_at, source)
    }

    #[test]
    fn test_get_missing_is_none() {
        let store = FixtureStore::new();
        assert!(store.get(key()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_replace_with_newer() {
        let store = FixtureStore::new();
        assert_eq!(store.put(entry_with(&[1, 2], t0(), SourceTag::Network)), PutOutcome::Inserted);
        let newer = entry_with(&[3], t0() + Duration::minutes(1), SourceTag::ForcedRefresh);
        assert_eq!(store.put(newer), PutOutcome::Replaced);

        let got = store.get(key()).unwrap();
        assert_eq!(got.fixtures.len(), 1);
        assert_eq!(got.source, SourceTag::ForcedRefresh);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_older_write_is_rejected() {
        let store = FixtureStore::new();
        store.put(entry_with(&[9], t0() + Duration::minutes(5), SourceTag::ForcedRefresh));
        let slow = entry_with(&[1, 2, 3], t0(), SourceTag::Network);
        assert_eq!(store.put(slow), PutOutcome::Rejected);
        assert_eq!(store.get(key()).unwrap().fixtures[0].id, 9);
    }

    #[test]
    fn test_equal_timestamp_replaces() {
        let store = FixtureStore::new();
        store.put(entry_with(&[1], t0(), SourceTag::Network));
        assert!(store.put(entry_with(&[2], t0(), SourceTag::Network)).is_stored());
        assert_eq!(store.get(key()).unwrap().fixtures[0].id, 2);
    }

    #[test]
    fn test_reads_are_unaffected_by_later_writes() {
        let store = FixtureStore::new();
        store.put(entry_with(&[1, 2], t0(), SourceTag::Network));
        let read = store.get(key()).unwrap();
        store.put(entry_with(&[7], t0() + Duration::minutes(1), SourceTag::Network));
        assert_eq!(read.fixtures.len(), 2);
    }

    #[test]
    fn test_empty_day_is_an_entry() {
        let store = FixtureStore::new();
        store.put(entry_with(&[], t0(), SourceTag::Network));
        let got = store.get(key()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_remove_and_remove_all() {
        let store = FixtureStore::new();
        store.put(entry_with(&[1], t0(), SourceTag::Network));
        let other = CacheEntry::new(
            CacheKey::new(NaiveDate::from_ymd_opt(2025, 5, 11).unwrap()),
            Vec::new(),
            t0(),
            SourceTag::Network,
        );
        store.put(other);
        assert_eq!(store.keys().len(), 2);

        assert!(store.remove(key()).is_some());
        assert!(store.remove(key()).is_none());
        assert_eq!(store.remove_all(), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_age_display() {
        let e = entry_with(&[], t0(), SourceTag::Network);
        assert_eq!(e.age_display(t0()), "just now");
        assert_eq!(e.age_display(t0() - Duration::minutes(3)), "just now");
        assert_eq!(e.age_display(t0() + Duration::minutes(16)), "16m ago");
        assert_eq!(e.age_display(t0() + Duration::minutes(95)), "2h ago");
        assert_eq!(e.age_display(t0() + Duration::hours(26)), "1d ago");
        assert_eq!(e.age_display(t0() + Duration::hours(36)), "2d ago");
    }
}
