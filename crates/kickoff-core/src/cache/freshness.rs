//! Date-relative expiration rules for cached fixture lists.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, FixedOffset, Utc};

use super::store::CacheEntry;
use crate::models::CacheKey;

/// Results for days already played rarely change.
const PAST_TTL_MINUTES: i64 = 6 * 60;

/// Today and live days: the overlay carries second-by-second accuracy, the
/// baseline only needs to be roughly current.
const PRESENT_TTL_MINUTES: i64 = 15;

/// Pre-match info (lineups, postponements) still moves.
const FUTURE_TTL_MINUTES: i64 = 15;

/// Where a cached date sits relative to the consumer's today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayClass {
    Past,
    Today,
    Future,
}

/// Pure TTL policy. Holds no state beyond its configuration.
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    offset: FixedOffset,
    past_ttl: Duration,
    present_ttl: Duration,
    future_ttl: Duration,
}

impl FreshnessPolicy {
    /// `offset` decides which calendar day counts as today.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            offset,
            past_ttl: Duration::minutes(PAST_TTL_MINUTES),
            present_ttl: Duration::minutes(PRESENT_TTL_MINUTES),
            future_ttl: Duration::minutes(FUTURE_TTL_MINUTES),
        }
    }

    pub fn with_past_ttl(mut self, ttl: Duration) -> Self {
        self.past_ttl = ttl;
        self
    }

    pub fn with_present_ttl(mut self, ttl: Duration) -> Self {
        self.present_ttl = ttl;
        self
    }

    pub fn with_future_ttl(mut self, ttl: Duration) -> Self {
        self.future_ttl = ttl;
        self
    }

    pub fn past_ttl(&self) -> Duration {
        self.past_ttl
    }

    pub fn present_ttl(&self) -> Duration {
        self.present_ttl
    }

    pub fn today(&self, now: DateTime<Utc>) -> CacheKey {
        CacheKey::from_instant(now, self.offset)
    }

    pub fn classify(&self, key: CacheKey, now: DateTime<Utc>) -> DayClass {
        match key.cmp(&self.today(now)) {
            Ordering::Less => DayClass::Past,
            Ordering::Equal => DayClass::Today,
            Ordering::Greater => DayClass::Future,
        }
    }

    /// TTL by date alone.
    pub fn ttl(&self, key: CacheKey, now: DateTime<Utc>) -> Duration {
        match self.classify(key, now) {
            DayClass::Past => self.past_ttl,
            DayClass::Today => self.present_ttl,
            DayClass::Future => self.future_ttl,
        }
    }

    /// TTL for a stored entry. A day with a match still in play uses the
    /// present TTL whatever its date.
    pub fn ttl_for(&self, entry: &CacheEntry, now: DateTime<Utc>) -> Duration {
        if entry.has_live_fixtures() {
            return self.present_ttl;
        }
        self.ttl(entry.key, now)
    }

    pub fn expires_at(&self, entry: &CacheEntry, now: DateTime<Utc>) -> DateTime<Utc> {
        entry.fetched_at + self.ttl_for(entry, now)
    }

    /// Stale from exactly `fetched_at + ttl` onwards.
    pub fn is_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now >= self.expires_at(entry, now)
    }

    /// Time left before the entry goes stale, zero once it has.
    pub fn time_until_stale(&self, entry: &CacheEntry, now: DateTime<Utc>) -> Duration {
        (self.expires_at(entry, now) - now).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::store::SourceTag;
    use crate::models::{Fixture, FixtureStatus};
    use chrono::{NaiveDate, TimeZone};

    fn utc_policy() -> FreshnessPolicy {
        FreshnessPolicy::new(FixedOffset::east_opt(0).unwrap())
    }

    fn key(y: i32, m: u32, d: u32) -> CacheKey {
        CacheKey::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn entry(key: CacheKey, fetched_at: DateTime<Utc>, status: FixtureStatus) -> CacheEntry {
        let kickoff = Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap();
        CacheEntry::new(
            key,
            vec![Fixture::new(1, status, kickoff)],
            fetched_at,
            SourceTag::Network,
        )
    }

    #[test]
    fn test_ttl_by_day_class() {
        let policy = utc_policy();
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(policy.ttl(key(2025, 5, 9), now), Duration::hours(6));
        assert_eq!(policy.ttl(key(2025, 5, 10), now), Duration::minutes(15));
        assert_eq!(policy.ttl(key(2025, 5, 11), now), Duration::minutes(15));
    }

    #[test]
    fn test_past_entry_goes_stale_exactly_at_six_hours() {
        let policy = utc_policy();
        let fetched = Utc.with_ymd_and_hms(2025, 5, 12, 8, 0, 0).unwrap();
        let e = entry(key(2025, 5, 10), fetched, FixtureStatus::Finished);

        let just_before = fetched + Duration::hours(6) - Duration::seconds(1);
        assert!(!policy.is_stale(&e, just_before));
        assert!(policy.is_stale(&e, fetched + Duration::hours(6)));
        assert!(!policy.is_stale(&e, fetched + Duration::minutes(16)));
    }

    #[test]
    fn test_today_goes_stale_at_fifteen_minutes() {
        let policy = utc_policy();
        let fetched = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let e = entry(key(2025, 5, 10), fetched, FixtureStatus::NotStarted);

        assert!(!policy.is_stale(&e, fetched + Duration::minutes(10)));
        assert!(!policy.is_stale(&e, fetched + Duration::minutes(15) - Duration::seconds(1)));
        assert!(policy.is_stale(&e, fetched + Duration::minutes(15)));
    }

    #[test]
    fn test_past_day_with_live_fixture_uses_present_ttl() {
        let policy = utc_policy();
        // Fixture kicked off late on the 9th and is still running after midnight.
        let fetched = Utc.with_ymd_and_hms(2025, 5, 10, 0, 5, 0).unwrap();
        let e = entry(key(2025, 5, 9), fetched, FixtureStatus::ExtraTime);

        assert_eq!(policy.ttl_for(&e, fetched), Duration::minutes(15));
        assert!(policy.is_stale(&e, fetched + Duration::minutes(15)));
    }

    #[test]
    fn test_today_respects_offset() {
        // 23:30 UTC on the 10th is already the 11th in UTC+2.
        let policy = FreshnessPolicy::new(FixedOffset::east_opt(2 * 3600).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 23, 30, 0).unwrap();
        assert_eq!(policy.classify(key(2025, 5, 10), now), DayClass::Past);
        assert_eq!(policy.classify(key(2025, 5, 11), now), DayClass::Today);
        assert_eq!(policy.classify(key(2025, 5, 12), now), DayClass::Future);
    }

    #[test]
    fn test_time_until_stale_never_negative() {
        let policy = utc_policy();
        let fetched = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let e = entry(key(2025, 5, 10), fetched, FixtureStatus::NotStarted);
        assert_eq!(policy.time_until_stale(&e, fetched + Duration::minutes(5)), Duration::minutes(10));
        assert_eq!(policy.time_until_stale(&e, fetched + Duration::hours(2)), Duration::zero());
    }

    #[test]
    fn test_custom_ttls() {
        let policy = utc_policy()
            .with_past_ttl(Duration::hours(1))
            .with_future_ttl(Duration::minutes(30));
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        assert_eq!(policy.ttl(key(2025, 5, 1), now), Duration::hours(1));
        assert_eq!(policy.ttl(key(2025, 6, 1), now), Duration::minutes(30));
    }
}
