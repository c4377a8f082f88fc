use serde::{Deserialize, Serialize};

use super::fixture::{Fixture, FixtureId, FixtureStatus};

/// Incremental update for an in-progress match, pushed by the live feed.
///
/// `event_timestamp` is the feed's per-fixture clock; deltas can arrive out
/// of order and only a strictly newer timestamp may replace the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveDelta {
    #[serde(rename = "fixtureId")]
    pub fixture_id: FixtureId,
    pub status: FixtureStatus,
    #[serde(rename = "homeGoals", default)]
    pub home_goals: Option<u32>,
    #[serde(rename = "awayGoals", default)]
    pub away_goals: Option<u32>,
    #[serde(rename = "elapsed", default)]
    pub elapsed_minutes: Option<u32>,
    #[serde(rename = "eventTimestamp")]
    pub event_timestamp: i64,
}

impl LiveDelta {
    pub fn supersedes(&self, current: Option<&LiveDelta>) -> bool {
        current.map_or(true, |c| self.event_timestamp > c.event_timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreOrigin {
    /// Goals come from the cached fixture list.
    Cached,
    /// Goals come from the most recent accepted live delta.
    Live,
}

/// The score a view renders for one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveScore {
    pub fixture_id: FixtureId,
    pub status: FixtureStatus,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub elapsed_minutes: Option<u32>,
    pub origin: ScoreOrigin,
    /// Set when the live feed could not be reached and reconnecting gave up.
    pub outdated: bool,
}

impl LiveScore {
    /// Merge the cached baseline with the overlay delta, if any.
    ///
    /// The cached fixture carries no feed clock, so an accepted delta always
    /// wins unless the cached fixture already reached a terminal status.
    pub fn merge(fixture: &Fixture, overlay: Option<&LiveDelta>) -> Self {
        match overlay {
            Some(delta) if !fixture.status.is_terminal() => Self {
                fixture_id: fixture.id,
                status: delta.status,
                home_goals: delta.home_goals.or(fixture.home_goals),
                away_goals: delta.away_goals.or(fixture.away_goals),
                elapsed_minutes: delta.elapsed_minutes.or(fixture.elapsed_minutes),
                origin: ScoreOrigin::Live,
                outdated: false,
            },
            _ => Self {
                fixture_id: fixture.id,
                status: fixture.status,
                home_goals: fixture.home_goals,
                away_goals: fixture.away_goals,
                elapsed_minutes: fixture.elapsed_minutes,
                origin: ScoreOrigin::Cached,
                outdated: false,
            },
        }
    }

    pub fn score_display(&self) -> String {
        let side = |g: Option<u32>| g.map(|g| g.to_string()).unwrap_or_else(|| "-".to_string());
        format!("{}-{}", side(self.home_goals), side(self.away_goals))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn delta(ts: i64, home: u32, away: u32) -> LiveDelta {
        LiveDelta {
            fixture_id: 555,
            status: FixtureStatus::FirstHalf,
            home_goals: Some(home),
            away_goals: Some(away),
            elapsed_minutes: Some(30),
            event_timestamp: ts,
        }
    }

    fn cached(status: FixtureStatus) -> Fixture {
        Fixture::new(555, status, Utc.with_ymd_and_hms(2025, 5, 10, 14, 0, 0).unwrap())
            .with_score(0, 0)
    }

    #[test]
    fn test_supersedes_requires_strictly_newer() {
        let current = delta(5, 1, 0);
        assert!(delta(6, 1, 0).supersedes(Some(&current)));
        assert!(!delta(5, 2, 0).supersedes(Some(&current)));
        assert!(!delta(3, 0, 0).supersedes(Some(&current)));
        assert!(delta(0, 0, 0).supersedes(None));
    }

    #[test]
    fn test_merge_prefers_overlay() {
        let score = LiveScore::merge(&cached(FixtureStatus::FirstHalf), Some(&delta(5, 1, 0)));
        assert_eq!(score.origin, ScoreOrigin::Live);
        assert_eq!(score.score_display(), "1-0");
        assert_eq!(score.elapsed_minutes, Some(30));
    }

    #[test]
    fn test_merge_without_overlay_uses_cache() {
        let score = LiveScore::merge(&cached(FixtureStatus::FirstHalf), None);
        assert_eq!(score.origin, ScoreOrigin::Cached);
        assert_eq!(score.score_display(), "0-0");
    }

    #[test]
    fn test_merge_ignores_overlay_for_finished_baseline() {
        let score = LiveScore::merge(&cached(FixtureStatus::Finished), Some(&delta(5, 1, 0)));
        assert_eq!(score.origin, ScoreOrigin::Cached);
        assert_eq!(score.status, FixtureStatus::Finished);
    }

    #[test]
    fn test_delta_json_field_names() {
        let json = r#"{"fixtureId":555,"status":"2H","homeGoals":1,"awayGoals":0,"eventTimestamp":5}"#;
        let parsed: LiveDelta = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.fixture_id, 555);
        assert_eq!(parsed.status, FixtureStatus::SecondHalf);
        assert_eq!(parsed.elapsed_minutes, None);
    }
}
