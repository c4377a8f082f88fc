use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub type FixtureId = i64;

/// Match status as reported by the fixture provider.
///
/// Serialized using the provider's short codes ("NS", "1H", "FT", ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixtureStatus {
    #[serde(rename = "NS", alias = "TBD")]
    NotStarted,
    #[serde(rename = "1H")]
    FirstHalf,
    #[serde(rename = "HT")]
    HalfTime,
    #[serde(rename = "2H")]
    SecondHalf,
    #[serde(rename = "BT")]
    BreakTime,
    #[serde(rename = "ET")]
    ExtraTime,
    #[serde(rename = "P")]
    Penalties,
    #[serde(rename = "INT")]
    Interrupted,
    #[serde(rename = "SUSP")]
    Suspended,
    #[serde(rename = "FT")]
    Finished,
    #[serde(rename = "AET")]
    FinishedAfterExtraTime,
    #[serde(rename = "PEN")]
    FinishedAfterPenalties,
    #[serde(rename = "PST")]
    Postponed,
    #[serde(rename = "CANC")]
    Cancelled,
    #[serde(rename = "ABD")]
    Abandoned,
    #[serde(rename = "AWD")]
    Awarded,
    #[serde(rename = "WO")]
    Walkover,
    #[serde(other)]
    Unknown,
}

impl FixtureStatus {
    /// Ball is (or is about to be) in play: the live overlay applies.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            FixtureStatus::FirstHalf
                | FixtureStatus::HalfTime
                | FixtureStatus::SecondHalf
                | FixtureStatus::BreakTime
                | FixtureStatus::ExtraTime
                | FixtureStatus::Penalties
                | FixtureStatus::Interrupted
        )
    }

    /// No further score changes are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FixtureStatus::Finished
                | FixtureStatus::FinishedAfterExtraTime
                | FixtureStatus::FinishedAfterPenalties
                | FixtureStatus::Cancelled
                | FixtureStatus::Abandoned
                | FixtureStatus::Awarded
                | FixtureStatus::Walkover
        )
    }

    pub fn short_code(&self) -> &'static str {
        match self {
            FixtureStatus::NotStarted => "NS",
            FixtureStatus::FirstHalf => "1H",
            FixtureStatus::HalfTime => "HT",
            FixtureStatus::SecondHalf => "2H",
            FixtureStatus::BreakTime => "BT",
            FixtureStatus::ExtraTime => "ET",
            FixtureStatus::Penalties => "P",
            FixtureStatus::Interrupted => "INT",
            FixtureStatus::Suspended => "SUSP",
            FixtureStatus::Finished => "FT",
            FixtureStatus::FinishedAfterExtraTime => "AET",
            FixtureStatus::FinishedAfterPenalties => "PEN",
            FixtureStatus::Postponed => "PST",
            FixtureStatus::Cancelled => "CANC",
            FixtureStatus::Abandoned => "ABD",
            FixtureStatus::Awarded => "AWD",
            FixtureStatus::Walkover => "WO",
            FixtureStatus::Unknown => "?",
        }
    }
}

impl std::fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short_code())
    }
}

/// A single scheduled or completed match.
///
/// Only the fields the cache and overlay reason about are typed; everything
/// else the provider sends (teams, venue, logos) rides along in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: FixtureId,
    pub status: FixtureStatus,
    #[serde(rename = "homeGoals", default)]
    pub home_goals: Option<u32>,
    #[serde(rename = "awayGoals", default)]
    pub away_goals: Option<u32>,
    #[serde(rename = "elapsed", default)]
    pub elapsed_minutes: Option<u32>,
    pub kickoff: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Fixture {
    pub fn new(id: FixtureId, status: FixtureStatus, kickoff: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            home_goals: None,
            away_goals: None,
            elapsed_minutes: None,
            kickoff,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_score(mut self, home: u32, away: u32) -> Self {
        self.home_goals = Some(home);
        self.away_goals = Some(away);
        self
    }

    pub fn is_live(&self) -> bool {
        self.status.is_in_progress()
    }

    /// Score line for debug output, "-" for unplayed sides.
    pub fn score_display(&self) -> String {
        let side = |g: Option<u32>| g.map(|g| g.to_string()).unwrap_or_else(|| "-".to_string());
        format!("{}-{}", side(self.home_goals), side(self.away_goals))
    }
}

/// Cache key: one calendar day, with no time component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(NaiveDate);

impl CacheKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Calendar day of `instant` as seen from `offset`.
    pub fn from_instant(instant: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self(instant.with_timezone(&offset).date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for CacheKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
