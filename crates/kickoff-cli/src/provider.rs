//! Fixture provider backed by a directory of per-day JSON files.
//!
//! `<dir>/2025-05-10.json` holds a JSON array of fixtures for that day.
//! Handy for exercising the cache without a network provider.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::debug;

use kickoff_core::{FetchError, Fixture, FixtureProvider};

pub struct JsonDirProvider {
    dir: PathBuf,
}

impl JsonDirProvider {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.json", date.format("%Y-%m-%d")))
    }
}

/// League id from the opaque fixture payload (`league.id` or `leagueId`).
fn league_id(fixture: &Fixture) -> Option<i64> {
    fixture
        .extra
        .get("league")
        .and_then(|l| l.get("id"))
        .or_else(|| fixture.extra.get("leagueId"))
        .and_then(Value::as_i64)
}

#[async_trait]
impl FixtureProvider for JsonDirProvider {
    async fn fetch(
        &self,
        date: NaiveDate,
        league_filter: Option<&[i64]>,
    ) -> Result<Vec<Fixture>, FetchError> {
        let path = self.day_path(date);
        debug!(path = %path.display(), "Reading fixture file");

        let read_path = path.clone();
        let contents = tokio::task::spawn_blocking(move || std::fs::read_to_string(read_path))
            .await
            .map_err(|_| FetchError::Aborted)?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FetchError::NotFound(path.display().to_string()),
                _ => FetchError::Network(format!("{}: {}", path.display(), e)),
            })?;

        let fixtures: Vec<Fixture> =
            serde_json::from_str(&contents).map_err(|e| FetchError::decode(e, &contents))?;

        Ok(match league_filter {
            Some(leagues) => fixtures
                .into_iter()
                .filter(|f| league_id(f).is_some_and(|id| leagues.contains(&id)))
                .collect(),
            None => fixtures,
        })
    }
}
