use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::{CacheEntry, SourceTag};
use crate::models::{CacheKey, Fixture};

/// Bump when the on-disk layout changes; older snapshots are ignored.
const SNAPSHOT_VERSION: u32 = 1;

const SNAPSHOT_FILE: &str = "fixtures.json";

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    saved_at: DateTime<Utc>,
    entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotEntry {
    date: CacheKey,
    fetched_at: DateTime<Utc>,
    source: SourceTag,
    fixtures: Vec<Fixture>,
}

impl From<&CacheEntry> for SnapshotEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            date: entry.key,
            fetched_at: entry.fetched_at,
            source: entry.source,
            fixtures: entry.fixtures.to_vec(),
        }
    }
}

impl From<SnapshotEntry> for CacheEntry {
    fn from(entry: SnapshotEntry) -> Self {
        CacheEntry::new(entry.date, entry.fixtures, entry.fetched_at, entry.source)
    }
}

/// JSON snapshot of the fixture store so a restart can serve the last
/// known fixtures. Entries keep their original fetch time, so restored
/// data is still judged by the freshness policy.
pub struct SnapshotStore {
    cache_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache dir: {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.cache_dir.join(SNAPSHOT_FILE)
    }

    pub fn save(&self, entries: &[CacheEntry], now: DateTime<Utc>) -> Result<()> {
        let file = SnapshotFile {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            entries: entries.iter().map(SnapshotEntry::from).collect(),
        };
        let contents = serde_json::to_string_pretty(&file)?;
        std::fs::write(self.snapshot_path(), contents).context("Failed to write fixture snapshot")?;
        debug!(entries = entries.len(), "Fixture snapshot saved");
        Ok(())
    }

    /// Load saved entries. A missing snapshot is empty; an unreadable or
    /// outdated one is logged and treated as empty.
    pub fn load(&self) -> Result<Vec<CacheEntry>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(Vec::new());
        }

        let contents = std::fs::read_to_string(&path).context("Failed to read fixture snapshot")?;
        let file: SnapshotFile = match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "Ignoring unparseable fixture snapshot");
                return Ok(Vec::new());
            }
        };
        if file.version != SNAPSHOT_VERSION {
            warn!(version = file.version, "Ignoring fixture snapshot with unknown version");
            return Ok(Vec::new());
        }

        debug!(entries = file.entries.len(), saved_at = %file.saved_at, "Fixture snapshot loaded");
        Ok(file.entries.into_iter().map(CacheEntry::from).collect())
    }

    pub fn clear(&self) -> Result<()> {
        let path = self.snapshot_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FixtureStatus;
    use chrono::{NaiveDate, TimeZone};

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("kickoff-snapshot-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_save_and_load() {
        let dir = temp_dir("roundtrip");
        let snapshots = SnapshotStore::new(dir.clone()).unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 5, 10, 12, 0, 0).unwrap();
        let key = CacheKey::new(NaiveDate::from_ymd_opt(2025, 5, 10).unwrap());
        let mut fixture = Fixture::new(555, FixtureStatus::FirstHalf, t0).with_score(1, 0);
        fixture.extra.insert("home".into(), serde_json::json!("Arsenal"));
        let entries = vec![
            CacheEntry::new(key, vec![fixture.clone()], t0, SourceTag::ForcedRefresh),
            CacheEntry::new(key.date().succ_opt().unwrap().into(), Vec::new(), t0, SourceTag::Network),
        ];

        snapshots.save(&entries, t0).unwrap();
        let loaded = snapshots.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].key, key);
        assert_eq!(loaded[0].fetched_at, t0);
        assert_eq!(loaded[0].source, SourceTag::ForcedRefresh);
        assert_eq!(loaded[0].fixtures[0], fixture);
        assert!(loaded[1].is_empty());

        snapshots.clear().unwrap();
        assert!(snapshots.load().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_garbage_snapshot_is_empty() {
        let dir = temp_dir("garbage");
        let snapshots = SnapshotStore::new(dir.clone()).unwrap();
        std::fs::write(dir.join(SNAPSHOT_FILE), "not json").unwrap();
        assert!(snapshots.load().unwrap().is_empty());

        std::fs::write(
            dir.join(SNAPSHOT_FILE),
            r#"{"version": 99, "saved_at": "2025-05-10T12:00:00Z", "entries": []}"#,
        )
        .unwrap();
        assert!(snapshots.load().unwrap().is_empty());
        let _ = std::fs::remove_dir_all(dir);
    }
}
