//! Kickoff - debug driver for the fixture cache and live score overlay.
//!
//! Reads fixtures from a directory of per-day JSON files, serves them through
//! the cache, and can follow one match with a simulated live feed.

mod feed;
mod provider;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kickoff_core::{
    spawn_control_listener, CacheControl, CacheCoordinator, CacheKey, Config, FixtureId, FixtureRead,
    LiveOverlayEngine, RefreshScheduler, SnapshotStore, SystemClock,
};

use feed::SimulatedFeed;
use provider::JsonDirProvider;

// ============================================================================
// Constants
// ============================================================================

const DEFAULT_WATCH_SECS: u64 = 60;

/// Tick of the simulated live feed
const SIMULATED_TICK_MS: u64 = 1000;

/// Per-tick disconnect chance of the simulated feed with --flaky-feed
const FLAKY_DISCONNECT_CHANCE: f64 = 0.15;

const USAGE: &str = "\
Usage: kickoff [OPTIONS]

Options:
  --date YYYY-MM-DD        Day to show (default: today)
  --force                  Bypass the cache and refetch the day
  --invalidate YYYY-MM-DD  Drop one cached day before reading
  --watch <fixture id>     Follow a match with the simulated live feed
  --watch-secs <n>         How long to follow it (default: 60)
  --flaky-feed             Make the simulated feed drop connections often
  --dump-cache             Print every cached day with its age and TTL
  --clear                  Clear the cache and its snapshot, then exit
  --no-snapshot            Neither restore nor save the disk snapshot
  --log-file <path>        Write logs to a file instead of stderr
  -h, --help               Show this help

Fixture files are read from <data_dir>/YYYY-MM-DD.json; set data_dir in the
config file or KICKOFF_DATA_DIR.";

#[derive(Debug, Default, PartialEq)]
struct Options {
    date: Option<NaiveDate>,
    force: bool,
    invalidate: Vec<NaiveDate>,
    watch: Option<FixtureId>,
    watch_secs: u64,
    flaky_feed: bool,
    dump_cache: bool,
    clear: bool,
    no_snapshot: bool,
    log_file: Option<PathBuf>,
    help: bool,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut options = Options {
        watch_secs: DEFAULT_WATCH_SECS,
        ..Options::default()
    };

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |name: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("{} needs a value", name))
        };
        match arg.as_str() {
            "--date" => options.date = Some(parse_date(&value("--date")?)?),
            "--force" => options.force = true,
            "--invalidate" => options.invalidate.push(parse_date(&value("--invalidate")?)?),
            "--watch" => {
                let raw = value("--watch")?;
                options.watch = Some(
                    raw.parse()
                        .with_context(|| format!("Invalid fixture id '{}'", raw))?,
                );
            }
            "--watch-secs" => {
                let raw = value("--watch-secs")?;
                options.watch_secs = raw
                    .parse()
                    .with_context(|| format!("Invalid duration '{}'", raw))?;
            }
            "--flaky-feed" => options.flaky_feed = true,
            "--dump-cache" => options.dump_cache = true,
            "--clear" => options.clear = true,
            "--no-snapshot" => options.no_snapshot = true,
            "--log-file" => options.log_file = Some(PathBuf::from(value("--log-file")?)),
            "-h" | "--help" => options.help = true,
            other => bail!("Unknown argument '{}'\n\n{}", other, USAGE),
        }
    }

    Ok(options)
}

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=kickoff_core=debug).
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    if options.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let _log_guard = init_tracing(options.log_file.as_ref())?;
    info!("Kickoff starting");

    let config = Config::load()?.with_env_overrides();
    let snapshots = SnapshotStore::new(config.cache_dir()?)?;

    if options.clear {
        snapshots.clear()?;
        println!("Cache cleared");
        return Ok(());
    }

    let data_dir = config
        .data_dir
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No fixture directory configured.\n\n{}", USAGE))?;

    let coordinator = CacheCoordinator::builder(
        Arc::new(JsonDirProvider::new(data_dir)),
        config.freshness_policy(),
        Arc::new(SystemClock),
    )
    .fetch_timeout(config.fetch_timeout())
    .league_filter(config.leagues.clone())
    .build();
    info!(leagues = ?coordinator.league_filter(), "Fixture cache ready");

    if !options.no_snapshot {
        match coordinator.restore_snapshot(&snapshots) {
            Ok(restored) => info!(restored, "Loaded fixture snapshot"),
            Err(e) => warn!(error = %e, "Could not restore fixture snapshot"),
        }
    }

    if !options.invalidate.is_empty() {
        let (control_tx, control_rx) = mpsc::channel(options.invalidate.len());
        let listener = spawn_control_listener(coordinator.clone(), control_rx);
        for date in &options.invalidate {
            control_tx.send(CacheControl::InvalidateDate(*date)).await?;
        }
        drop(control_tx);
        listener.await.context("Cache control listener failed")?;
    }

    let date = options
        .date
        .map(CacheKey::from)
        .unwrap_or_else(|| coordinator.today());
    let read = coordinator.get_fixtures(date, options.force).await?;
    print_read(&read);

    if let Some(fixture_id) = options.watch {
        watch_fixture(&coordinator, &config, &read, fixture_id, &options).await?;
    }

    if options.dump_cache {
        dump_cache(&coordinator);
    }

    if !options.no_snapshot {
        match coordinator.save_snapshot(&snapshots) {
            Ok(saved) => info!(saved, "Saved fixture snapshot"),
            Err(e) => warn!(error = %e, "Could not save fixture snapshot"),
        }
    }

    info!("Kickoff shutting down");
    Ok(())
}

fn print_read(read: &FixtureRead) {
    let freshness = if read.is_stale() { "stale" } else { "fresh" };
    println!(
        "{} - {} fixtures ({}, fetched {})",
        read.key,
        read.fixtures.len(),
        freshness,
        read.fetched_at.format("%H:%M:%S UTC")
    );
    if let Some(e) = &read.fallback_error {
        println!("  refresh failed, showing cached data: {}", e);
    }
    for fixture in read.fixtures.iter() {
        let minute = fixture
            .elapsed_minutes
            .map(|m| format!(" {}'", m))
            .unwrap_or_default();
        println!(
            "  [{}] {:>4} {}{}  kickoff {}",
            fixture.id,
            fixture.status,
            fixture.score_display(),
            minute,
            fixture.kickoff.format("%H:%M")
        );
    }
}

fn dump_cache(coordinator: &CacheCoordinator) {
    let summaries = coordinator.entry_summaries();
    if summaries.is_empty() {
        println!("Cache is empty");
        return;
    }
    println!("{:<12} {:>8} {:>5} {:>10} {:>8}  source", "date", "fixtures", "live", "age", "ttl");
    for s in summaries {
        let ttl = if s.stale {
            "stale".to_string()
        } else {
            format!("{}m", s.expires_in_minutes)
        };
        println!(
            "{:<12} {:>8} {:>5} {:>10} {:>8}  {:?}",
            s.key.to_string(),
            s.fixture_count,
            s.live_count,
            s.age,
            ttl,
            s.source
        );
    }
}

/// Follow one fixture's live score until it ends or the watch time elapses, with the
/// refresh scheduler running alongside.
async fn watch_fixture(
    coordinator: &CacheCoordinator,
    config: &Config,
    read: &FixtureRead,
    fixture_id: FixtureId,
    options: &Options,
) -> Result<()> {
    let fixture = read
        .fixtures
        .iter()
        .find(|f| f.id == fixture_id)
        .ok_or_else(|| anyhow::anyhow!("Fixture {} not found on {}", fixture_id, read.key))?;

    let mut feed = SimulatedFeed::new(Duration::from_millis(SIMULATED_TICK_MS));
    if options.flaky_feed {
        feed = feed.with_disconnect_chance(FLAKY_DISCONNECT_CHANCE);
    }
    let feed = Arc::new(feed);
    feed.seed(fixture);
    let engine = LiveOverlayEngine::new(feed, config.reconnect_backoff());
    let scheduler = RefreshScheduler::new(coordinator.clone(), config.refresh_interval()).spawn();

    let mut handle = engine.observe_live_score(fixture);
    let score = handle.current();
    println!("Watching {}: {} {}", fixture_id, score.status, score.score_display());
    if !handle.is_live() {
        println!("  not in progress, nothing to follow");
    }

    let deadline = tokio::time::sleep(Duration::from_secs(options.watch_secs));
    tokio::pin!(deadline);
    while handle.is_live() {
        tokio::select! {
            more = handle.changed() => {
                let score = handle.current();
                let minute = score.elapsed_minutes.map(|m| format!(" {}'", m)).unwrap_or_default();
                let flag = if score.outdated { "  (may be outdated)" } else { "" };
                println!("  {:>4} {}{}{}", score.status, score.score_display(), minute, flag);
                if !more {
                    break;
                }
            }
            _ = &mut deadline => break,
        }
    }

    engine.stop_observing(handle);
    scheduler.shutdown().await;
    Ok(())
}
