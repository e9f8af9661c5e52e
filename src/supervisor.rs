use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context;
use rand::seq::SliceRandom;

use crate::config::AppConfig;
use crate::snapshot::{self, CatalogSnapshot};
use crate::tags::{self, TrackState};

/// Sleep when the catalog snapshot cannot be taken.
const SNAPSHOT_RETRY: Duration = Duration::from_secs(10);
/// Sleep when the backlog is empty, or after draining a queue.
const IDLE_SLEEP: Duration = Duration::from_secs(300);
/// Backoff after an uncaught cycle fault.
const FAULT_BACKOFF: Duration = Duration::from_secs(60);
/// Small pause between worker spawns.
const INTER_FILE_PAUSE: Duration = Duration::from_millis(100);

/// The supervising loop. Polls the catalog, spawns one isolated worker
/// process per unclassified track, and never terminates: every fault is
/// logged and absorbed with a backoff.
pub fn run(config: &AppConfig) -> ! {
    log::info!("Supervisor started (random shuffle, marker-based claiming)");
    log::info!(
        "Catalog: {} | Music root: {}",
        config.db_path.display(),
        config.music_dir.display()
    );

    loop {
        match run_cycle(config) {
            Ok(sleep) => std::thread::sleep(sleep),
            Err(e) => {
                log::error!("Cycle fault: {e:#}");
                std::thread::sleep(FAULT_BACKOFF);
            }
        }
    }
}

/// One polling cycle. Returns how long to sleep before the next one.
fn run_cycle(config: &AppConfig) -> anyhow::Result<Duration> {
    run_housekeeping(config);

    let snapshot = match CatalogSnapshot::take(&config.db_path) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Catalog unavailable ({e}), retrying shortly");
            return Ok(SNAPSHOT_RETRY);
        }
    };

    let catalog_paths = snapshot.track_paths().context("listing catalog rows")?;
    drop(snapshot);

    let mut queue = build_queue(&catalog_paths, &config.music_dir);
    if queue.is_empty() {
        log::info!("All tracks classified; idling");
        return Ok(IDLE_SLEEP);
    }

    // Uniform shuffle spreads load across concurrent supervisors working
    // the same backlog.
    queue.shuffle(&mut rand::thread_rng());
    log::info!("Queue shuffled ({} tracks)", queue.len());

    let total = queue.len();
    for (i, path) in queue.iter().enumerate() {
        // A supervisor on another host may have finished this one since the
        // queue was built.
        if tags::completion_state(path) == TrackState::Done {
            log::debug!("Already done, skipping: {}", path.display());
            continue;
        }

        log::info!("[{}/{}] {}", i + 1, total, path.display());
        if let Err(e) = spawn_worker(path) {
            log::error!("Worker launch failed: {e}");
        }

        std::thread::sleep(INTER_FILE_PAUSE);
    }

    log::info!("Cycle complete; sleeping");
    Ok(IDLE_SLEEP)
}

/// Optional external housekeeping step. Skipped silently when the hook is
/// unset or missing on disk; its failures are logged and ignored.
fn run_housekeeping(config: &AppConfig) {
    let Some(hook) = &config.organize_hook else {
        return;
    };
    if !hook.exists() {
        return;
    }

    log::info!("Running housekeeping hook: {}", hook.display());
    match Command::new(hook)
        .arg("--music-dir")
        .arg(&config.music_dir)
        .status()
    {
        Ok(status) if !status.success() => {
            log::warn!("Housekeeping hook exited with {status}");
        }
        Ok(_) => {}
        Err(e) => log::warn!("Housekeeping hook failed to start: {e}"),
    }
}

/// Map catalog rows to on-disk paths and keep those that exist and carry no
/// completion marker.
fn build_queue(catalog_paths: &[String], music_dir: &Path) -> Vec<PathBuf> {
    let mut queue = Vec::new();
    for catalog_path in catalog_paths {
        let full = snapshot::map_catalog_path(catalog_path, music_dir);
        if !full.exists() {
            continue;
        }
        if tags::completion_state(&full) == TrackState::Virgin {
            queue.push(full);
        }
    }
    queue
}

/// Spawn one isolated worker process for a track and stream its stdout to
/// the operator log. The worker's exit code is reported but never aborts
/// the cycle.
fn spawn_worker(path: &Path) -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("resolving current executable")?;
    let mut child = Command::new(exe)
        .arg("worker")
        .arg("--file")
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .context("spawning worker process")?;

    if let Some(stdout) = child.stdout.take() {
        for line in BufReader::new(stdout).lines() {
            match line {
                Ok(line) => println!("   | {line}"),
                Err(_) => break,
            }
        }
    }

    let status = child.wait().context("waiting for worker")?;
    if status.success() {
        log::info!("[success] {}", path.display());
    } else {
        log::warn!("[fail] worker exited with {status}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_keeps_existing_virgin_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir_all(music.join("ab")).unwrap();
        // Untagged files read as VIRGIN.
        std::fs::write(music.join("ab/present.mp3"), b"x").unwrap();

        let catalog = vec![
            "/music/ab/present.mp3".to_string(),
            "/music/ab/missing.mp3".to_string(),
        ];
        let queue = build_queue(&catalog, &music);
        assert_eq!(queue, vec![music.join("ab/present.mp3")]);
    }

    #[test]
    fn empty_catalog_builds_empty_queue() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_queue(&[], dir.path()).is_empty());
    }
}
