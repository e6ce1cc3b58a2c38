// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Retention sweeping for session directories and local output files.
//!
//! Each gateway spawns one sweeper task per directory it owns.  The policy
//! is a plain value handed into the task, so tests can shrink the TTL and
//! the interval without touching process state.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

/// TTL + cadence for one swept directory.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Entries whose mtime is older than this are removed.
    pub max_age: Duration,
    /// Sleep between passes.
    pub sweep_interval: Duration,
}

impl RetentionPolicy {
    pub fn from_hours(max_age_hours: u64, sweep_interval_secs: u64) -> Self {
        Self {
            max_age: Duration::from_secs(max_age_hours * 3600),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }
}

/// Cooperative loop removing stale *files* directly under `dir` (the local
/// `outputs/` and `uploads/` directories).  Never returns; run it with
/// `tokio::spawn`.
pub async fn sweep_files(dir: PathBuf, policy: RetentionPolicy) {
    let mut ticker = tokio::time::interval(policy.sweep_interval);
    // The first tick fires immediately, which doubles as startup cleanup.
    loop {
        ticker.tick().await;
        let removed = sweep_files_once(&dir, policy.max_age);
        if removed > 0 {
            info!(dir = %dir.display(), removed, "swept stale output files");
        }
    }
}

/// Cooperative loop removing stale session *directories* under `root`.
pub async fn sweep_directories(root: PathBuf, policy: RetentionPolicy) {
    let mut ticker = tokio::time::interval(policy.sweep_interval);
    loop {
        ticker.tick().await;
        let removed = sweep_directories_once(&root, policy.max_age);
        if removed > 0 {
            info!(root = %root.display(), removed, "swept expired sessions");
        }
    }
}

/// One pass over flat files.  Per-file failures are logged and skipped so a
/// single bad entry cannot stall retention for the rest.
pub fn sweep_files_once(dir: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return 0, // directory not created yet
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if !is_older_than(&path, now, max_age) {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(file = %path.display(), "removed stale file");
                removed += 1;
            }
            Err(e) => warn!(file = %path.display(), error = %e, "failed to remove stale file"),
        }
    }
    removed
}

/// One pass over session directories, judged by directory mtime.
pub fn sweep_directories_once(root: &Path, max_age: Duration) -> usize {
    let entries = match std::fs::read_dir(root) {
        Ok(e) => e,
        Err(_) => return 0,
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if !is_older_than(&path, now, max_age) {
            continue;
        }
        match std::fs::remove_dir_all(&path) {
            Ok(()) => {
                debug!(session = %path.display(), "removed expired session");
                removed += 1;
            }
            Err(e) => warn!(session = %path.display(), error = %e, "failed to remove session"),
        }
    }
    removed
}

fn is_older_than(path: &Path, now: SystemTime, max_age: Duration) -> bool {
    let mtime = match path.metadata().and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    match now.duration_since(mtime) {
        Ok(age) => age > max_age,
        Err(_) => false, // mtime in the future
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
