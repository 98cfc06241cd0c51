// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the monitored folder

use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{Result, SeqRenameError};

/// How often a growing file is re-measured
const STABILITY_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Debounce entries older than this many windows are forgotten
const DEBOUNCE_MEMORY_FACTOR: u32 = 5;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A new file was created
    FileCreated(PathBuf),
    /// A file was modified
    FileModified(PathBuf),
    /// A file was deleted
    FileDeleted(PathBuf),
    /// A file was renamed. `from` is unknown on some platforms.
    FileRenamed { from: Option<PathBuf>, to: PathBuf },
    /// Watcher error
    Error(String),
}

/// File system watcher
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    watched_paths: Vec<PathBuf>,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Create a new file watcher
    pub fn new(poll_interval: Duration) -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default().with_poll_interval(poll_interval);

        let watcher = RecommendedWatcher::new(tx, config)
            .map_err(|e| SeqRenameError::Startup(format!("file notifications unavailable: {}", e)))?;

        Ok(Self {
            watcher,
            watched_paths: Vec::new(),
            event_rx: rx,
        })
    }

    /// Start watching a folder (not its subfolders)
    pub fn watch(&mut self, path: &Path) -> Result<()> {
        if !path.is_dir() {
            return Err(SeqRenameError::Startup(format!(
                "{} is not an existing folder",
                path.display()
            )));
        }

        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| SeqRenameError::Startup(format!("{}: {}", path.display(), e)))?;
        self.watched_paths.push(path.to_path_buf());
        info!("Watching: {:?}", path);

        Ok(())
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => Self::convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => None,
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                Some(WatchEvent::Error("Watcher disconnected".to_string()))
            }
        }
    }

    /// Convert notify event to our event type
    fn convert_event(event: Event) -> Option<WatchEvent> {
        match event.kind {
            EventKind::Create(_) => {
                event.paths.first().map(|p| WatchEvent::FileCreated(p.clone()))
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
                [from, to, ..] => Some(WatchEvent::FileRenamed {
                    from: Some(from.clone()),
                    to: to.clone(),
                }),
                _ => None,
            },
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                event.paths.first().map(|p| WatchEvent::FileDeleted(p.clone()))
            }
            EventKind::Modify(ModifyKind::Name(_)) => event.paths.first().map(|p| {
                WatchEvent::FileRenamed {
                    from: None,
                    to: p.clone(),
                }
            }),
            EventKind::Modify(_) => {
                event.paths.first().map(|p| WatchEvent::FileModified(p.clone()))
            }
            EventKind::Remove(_) => {
                event.paths.first().map(|p| WatchEvent::FileDeleted(p.clone()))
            }
            _ => None,
        }
    }

    /// Get currently watched paths
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched_paths
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        for path in std::mem::take(&mut self.watched_paths) {
            match self.watcher.unwatch(&path) {
                Ok(()) => info!("Stopped watching: {:?}", path),
                Err(e) => debug!("Unwatch of {:?} failed: {}", path, e),
            }
        }
    }
}

/// Check if a file should be processed
pub fn should_process(path: &Path) -> bool {
    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return false,
    };

    // Skip hidden files, including our own temporary names
    if filename.starts_with('.') {
        return false;
    }

    // Skip temporary files
    let temp_extensions = [".tmp", ".part", ".crdownload", ".partial", ".download", ".seqrename-tmp"];
    let lower = filename.to_lowercase();
    if temp_extensions.iter().any(|ext| lower.ends_with(ext)) {
        return false;
    }

    // Skip system files
    let skip_names = ["desktop.ini", "thumbs.db", ".ds_store"];
    if skip_names.iter().any(|n| filename.eq_ignore_ascii_case(n)) {
        return false;
    }

    true
}

/// Drops repeated events for the same path inside a quiet window
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    /// True if `path` has not been accepted within the window
    pub fn accept(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(seen) = self.last_seen.get(path) {
            if now.saturating_duration_since(*seen) < self.window {
                return false;
            }
        }
        self.last_seen.insert(path.to_path_buf(), now);
        self.prune(now);
        true
    }

    fn prune(&mut self, now: Instant) {
        let memory = self.window * DEBOUNCE_MEMORY_FACTOR;
        self.last_seen
            .retain(|_, seen| now.saturating_duration_since(*seen) <= memory);
    }
}

/// Wait for file to be stable (not being written)
pub async fn wait_for_stable(path: &Path, max_wait: Duration) -> bool {
    let start = Instant::now();

    let mut last_size = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return false,
    };

    loop {
        tokio::time::sleep(STABILITY_CHECK_INTERVAL).await;

        // Check if file still exists
        let current_size = match std::fs::metadata(path) {
            Ok(m) => m.len(),
            Err(_) => return false, // File was deleted
        };

        // An empty file is usually one the writer has only just opened
        if current_size == last_size && current_size > 0 {
            return true;
        }

        // Check if we've exceeded max wait time
        if start.elapsed() > max_wait {
            warn!("File stability check timed out for {:?}", path);
            return true; // Proceed anyway
        }

        last_size = current_size;
        debug!("File {:?} still being written, size: {}", path, current_size);
    }
}
