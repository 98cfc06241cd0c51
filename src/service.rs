// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Background watch loop: folder events in, sequential renames out

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::{WatchConfig, WatcherSettings};
use crate::naming::SequencePattern;
use crate::renamer::{AppendOutcome, SequenceRenamer};
use crate::watcher::{should_process, wait_for_stable, Debouncer, FileWatcher, WatchEvent};
use crate::Result;

/// How long the loop blocks on the event channel before checking for shutdown
const EVENT_POLL: Duration = Duration::from_millis(100);

/// A running watch loop over one folder with one prefix
pub struct WatchHandle {
    config: WatchConfig,
    shutdown_tx: watch::Sender<bool>,
    loop_task: JoinHandle<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Subscribe to `config.directory` and start renaming new files.
///
/// Fails with a startup error when the folder cannot be watched. Must be
/// called from inside a tokio runtime.
pub async fn start(config: WatchConfig, settings: WatcherSettings) -> Result<WatchHandle> {
    let renamer = Arc::new(SequenceRenamer::new(config.clone())?);

    let mut watcher = FileWatcher::new(settings.poll_interval())?;
    watcher.watch(&config.directory)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runtime = tokio::runtime::Handle::current();

    let loop_task = tokio::task::spawn_blocking(move || {
        run_loop(watcher, renamer, settings, shutdown_rx, runtime)
    });

    info!(
        "Renaming new files in {:?} as {}_NN",
        config.directory, config.prefix
    );

    Ok(WatchHandle {
        config,
        shutdown_tx,
        loop_task,
    })
}

impl WatchHandle {
    /// Unsubscribe and wait for files already being renamed
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);

        let in_flight = match self.loop_task.await {
            Ok(tasks) => tasks,
            Err(e) => {
                error!("Watch loop ended abnormally: {}", e);
                Vec::new()
            }
        };

        if !in_flight.is_empty() {
            debug!("Waiting for {} pending file(s)", in_flight.len());
        }
        for task in in_flight {
            if let Err(e) = task.await {
                warn!("Rename task failed: {}", e);
            }
        }
    }
}

/// Whether an event path is worth handing to the renamer
fn is_candidate(path: &Path, pattern: &SequencePattern) -> bool {
    if !should_process(path) || !pattern.accepts(path) {
        return false;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| !pattern.is_canonical(name))
        .unwrap_or(false)
}

fn actionable_path(event: WatchEvent, include_renames: bool) -> Option<PathBuf> {
    match event {
        WatchEvent::FileCreated(path) => Some(path),
        WatchEvent::FileRenamed { to, .. } if include_renames => Some(to),
        WatchEvent::Error(e) => {
            warn!("Watch error: {}", e);
            None
        }
        other => {
            trace!("Ignoring {:?}", other);
            None
        }
    }
}

fn run_loop(
    watcher: FileWatcher,
    renamer: Arc<SequenceRenamer>,
    settings: WatcherSettings,
    shutdown_rx: watch::Receiver<bool>,
    runtime: tokio::runtime::Handle,
) -> Vec<JoinHandle<()>> {
    let mut debouncer = Debouncer::new(settings.debounce());
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        // A dropped sender means the handle is gone
        match shutdown_rx.has_changed() {
            Ok(_) if *shutdown_rx.borrow() => break,
            Ok(_) => {}
            Err(_) => break,
        }

        let Some(event) = watcher.next_event(EVENT_POLL) else {
            continue;
        };
        in_flight.retain(|task| !task.is_finished());

        let Some(path) = actionable_path(event, settings.include_renames) else {
            continue;
        };
        if !is_candidate(&path, renamer.pattern()) {
            continue;
        }
        if !debouncer.accept(&path, Instant::now()) {
            debug!("Repeated event ignored: {:?}", path);
            continue;
        }

        debug!("New file: {:?}", path);
        let renamer = renamer.clone();
        let settings = settings.clone();
        in_flight.push(runtime.spawn(async move {
            process_new_file(path, &renamer, &settings).await;
        }));
    }

    debug!("Watch loop for {:?} stopping", watcher.watched_paths());
    in_flight
}

async fn process_new_file(path: PathBuf, renamer: &SequenceRenamer, settings: &WatcherSettings) {
    tokio::time::sleep(settings.debounce()).await;

    if !wait_for_stable(&path, settings.stability_timeout()).await {
        debug!("File disappeared during stability check: {:?}", path);
        return;
    }

    match renamer.append(&path).await {
        Ok(AppendOutcome::Renamed { from, to, .. }) => {
            info!(
                "{} -> {}",
                from.file_name().unwrap_or_default().to_string_lossy(),
                to.file_name().unwrap_or_default().to_string_lossy()
            );
        }
        Ok(AppendOutcome::AlreadyNamed) => debug!("Already named: {:?}", path),
        Ok(AppendOutcome::Vanished) => debug!("File gone before renaming: {:?}", path),
        Ok(AppendOutcome::Ignored) => trace!("Not an image: {:?}", path),
        Err(e) => error!("Could not rename {:?}: {}", path, e),
    }
}
