// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Integration tests for the interactive controller
//!
//! These tests verify:
//! - An unusable folder is reported and asked for again
//! - Choosing a folder reorganises it and saves the preferences
//! - Changing the prefix restarts watching with the new prefix
//! - Saved folders can be picked by number
//! - The menu can switch folders and reorganise the current one
//! - Closed input and shutdown signals stop the controller

use seqrename::config::WatcherSettings;
use seqrename::controller::{Controller, ControllerOptions};
use seqrename::{Preferences, WatchConfig};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

/// Output buffer that can be read while the controller owns a clone
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn fast_options() -> ControllerOptions {
    ControllerOptions {
        reorganize_on_start: true,
        watcher: WatcherSettings {
            debounce_ms: 50,
            stability_timeout_secs: 2,
            ..WatcherSettings::default()
        },
        prefix_override: None,
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

fn saved_prefix(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let prefs: Preferences = serde_json::from_str(&content).ok()?;
    Some(prefs.prefix)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_asks_again_after_bad_folder() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    fs::write(photos.path().join("b.png"), b"b").unwrap();
    fs::write(photos.path().join("a.png"), b"a").unwrap();
    let prefs_path = home.path().join("preferences.json");

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();

    tx.send("/definitely/not/a/folder".to_string()).await.unwrap();
    tx.send(photos.path().display().to_string()).await.unwrap();
    tx.send("quit".to_string()).await.unwrap();

    let controller = Controller::new(
        Preferences::default(),
        prefs_path.clone(),
        fast_options(),
        rx,
        shutdown_rx,
        out.clone(),
    );
    controller.run(None).await.unwrap();

    let text = out.text();
    assert!(text.contains("does not exist"), "output: {}", text);
    assert!(text.contains("Watching"), "output: {}", text);
    assert!(text.ends_with("Stopped.\n"), "output: {}", text);

    assert_eq!(fs::read(photos.path().join("Horizon_01.png")).unwrap(), b"a");
    assert_eq!(fs::read(photos.path().join("Horizon_02.png")).unwrap(), b"b");

    let saved = Preferences::load(&prefs_path).unwrap();
    assert_eq!(saved.watch_dir.as_deref(), Some(photos.path()));
    assert_eq!(saved.prefix, "Horizon");
    assert!(saved.last_used.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_prefix_from_menu() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    fs::write(photos.path().join("first.png"), b"first").unwrap();
    let prefs_path = home.path().join("preferences.json");

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();

    let prefs = Preferences::default();
    let config = WatchConfig::new(photos.path(), "Horizon", &prefs.extensions).unwrap();
    let controller = Controller::new(prefs, prefs_path.clone(), fast_options(), rx, shutdown_rx, out.clone());
    let task = tokio::spawn(controller.run(Some(config)));

    for line in ["menu", "3", "Sunset", "5"] {
        tx.send(line.to_string()).await.unwrap();
    }
    assert!(wait_until(|| saved_prefix(&prefs_path).as_deref() == Some("Sunset")).await);
    assert!(wait_until(|| out.text().contains("Back to watching.")).await);

    fs::write(photos.path().join("second.png"), b"second").unwrap();
    let renamed = photos.path().join("Sunset_01.png");
    assert!(wait_until(|| renamed.exists()).await, "output: {}", out.text());

    tx.send("quit".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    assert_eq!(fs::read(photos.path().join("Horizon_01.png")).unwrap(), b"first");
    assert_eq!(fs::read(&renamed).unwrap(), b"second");
    assert!(out.text().contains("Watching") && out.text().contains("'Sunset'"));

    let saved = Preferences::load(&prefs_path).unwrap();
    assert_eq!(saved.prefix_for(photos.path()), "Sunset");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_prefix_is_asked_again() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    let prefs_path = home.path().join("preferences.json");

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();

    for line in ["m", "3", "bad/name", "", "6"] {
        tx.send(line.to_string()).await.unwrap();
    }

    let prefs = Preferences::default();
    let config = WatchConfig::new(photos.path(), "Horizon", &prefs.extensions).unwrap();
    let controller = Controller::new(prefs, prefs_path.clone(), fast_options(), rx, shutdown_rx, out.clone());
    controller.run(Some(config)).await.unwrap();

    let text = out.text();
    assert!(text.contains("Prefix unchanged."), "output: {}", text);
    assert_eq!(saved_prefix(&prefs_path).as_deref(), Some("Horizon"));
}

#[tokio::test]
async fn test_closed_input_while_idle_stops() {
    let home = TempDir::new().unwrap();
    let (tx, rx) = mpsc::channel::<String>(1);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();
    drop(tx);

    let controller = Controller::new(
        Preferences::default(),
        home.path().join("preferences.json"),
        fast_options(),
        rx,
        shutdown_rx,
        out.clone(),
    );
    controller.run(None).await.unwrap();

    assert!(out.text().contains("Stopped."));
    assert!(!home.path().join("preferences.json").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_signal_stops_watching() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();

    let (tx, rx) = mpsc::channel::<String>(1);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();

    let prefs = Preferences::default();
    let config = WatchConfig::new(photos.path(), "Horizon", &prefs.extensions).unwrap();
    let controller = Controller::new(
        prefs,
        home.path().join("preferences.json"),
        fast_options(),
        rx,
        shutdown_rx,
        out.clone(),
    );
    let task = tokio::spawn(controller.run(Some(config)));

    // Closed input keeps the watcher running until the signal
    drop(tx);
    assert!(wait_until(|| out.text().contains("Watching")).await);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!task.is_finished());

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(10), task).await;
    tokio_test::assert_ok!(result.unwrap().unwrap());
    assert!(out.text().contains("Stopped."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_saved_folder_picked_by_number() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    fs::write(photos.path().join("x.png"), b"x").unwrap();
    let prefs_path = home.path().join("preferences.json");

    let mut prefs = Preferences::default();
    prefs.folders.insert(photos.path().to_path_buf(), "Trip".to_string());

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();
    for line in ["1", "quit"] {
        tx.send(line.to_string()).await.unwrap();
    }

    let controller = Controller::new(prefs, prefs_path.clone(), fast_options(), rx, shutdown_rx, out.clone());
    controller.run(None).await.unwrap();

    let text = out.text();
    assert!(text.contains("Saved folders:"), "output: {}", text);
    assert!(text.contains(&format!("1. {} (prefix 'Trip')", photos.path().display())), "output: {}", text);
    assert_eq!(fs::read(photos.path().join("Trip_01.png")).unwrap(), b"x");
    assert_eq!(saved_prefix(&prefs_path).as_deref(), Some("Trip"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_command_line_prefix_wins_over_saved_folder() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    fs::write(photos.path().join("x.png"), b"x").unwrap();

    let mut prefs = Preferences::default();
    prefs.folders.insert(photos.path().to_path_buf(), "Old".to_string());
    let mut options = fast_options();
    options.prefix_override = Some("Cli".to_string());

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    for line in [photos.path().display().to_string(), "quit".to_string()] {
        tx.send(line).await.unwrap();
    }

    let controller = Controller::new(
        prefs,
        home.path().join("preferences.json"),
        options,
        rx,
        shutdown_rx,
        SharedBuf::default(),
    );
    controller.run(None).await.unwrap();

    assert!(photos.path().join("Cli_01.png").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_change_folder_from_menu() {
    let home = TempDir::new().unwrap();
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    fs::write(second.path().join("old.png"), b"old").unwrap();
    let prefs_path = home.path().join("preferences.json");

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();

    let prefs = Preferences::default();
    let config = WatchConfig::new(first.path(), "Horizon", &prefs.extensions).unwrap();
    let controller = Controller::new(prefs, prefs_path.clone(), fast_options(), rx, shutdown_rx, out.clone());
    let task = tokio::spawn(controller.run(Some(config)));

    let second_path = second.path().display().to_string();
    for line in ["menu", "2", "/definitely/not/a/folder", second_path.as_str(), "5"] {
        tx.send(line.to_string()).await.unwrap();
    }
    assert!(wait_until(|| out.text().contains("Back to watching.")).await, "output: {}", out.text());

    // Reorganised on switch, then watched
    assert_eq!(fs::read(second.path().join("Horizon_01.png")).unwrap(), b"old");
    fs::write(second.path().join("new.png"), b"new").unwrap();
    let renamed = second.path().join("Horizon_02.png");
    assert!(wait_until(|| renamed.exists()).await, "output: {}", out.text());

    // The old folder is no longer watched
    fs::write(first.path().join("stray.png"), b"stray").unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(first.path().join("stray.png").exists());

    tx.send("quit".to_string()).await.unwrap();
    task.await.unwrap().unwrap();

    assert!(out.text().contains("does not exist"));
    let saved = Preferences::load(&prefs_path).unwrap();
    assert_eq!(saved.watch_dir.as_deref(), Some(second.path()));
    assert!(saved.folders.contains_key(first.path()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reorganize_from_menu() {
    let home = TempDir::new().unwrap();
    let photos = TempDir::new().unwrap();
    let mut options = fast_options();
    options.reorganize_on_start = false;

    fs::write(photos.path().join("Horizon_01.png"), b"one").unwrap();
    fs::write(photos.path().join("Horizon_05.png"), b"five").unwrap();
    fs::write(photos.path().join("b.png"), b"b").unwrap();

    let (tx, rx) = mpsc::channel(16);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let out = SharedBuf::default();
    for line in ["menu", "4", "6"] {
        tx.send(line.to_string()).await.unwrap();
    }

    let prefs = Preferences::default();
    let config = WatchConfig::new(photos.path(), "Horizon", &prefs.extensions).unwrap();
    let controller = Controller::new(
        prefs,
        home.path().join("preferences.json"),
        options,
        rx,
        shutdown_rx,
        out.clone(),
    );
    controller.run(Some(config)).await.unwrap();

    let text = out.text();
    assert!(text.contains("2 of 3 file(s) renamed."), "output: {}", text);
    assert_eq!(fs::read(photos.path().join("Horizon_01.png")).unwrap(), b"one");
    assert_eq!(fs::read(photos.path().join("Horizon_02.png")).unwrap(), b"five");
    assert_eq!(fs::read(photos.path().join("Horizon_03.png")).unwrap(), b"b");
    assert!(!photos.path().join("Horizon_05.png").exists());
}
