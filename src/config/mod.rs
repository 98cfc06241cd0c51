// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Persisted preferences and the active watch configuration

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::naming::{self, DEFAULT_EXTENSION, DEFAULT_PREFIX};
use crate::{Result, SeqRenameError};

/// Name of the directory created under the platform config dir
pub const APP_DIR_NAME: &str = "seqrename";

/// Name of the preferences file
pub const PREFERENCES_FILE: &str = "preferences.json";

/// Everything remembered between runs
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Preferences {
    /// Last folder being watched
    #[serde(default)]
    pub watch_dir: Option<PathBuf>,

    /// Last prefix in use
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// When the preferences were last written
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,

    /// Last prefix used in each folder
    #[serde(default)]
    pub folders: BTreeMap<PathBuf, String>,

    /// Image extensions to rename
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Reorganise the folder before watching starts
    #[serde(default = "default_true")]
    pub reorganize_on_start: bool,

    /// Watcher tuning
    #[serde(default)]
    pub watcher: WatcherSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct WatcherSettings {
    /// Quiet period after a creation event before the file is touched
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Longest wait for a file to stop growing
    #[serde(default = "default_stability_timeout")]
    pub stability_timeout_secs: u64,

    /// Poll interval for backends that need one
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Treat a file renamed into an accepted name as new
    #[serde(default)]
    pub include_renames: bool,
}

// Default value functions
fn default_prefix() -> String { DEFAULT_PREFIX.to_string() }
fn default_extensions() -> Vec<String> { vec![DEFAULT_EXTENSION.to_string()] }
fn default_true() -> bool { true }
fn default_debounce_ms() -> u64 { 1000 }
fn default_stability_timeout() -> u64 { 5 }
fn default_poll_interval_ms() -> u64 { 2000 }

impl Default for Preferences {
    fn default() -> Self {
        Self {
            watch_dir: None,
            prefix: default_prefix(),
            last_used: None,
            folders: BTreeMap::new(),
            extensions: default_extensions(),
            reorganize_on_start: true,
            watcher: WatcherSettings::default(),
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            stability_timeout_secs: default_stability_timeout(),
            poll_interval_ms: default_poll_interval_ms(),
            include_renames: false,
        }
    }
}

impl WatcherSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn stability_timeout(&self) -> Duration {
        Duration::from_secs(self.stability_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Default location of the preferences file
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PREFERENCES_FILE)
}

impl Preferences {
    /// Load preferences from a JSON file.
    ///
    /// A missing file gives defaults. A corrupt file is reported and also
    /// gives defaults so a broken file never blocks the tool.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No preferences at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        match serde_json::from_str(&content) {
            Ok(prefs) => Ok(prefs),
            Err(e) => {
                tracing::warn!("Preferences at {:?} are unreadable ({}), using defaults", path, e);
                Ok(Self::default())
            }
        }
    }

    /// Save preferences to a JSON file, creating its directory if needed
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.last_used = Some(Utc::now());
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        tracing::debug!("Preferences saved to {:?}", path);
        Ok(())
    }

    /// Prefix last used in `dir`, or the global one
    pub fn prefix_for(&self, dir: &Path) -> &str {
        self.folders
            .get(dir)
            .map(String::as_str)
            .unwrap_or(&self.prefix)
    }

    /// Record the active configuration
    pub fn remember(&mut self, config: &WatchConfig) {
        self.watch_dir = Some(config.directory.clone());
        self.prefix = config.prefix.clone();
        self.folders
            .insert(config.directory.clone(), config.prefix.clone());
    }

    /// Configuration to resume with, if the saved folder is still usable
    pub fn resume(&self) -> Option<Result<WatchConfig>> {
        let dir = self.watch_dir.as_ref()?;
        Some(WatchConfig::new(dir, self.prefix_for(dir), &self.extensions))
    }
}

/// Folder and prefix handed to the scanner and the watcher.
///
/// Never edited in place: a change of folder or prefix builds a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub extensions: Vec<String>,
}

impl WatchConfig {
    /// Validate the folder and prefix
    pub fn new(directory: &Path, prefix: &str, extensions: &[String]) -> Result<Self> {
        let directory = validate_directory(directory)?;
        let prefix = naming::validate_prefix(prefix)?;
        Ok(Self {
            directory,
            prefix,
            extensions: naming::normalize_extensions(extensions),
        })
    }

    /// Same folder, different prefix
    pub fn with_prefix(&self, prefix: &str) -> Result<Self> {
        Ok(Self {
            directory: self.directory.clone(),
            prefix: naming::validate_prefix(prefix)?,
            extensions: self.extensions.clone(),
        })
    }
}

/// Expand a leading `~` and check that the path is an existing folder
pub fn validate_directory(raw: &Path) -> Result<PathBuf> {
    let text = raw.to_string_lossy();
    let trimmed = text.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Err(SeqRenameError::Config("No folder given".to_string()));
    }

    let path = match trimmed.strip_prefix('~') {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
            None => PathBuf::from(trimmed),
        },
        None => PathBuf::from(trimmed),
    };

    if !path.exists() {
        return Err(SeqRenameError::Config(format!(
            "The folder {} does not exist",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(SeqRenameError::Config(format!(
            "{} is not a folder",
            path.display()
        )));
    }

    Ok(path)
}
