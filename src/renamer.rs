// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Append-mode renaming of files that arrive while watching

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::WatchConfig;
use crate::naming::{NumberingMode, SequencePattern};
use crate::scanner::scan_sequence;
use crate::{Result, SeqRenameError};

/// How many taken names are skipped before giving up on a file
pub const MAX_CONFLICT_RETRIES: u32 = 16;

/// What happened to a file handed to the renamer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Renamed { from: PathBuf, to: PathBuf, suffix: u32 },
    /// Already carries a name in the sequence
    AlreadyNamed,
    /// Gone before it could be renamed
    Vanished,
    /// Not an accepted image type
    Ignored,
}

/// Rename `from` to `to` unless `to` already exists.
///
/// A change that only touches letter case goes through a hidden temporary
/// name so case-insensitive file systems do not report a false conflict.
pub fn rename_no_clobber(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if to.exists() {
        if is_case_only_change(from, to) {
            return rename_case_only(from, to);
        }
        return Err(SeqRenameError::RenameConflict(to.to_path_buf()));
    }
    std::fs::rename(from, to)?;
    Ok(())
}

fn is_case_only_change(from: &Path, to: &Path) -> bool {
    from.parent() == to.parent()
        && from
            .to_string_lossy()
            .to_lowercase()
            .eq(&to.to_string_lossy().to_lowercase())
}

/// Hidden name next to `path` used while a rename is in progress.
/// The watcher and the folder listing both skip it.
pub(crate) fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.seqrename-tmp", file_name))
}

fn rename_case_only(from: &Path, to: &Path) -> Result<()> {
    let temp = temp_path_for(from);

    std::fs::rename(from, &temp)?;
    if to.exists() {
        // `to` was a different file after all
        std::fs::rename(&temp, from)?;
        return Err(SeqRenameError::RenameConflict(to.to_path_buf()));
    }
    std::fs::rename(&temp, to)?;
    Ok(())
}

/// Gives each new file the next number in its folder.
///
/// Appends through the same renamer run one at a time, so the suffix read
/// from disk is still free when the rename happens. Other processes are
/// handled by retrying with the next suffix.
#[derive(Debug, Clone)]
pub struct SequenceRenamer {
    config: WatchConfig,
    pattern: SequencePattern,
    lock: Arc<Mutex<()>>,
}

impl SequenceRenamer {
    pub fn new(config: WatchConfig) -> Result<Self> {
        let pattern = SequencePattern::new(&config.prefix, &config.extensions)?;
        Ok(Self {
            config,
            pattern,
            lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn pattern(&self) -> &SequencePattern {
        &self.pattern
    }

    /// Rename `path` to the next free name after the highest one in use
    pub async fn append(&self, path: &Path) -> Result<AppendOutcome> {
        let _guard = self.lock.lock().await;
        self.append_locked(path)
    }

    fn append_locked(&self, path: &Path) -> Result<AppendOutcome> {
        if !path.exists() {
            return Ok(AppendOutcome::Vanished);
        }
        if !self.pattern.accepts(path) {
            return Ok(AppendOutcome::Ignored);
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Ok(AppendOutcome::Ignored);
        };
        if self.pattern.is_canonical(name) {
            return Ok(AppendOutcome::AlreadyNamed);
        }

        let dir = path.parent().unwrap_or(self.config.directory.as_path());
        let mut used = scan_sequence(dir, &self.pattern)?;
        debug!("{} numbers in use in {:?}", used.len(), dir);

        let mut last_conflict = None;
        for _ in 0..=MAX_CONFLICT_RETRIES {
            let (suffix, new_name) = self.pattern.next_name_for(path, &used, NumberingMode::Append);
            let target = dir.join(&new_name);

            match rename_no_clobber(path, &target) {
                Ok(()) => {
                    return Ok(AppendOutcome::Renamed {
                        from: path.to_path_buf(),
                        to: target,
                        suffix,
                    })
                }
                Err(SeqRenameError::RenameConflict(taken)) => {
                    warn!("{} already exists, trying the next number", new_name);
                    used.insert(suffix);
                    last_conflict = Some(taken);
                }
                Err(e) => return Err(e),
            }
        }

        Err(SeqRenameError::RenameConflict(
            last_conflict.unwrap_or_else(|| path.to_path_buf()),
        ))
    }
}
