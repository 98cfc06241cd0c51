// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Folder scanning and reorganisation into a gap-free sequence

use glob::{glob_with, MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::naming::{NumberingMode, SequencePattern, SequenceState};
use crate::renamer::{rename_no_clobber, temp_path_for};
use crate::watcher::should_process;
use crate::{Result, SeqRenameError};

/// One rename the reorganiser intends to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRename {
    pub from: PathBuf,
    pub to: PathBuf,
    pub suffix: u32,
}

/// Outcome of a reorganisation pass
#[derive(Debug, Default)]
pub struct ReorganizeReport {
    /// Image files found in the folder
    pub total: usize,
    pub renamed: Vec<PlannedRename>,
    /// Renames that failed, with the reason shown to the user
    pub failed: Vec<(PlannedRename, String)>,
}

impl ReorganizeReport {
    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Image files directly inside `dir`, sorted by file name.
///
/// Extensions match regardless of case. Hidden files, partial downloads
/// and anything that is not a regular file are left out.
pub fn list_images(dir: &Path, pattern: &SequencePattern) -> Result<Vec<PathBuf>> {
    let dir_str = dir.to_str().ok_or_else(|| {
        SeqRenameError::Config(format!("Folder name is not valid UTF-8: {}", dir.display()))
    })?;
    let escaped = Pattern::escape(dir_str);

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };

    let mut found = BTreeSet::new();
    for ext in pattern.extensions() {
        let glob_pattern = Path::new(&escaped).join(format!("*.{}", Pattern::escape(ext)));
        let glob_pattern = glob_pattern.to_string_lossy();
        for entry in glob_with(&glob_pattern, options)? {
            match entry {
                Ok(path) if path.is_file() && should_process(&path) => {
                    found.insert(path);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry: {}", e),
            }
        }
    }

    let mut files: Vec<PathBuf> = found.into_iter().collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Suffixes already used by the prefix in `dir`
pub fn scan_sequence(dir: &Path, pattern: &SequencePattern) -> Result<SequenceState> {
    let state = list_images(dir, pattern)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter_map(|name| pattern.parse_suffix(name))
        .collect();
    Ok(state)
}

/// Work out which files must move so the folder holds exactly `1..=N`.
///
/// Files that already carry a canonical name within range stay where they
/// are. Everything else takes the free suffixes in file name order.
pub fn plan_reorganize(config: &WatchConfig) -> Result<Vec<PlannedRename>> {
    let pattern = SequencePattern::new(&config.prefix, &config.extensions)?;
    let files = list_images(&config.directory, &pattern)?;
    Ok(plan_for(&files, &pattern))
}

fn plan_for(files: &[PathBuf], pattern: &SequencePattern) -> Vec<PlannedRename> {
    let total = u32::try_from(files.len()).unwrap_or(u32::MAX);
    let mut taken = SequenceState::new();
    let mut movers = Vec::new();

    for file in files {
        let suffix = file
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|name| pattern.is_canonical(name))
            .and_then(|name| pattern.parse_suffix(name));

        match suffix {
            Some(n) if n <= total && taken.insert(n) => {}
            _ => movers.push(file),
        }
    }

    let mut plan = Vec::with_capacity(movers.len());
    for file in movers {
        let (suffix, name) = pattern.next_name_for(file, &taken, NumberingMode::Compact);
        taken.insert(suffix);
        plan.push(PlannedRename {
            from: file.clone(),
            to: file.with_file_name(name),
            suffix,
        });
    }
    plan
}

/// Carry out a plan. A failed rename is recorded and the rest still run.
///
/// Every file first moves to a hidden temporary name, then to its target.
/// A target still held by a later file of the same plan, possibly under a
/// different letter case, is free by the time it is needed.
pub fn apply_plan(plan: Vec<PlannedRename>, total: usize) -> ReorganizeReport {
    let mut report = ReorganizeReport {
        total,
        ..Default::default()
    };

    let mut parked = Vec::with_capacity(plan.len());
    for step in plan {
        let temp = temp_path_for(&step.from);
        match rename_no_clobber(&step.from, &temp) {
            Ok(()) => parked.push((step, temp)),
            Err(e) => {
                warn!("Could not move {:?} aside: {}", step.from, e);
                report.failed.push((step, e.to_string()));
            }
        }
    }

    for (step, temp) in parked {
        match rename_no_clobber(&temp, &step.to) {
            Ok(()) => {
                info!("Renamed {:?} -> {:?}", step.from, step.to);
                report.renamed.push(step);
            }
            Err(e) => {
                warn!("Could not rename {:?}: {}", step.from, e);
                if let Err(restore) = rename_no_clobber(&temp, &step.from) {
                    error!("{:?} left as {:?}: {}", step.from, temp, restore);
                }
                report.failed.push((step, e.to_string()));
            }
        }
    }

    report
}

/// Reorganise the folder named in `config`
pub fn reorganize(config: &WatchConfig) -> Result<ReorganizeReport> {
    let pattern = SequencePattern::new(&config.prefix, &config.extensions)?;
    let files = list_images(&config.directory, &pattern)?;
    let plan = plan_for(&files, &pattern);

    if plan.is_empty() {
        debug!("{:?} already in order ({} files)", config.directory, files.len());
        return Ok(ReorganizeReport {
            total: files.len(),
            ..Default::default()
        });
    }

    info!("Reorganising {} of {} files in {:?}", plan.len(), files.len(), config.directory);
    Ok(apply_plan(plan, files.len()))
}
