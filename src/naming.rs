// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Sequential naming policy
//!
//! Turns a prefix and the set of suffixes already present in a folder into
//! the next `{prefix}_{NN}.{ext}` filename. Everything here is pure; the
//! scanner and the renamer feed it what they find on disk.

use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;
use std::path::Path;

use crate::{Result, SeqRenameError};

/// Minimum width of the zero-padded suffix
pub const SUFFIX_WIDTH: usize = 2;

/// Prefix offered when nothing has been saved yet
pub const DEFAULT_PREFIX: &str = "Horizon";

/// Extension used when none is configured
pub const DEFAULT_EXTENSION: &str = "png";

/// Characters that are not allowed in a prefix on at least one platform
const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// How the next suffix is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberingMode {
    /// Smallest free suffix, used when reorganising a folder into 1..N
    Compact,
    /// One past the highest suffix, used for files arriving while watching
    Append,
}

/// Suffixes already taken by the current prefix in one folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceState {
    used: BTreeSet<u32>,
}

impl SequenceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a suffix as taken. Returns false if it already was.
    pub fn insert(&mut self, suffix: u32) -> bool {
        self.used.insert(suffix)
    }

    pub fn contains(&self, suffix: u32) -> bool {
        self.used.contains(&suffix)
    }

    /// Highest suffix in use
    pub fn max(&self) -> Option<u32> {
        self.used.iter().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Next suffix for the given mode. Always >= 1.
    pub fn next(&self, mode: NumberingMode) -> u32 {
        match mode {
            NumberingMode::Append => self.max().map_or(1, |m| m.saturating_add(1)),
            NumberingMode::Compact => {
                let mut candidate = 1u32;
                for &used in &self.used {
                    if used < candidate {
                        continue;
                    }
                    if used == candidate {
                        candidate = candidate.saturating_add(1);
                    } else {
                        break;
                    }
                }
                candidate
            }
        }
    }
}

impl FromIterator<u32> for SequenceState {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            used: iter.into_iter().collect(),
        }
    }
}

/// Build `{prefix}_{suffix}.{ext}` with the suffix padded to two digits or more
pub fn format_name(prefix: &str, suffix: u32, ext: &str) -> String {
    format!(
        "{}_{:0width$}.{}",
        prefix,
        suffix,
        ext.to_lowercase(),
        width = SUFFIX_WIDTH
    )
}

/// Next suffix and `.png` filename for `prefix`
pub fn next_name(prefix: &str, used: &SequenceState, mode: NumberingMode) -> (u32, String) {
    next_name_with_ext(prefix, used, mode, DEFAULT_EXTENSION)
}

/// Same as [`next_name`] but keeps the given extension
pub fn next_name_with_ext(
    prefix: &str,
    used: &SequenceState,
    mode: NumberingMode,
    ext: &str,
) -> (u32, String) {
    let suffix = used.next(mode);
    (suffix, format_name(prefix, suffix, ext))
}

/// Check a user-typed prefix and return it trimmed
pub fn validate_prefix(raw: &str) -> Result<String> {
    let prefix = raw.trim();

    if prefix.is_empty() {
        return Err(SeqRenameError::Config("The prefix cannot be empty".to_string()));
    }
    if prefix == "." || prefix == ".." {
        return Err(SeqRenameError::Config(format!(
            "'{}' cannot be used as a prefix",
            prefix
        )));
    }
    if let Some(c) = prefix
        .chars()
        .find(|c| RESERVED_CHARS.contains(c) || c.is_control())
    {
        return Err(SeqRenameError::Config(format!(
            "The prefix cannot contain '{}'",
            c.escape_default()
        )));
    }

    Ok(prefix.to_string())
}

/// Lower-case the extensions, strip leading dots and drop duplicates.
/// An empty list falls back to PNG only.
pub fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }
    if normalized.is_empty() {
        normalized.push(DEFAULT_EXTENSION.to_string());
    }
    normalized
}

/// Matcher for `{prefix}_{NN}.{ext}` names in one folder
#[derive(Debug, Clone)]
pub struct SequencePattern {
    prefix: String,
    extensions: Vec<String>,
    regex: Regex,
}

impl SequencePattern {
    pub fn new(prefix: &str, extensions: &[String]) -> Result<Self> {
        let extensions = normalize_extensions(extensions);
        let alternatives = extensions
            .iter()
            .map(|e| regex::escape(e))
            .collect::<Vec<_>>()
            .join("|");
        let source = format!(
            r"^{}_(\d{{{},}})\.({})$",
            regex::escape(prefix),
            SUFFIX_WIDTH,
            alternatives
        );

        let regex = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .map_err(|e| SeqRenameError::Config(format!("Unusable prefix '{}': {}", prefix, e)))?;

        Ok(Self {
            prefix: prefix.to_string(),
            extensions,
            regex,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Suffix carried by a name of the form `{prefix}_{NN}.{ext}`.
    /// Matching ignores case so look-alike names still count as taken.
    pub fn parse_suffix(&self, file_name: &str) -> Option<u32> {
        let caps = self.regex.captures(file_name)?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// True when the name is what [`format_name`] produces for its suffix.
    /// Only the extension may differ in case.
    pub fn is_canonical(&self, file_name: &str) -> bool {
        let Some(suffix) = self.parse_suffix(file_name) else {
            return false;
        };
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        stem == format!("{}_{:0width$}", self.prefix, suffix, width = SUFFIX_WIDTH)
    }

    /// Whether the path carries one of the accepted extensions
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }

    /// Extension the renamed file should carry
    pub fn target_extension(&self, path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.extensions[0].clone())
    }

    /// Next name for `path` given what is already used
    pub fn next_name_for(
        &self,
        path: &Path,
        used: &SequenceState,
        mode: NumberingMode,
    ) -> (u32, String) {
        next_name_with_ext(&self.prefix, used, mode, &self.target_extension(path))
    }
}
