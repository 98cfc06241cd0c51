// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for seqrename

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for seqrename operations
pub type Result<T> = std::result::Result<T, SeqRenameError>;

/// seqrename error types
#[derive(Error, Debug)]
pub enum SeqRenameError {
    /// Invalid or missing folder / prefix. The user is asked again.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The target name is already taken on disk.
    #[error("Target name already exists: {}", .0.display())]
    RenameConflict(PathBuf),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    /// Could not start watching the folder; the process exits non-zero.
    #[error("Cannot start watching: {0}")]
    Startup(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl SeqRenameError {
    /// Whether this error must end the process rather than skip one file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SeqRenameError::Startup(_))
    }
}
