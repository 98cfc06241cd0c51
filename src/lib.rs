// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! seqrename: sequential photo renamer
//!
//! Watches a folder and renames incoming PNG images to `Prefix_01.png`,
//! `Prefix_02.png`, ... Existing images can be reorganised into a gap-free
//! sequence, and the chosen folder and prefix are remembered between runs.

pub mod config;
pub mod controller;
pub mod error;
pub mod naming;
pub mod renamer;
pub mod scanner;
pub mod service;
pub mod watcher;

pub use config::{Preferences, WatchConfig};
pub use error::{Result, SeqRenameError};
