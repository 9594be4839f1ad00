// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! Every struct uses `#[serde(deny_unknown_fields)]` so typos are reported at
//! startup instead of being silently ignored.

use serde::{Deserialize, Serialize};
use strata_core::OpenMode;

/// Top-level Strata configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    /// Database connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub log: LogConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_path")]
    pub path: String,

    /// Open without write access.
    #[serde(default)]
    pub read_only: bool,

    /// Create the file when it does not exist.
    #[serde(default = "default_create")]
    pub create: bool,

    /// Buffered open/close/error events per subscriber.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl DatabaseConfig {
    /// The open-mode bitmask these settings describe.
    pub fn open_mode(&self) -> OpenMode {
        let mut mode = if self.read_only {
            OpenMode::READ_ONLY
        } else {
            OpenMode::READ_WRITE
        };
        if self.create {
            mode |= OpenMode::CREATE;
        }
        mode
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            read_only: false,
            create: default_create(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_path() -> String {
    "strata.db".to_string()
}

fn default_create() -> bool {
    true
}

fn default_event_capacity() -> usize {
    64
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
