// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for Strata connections.

use thiserror::Error;

/// Status code reported for generic failures.
pub const CODE_ERROR: i32 = 1;

/// Status code reported when a connection is used outside its lifecycle.
pub const CODE_MISUSE: i32 = 21;

/// The primary error type delivered to completion actions and `Error` events.
///
/// Cloneable so a single failure can be fanned out to every event subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrataError {
    /// Configuration errors (invalid TOML, unknown keys, failed validation).
    #[error("configuration error: {0}")]
    Config(String),

    /// The connection was used while closed or closing.
    #[error("SQLITE_MISUSE: {message}")]
    Misuse { message: String },

    /// The embedded engine rejected an open, close, or query.
    #[error("engine error {code}: {message}")]
    Engine { code: i32, message: String },

    /// A worker task panicked or the event loop is no longer running.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// The error returned for any request that arrives after the connection closed.
    pub fn closed() -> Self {
        StrataError::Misuse {
            message: "Database is closed".into(),
        }
    }

    /// Build an engine error from a native status code and message.
    pub fn engine(code: i32, message: impl Into<String>) -> Self {
        StrataError::Engine {
            code,
            message: message.into(),
        }
    }

    /// SQLite-style status code for this error.
    pub fn code(&self) -> i32 {
        match self {
            StrataError::Misuse { .. } => CODE_MISUSE,
            StrataError::Engine { code, .. } => *code,
            _ => CODE_ERROR,
        }
    }

    /// Whether this error is a lifecycle misuse.
    pub fn is_misuse(&self) -> bool {
        matches!(self, StrataError::Misuse { .. })
    }
}
