// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for Strata.
//!
//! Holds the error type, the shared value types, and the [`Engine`] trait the
//! connection scheduler drives. Storage, configuration, and the CLI all build
//! on the items defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{StrataError, CODE_ERROR, CODE_MISUSE};
pub use traits::Engine;
pub use types::{Event, OpenMode, Phase, Snapshot};
