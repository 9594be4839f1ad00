// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedded engine trait.
//!
//! An engine turns a path and open mode into a native connection handle and
//! tears that handle down again. Both calls block the calling thread and are
//! only ever made from a worker dispatch, never from the event loop.

use crate::error::StrataError;
use crate::types::OpenMode;

/// Blocking open/close primitives of an embedded database engine.
pub trait Engine: Send + Sync + 'static {
    /// Native connection handle.
    ///
    /// Shared operations borrow the handle from worker threads concurrently,
    /// so it must be `Sync`; engines serialize access internally.
    type Handle: Send + Sync + 'static;

    /// Open a connection to `path`.
    fn open(&self, path: &str, mode: OpenMode) -> Result<Self::Handle, StrataError>;

    /// Close a connection.
    ///
    /// On failure the handle is handed back so the close can be retried.
    fn close(&self, handle: Self::Handle) -> Result<(), (Self::Handle, StrataError)>;
}
