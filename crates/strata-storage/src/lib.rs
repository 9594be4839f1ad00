// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Asynchronous, serialized access to a blocking database connection.
//!
//! Each [`Database`] is driven by its own event loop. Shared operations run
//! concurrently on worker threads, while open and close run exclusively and
//! in strict arrival order. The native connection is closed in the
//! background when the last handle is dropped while it is still open.

mod connection;
pub mod database;
pub mod dispatch;
pub mod engine;
pub mod lifecycle;
pub mod scheduler;

pub use connection::Completion;
pub use database::{Database, DatabaseBuilder, DEFAULT_EVENT_CAPACITY};
pub use dispatch::Dispatcher;
pub use engine::{map_sqlite_err, SqliteEngine, SqliteHandle};
