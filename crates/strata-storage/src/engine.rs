// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite engine backed by `rusqlite`.
//!
//! Connections are always opened in full-mutex (serialized) mode, and the
//! handle wraps the connection in a mutex as well: shared operations borrow it
//! from several worker threads at once.

use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OpenFlags};
use strata_core::{Engine, OpenMode, StrataError, CODE_ERROR};
use tracing::debug;

/// Convert a rusqlite error into an engine error carrying the primary result code.
pub fn map_sqlite_err(e: rusqlite::Error) -> StrataError {
    let code = e
        .sqlite_error()
        .map(|ffi| ffi.extended_code & 0xff)
        .unwrap_or(CODE_ERROR);
    StrataError::engine(code, e.to_string())
}

/// Translate an [`OpenMode`] into rusqlite open flags.
pub fn open_flags(mode: OpenMode) -> OpenFlags {
    let mut flags = OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    if mode.contains(OpenMode::READ_ONLY) {
        flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
    }
    if mode.contains(OpenMode::READ_WRITE) {
        flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
    }
    if mode.contains(OpenMode::CREATE) {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    flags
}

/// The default engine: one SQLite file per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

/// Native handle of an open SQLite connection.
#[derive(Debug)]
pub struct SqliteHandle {
    conn: Mutex<Connection>,
}

impl SqliteHandle {
    fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Borrow the underlying connection.
    ///
    /// A panic inside a previous borrow does not poison the handle; SQLite
    /// itself keeps the connection consistent.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Execute one or more statements that return no rows.
    pub fn execute_batch(&self, sql: &str) -> Result<(), StrataError> {
        self.lock().execute_batch(sql).map_err(map_sqlite_err)
    }

    fn into_inner(self) -> Connection {
        self.conn.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Engine for SqliteEngine {
    type Handle = SqliteHandle;

    fn open(&self, path: &str, mode: OpenMode) -> Result<SqliteHandle, StrataError> {
        debug!(path, ?mode, "sqlite open");
        Connection::open_with_flags(path, open_flags(mode))
            .map(SqliteHandle::new)
            .map_err(map_sqlite_err)
    }

    fn close(&self, handle: SqliteHandle) -> Result<(), (SqliteHandle, StrataError)> {
        debug!("sqlite close");
        handle
            .into_inner()
            .close()
            .map_err(|(conn, e)| (SqliteHandle::new(conn), map_sqlite_err(e)))
    }
}
