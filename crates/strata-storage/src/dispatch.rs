// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker dispatch.
//!
//! Runs blocking engine work on Tokio's blocking pool. The completion handler
//! runs on the worker thread right after the work and is expected to hand the
//! result back to the event loop (it only posts a message). Every dispatch is
//! registered with a [`TaskTracker`] so callers can wait for outstanding work,
//! including background finalization of dropped connections.

use std::panic::{catch_unwind, AssertUnwindSafe};

use strata_core::StrataError;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{warn, Instrument};

/// Handle to the worker pool shared by one or more connections.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    runtime: Handle,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Dispatcher on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like `tokio::spawn`.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tracker: TaskTracker::new(),
        }
    }

    /// Run `work` off the calling thread, then pass its result to `on_complete`.
    ///
    /// A panic inside `work` is reported to `on_complete` as
    /// [`StrataError::Dispatch`] instead of unwinding the worker.
    pub fn dispatch<T, W, C>(&self, work: W, on_complete: C)
    where
        T: Send + 'static,
        W: FnOnce() -> T + Send + 'static,
        C: FnOnce(Result<T, StrataError>) + Send + 'static,
    {
        let token = self.tracker.token();
        self.runtime.spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(work)).map_err(|panic| {
                let reason = panic_message(panic.as_ref());
                warn!(%reason, "worker dispatch panicked");
                StrataError::Dispatch(format!("worker panicked: {reason}"))
            });
            on_complete(result);
            drop(token);
        });
    }

    /// Spawn an async task tracked alongside the dispatches.
    ///
    /// The task runs inside the caller's current span.
    pub(crate) fn spawn<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(future.in_current_span(), &self.runtime);
    }

    /// Number of dispatches and tracked tasks still running.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every tracked dispatch and task has finished.
    ///
    /// Each connection's event loop is a tracked task that only ends once its
    /// last [`Database`](crate::Database) handle is dropped and the native
    /// handle is released. Drop every handle on this dispatcher before
    /// awaiting, or this never returns.
    ///
    /// New work may still be dispatched afterwards; it is tracked as before.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
