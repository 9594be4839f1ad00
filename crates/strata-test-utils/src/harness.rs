// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime helpers for scheduling tests.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

/// How long [`poll_until`] waits before giving up.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// A current-thread runtime with a single blocking worker.
///
/// Tokio's blocking pool runs queued work in submission order, so with one
/// worker the order in which the scheduler dispatches is exactly the order in
/// which the work executes.
pub fn serial_runtime() -> Runtime {
    Builder::new_current_thread()
        .max_blocking_threads(1)
        .enable_all()
        .build()
        .expect("failed to build serial test runtime")
}

/// Poll `condition` until it holds.
///
/// # Panics
///
/// Panics with `what` when the condition does not hold within [`POLL_TIMEOUT`].
pub async fn poll_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + POLL_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
