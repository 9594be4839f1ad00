// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A latch that holds worker threads until a test releases them.

use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    waiting: usize,
}

/// Blocking latch shared between a test and the work it schedules.
///
/// Workers call [`Gate::pass`] and block until the test calls
/// [`Gate::open`]. Once open, the gate stays open.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block the calling thread until the gate is opened.
    pub fn pass(&self) {
        let (lock, cvar) = &*self.inner;
        let mut state = lock.lock().unwrap_or_else(PoisonError::into_inner);
        state.waiting += 1;
        while !state.open {
            state = cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        state.waiting -= 1;
    }

    /// Release every current and future caller of [`Gate::pass`].
    pub fn open(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().unwrap_or_else(PoisonError::into_inner).open = true;
        cvar.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open
    }

    /// Threads currently blocked in [`Gate::pass`].
    pub fn waiting(&self) -> usize {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waiting
    }
}
