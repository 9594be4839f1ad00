// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-connection operation scheduler.
//!
//! [`ConnectionState`] owns the lifecycle flags, the pending counter, the FIFO
//! of deferred [`Call`]s, and the native handle. It only decides; the event
//! loop performs whatever a decision asks for. Keeping the decisions free of
//! I/O lets the ordering rules be tested without a runtime.
//!
//! Rules:
//! - a closed connection (`!open && locked`) rejects everything;
//! - nothing runs before open, while locked, or while older records wait;
//! - an exclusive record waits until every pending shared record completes.

use std::collections::VecDeque;
use std::sync::Arc;

use strata_core::{Phase, Snapshot};

/// One request, as held by the queue.
#[derive(Debug)]
pub struct Call<W> {
    pub work: W,
    pub exclusive: bool,
}

impl<W> Call<W> {
    pub fn shared(work: W) -> Self {
        Self {
            work,
            exclusive: false,
        }
    }

    pub fn exclusive(work: W) -> Self {
        Self {
            work,
            exclusive: true,
        }
    }
}

/// Outcome of [`ConnectionState::submit`].
#[derive(Debug)]
pub enum Admission<W> {
    /// Run now. The state already accounts for the dispatch.
    Dispatch(Call<W>),
    /// Deferred until a later drain.
    Queued,
    /// The connection is closed; fail the call.
    Rejected(Call<W>),
}

/// One step of a drain.
#[derive(Debug)]
pub enum Step<W> {
    Dispatch(Call<W>),
    Reject(Call<W>),
}

/// Mutable lifecycle state of one connection.
#[derive(Debug)]
pub struct ConnectionState<W, H> {
    open: bool,
    locked: bool,
    opening: bool,
    pending: usize,
    queue: VecDeque<Call<W>>,
    handle: Option<Arc<H>>,
}

impl<W, H> Default for ConnectionState<W, H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, H> ConnectionState<W, H> {
    pub fn new() -> Self {
        Self {
            open: false,
            locked: false,
            opening: false,
            pending: 0,
            queue: VecDeque::new(),
            handle: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Closed for good: either the open failed or a close succeeded.
    pub fn is_closed(&self) -> bool {
        !self.open && self.locked
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn handle(&self) -> Option<&Arc<H>> {
        self.handle.as_ref()
    }

    pub fn phase(&self) -> Phase {
        match (self.open, self.locked) {
            (true, true) => Phase::Closing,
            (true, false) => Phase::Open,
            (false, true) => Phase::Closed,
            (false, false) if self.opening => Phase::Opening,
            (false, false) => Phase::Unopened,
        }
    }

    pub fn snapshot(&self, refs: usize) -> Snapshot {
        Snapshot {
            phase: self.phase(),
            open: self.open,
            locked: self.locked,
            pending: self.pending,
            queued: self.queue.len(),
            refs,
        }
    }

    /// Admit a new call.
    pub fn submit(&mut self, call: Call<W>) -> Admission<W> {
        if self.is_closed() {
            return Admission::Rejected(call);
        }

        let blocked = !self.open
            || self.locked
            || !self.queue.is_empty()
            || (call.exclusive && self.pending > 0);

        if blocked {
            self.queue.push_back(call);
            Admission::Queued
        } else {
            self.start(&call);
            Admission::Dispatch(call)
        }
    }

    /// Next eligible step of a drain, or `None` when nothing can move.
    ///
    /// Callers loop until `None`; each dispatched step is already accounted
    /// for in `pending`/`locked` so the next iteration sees it.
    pub fn next(&mut self) -> Option<Step<W>> {
        if self.is_closed() {
            return self.queue.pop_front().map(Step::Reject);
        }

        if !self.open || self.locked {
            return None;
        }

        let front = self.queue.front()?;
        if front.exclusive && self.pending > 0 {
            return None;
        }

        let call = self.queue.pop_front()?;
        self.start(&call);
        Some(Step::Dispatch(call))
    }

    fn start(&mut self, call: &Call<W>) {
        if call.exclusive {
            debug_assert!(self.open, "exclusive call started on unopened connection");
            debug_assert!(!self.locked, "exclusive call started while locked");
            debug_assert_eq!(self.pending, 0, "exclusive call started with shared calls pending");
            self.locked = true;
        } else {
            self.pending += 1;
        }
    }

    /// The open has been dispatched.
    pub fn begin_open(&mut self) {
        self.opening = true;
    }

    /// The open succeeded.
    pub fn opened(&mut self, handle: Arc<H>) {
        self.opening = false;
        self.open = true;
        self.handle = Some(handle);
    }

    /// The open failed; the connection can never be used.
    pub fn open_failed(&mut self) {
        self.opening = false;
        self.open = false;
        self.locked = true;
    }

    /// A shared call finished.
    pub fn finish_shared(&mut self) {
        debug_assert!(self.pending > 0, "shared completion without a pending call");
        self.pending = self.pending.saturating_sub(1);
    }

    /// Hand the native handle to an in-flight close.
    pub fn take_handle(&mut self) -> Option<Arc<H>> {
        self.handle.take()
    }

    /// The close succeeded. `locked` stays set so the connection is terminal.
    pub fn closed(&mut self) {
        self.open = false;
        self.handle = None;
    }

    /// The close failed; the handle comes back and the connection reopens for use.
    pub fn close_failed(&mut self, handle: Arc<H>) {
        self.handle = Some(handle);
        self.locked = false;
    }
}
