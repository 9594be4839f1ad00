// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable in-memory engine for deterministic scheduling tests.
//!
//! `MockEngine` implements [`Engine`] without touching the filesystem. Every
//! open, close and query is appended to a shared journal, so tests can
//! assert the exact order in which the scheduler let work through. Opens and
//! closes can be made to fail or to block on a [`Gate`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strata_core::{Engine, OpenMode, StrataError};
use tracing::debug;

use crate::gate::Gate;

/// One recorded engine interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Open {
        path: String,
        mode: OpenMode,
        ok: bool,
    },
    Close {
        handle: usize,
        ok: bool,
    },
    /// A shared operation ran against `handle`.
    Query {
        handle: usize,
        label: String,
    },
}

#[derive(Debug, Default)]
struct Script {
    open_error: Option<StrataError>,
    close_errors: VecDeque<StrataError>,
    open_gate: Option<Gate>,
    close_gate: Option<Gate>,
}

#[derive(Debug, Default)]
struct Shared {
    next_id: AtomicUsize,
    live: AtomicUsize,
    journal: Mutex<Vec<EngineCall>>,
    script: Mutex<Script>,
}

impl Shared {
    fn journal(&self) -> MutexGuard<'_, Vec<EngineCall>> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Engine double. Clones share one journal and one script.
#[derive(Debug, Clone, Default)]
pub struct MockEngine {
    shared: Arc<Shared>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next open fail with `err`.
    pub fn fail_open(&self, err: StrataError) -> &Self {
        self.shared.script().open_error = Some(err);
        self
    }

    /// Make the next close fail with `err`, handing the handle back.
    ///
    /// Repeated calls queue further failures.
    pub fn fail_next_close(&self, err: StrataError) -> &Self {
        self.shared.script().close_errors.push_back(err);
        self
    }

    /// Block opens until the returned gate is opened.
    pub fn gate_open(&self) -> Gate {
        let gate = Gate::new();
        self.shared.script().open_gate = Some(gate.clone());
        gate
    }

    /// Block closes until the returned gate is opened.
    pub fn gate_close(&self) -> Gate {
        let gate = Gate::new();
        self.shared.script().close_gate = Some(gate.clone());
        gate
    }

    /// Every recorded interaction, oldest first.
    pub fn journal(&self) -> Vec<EngineCall> {
        self.shared.journal().clone()
    }

    /// Labels of the queries recorded so far, in execution order.
    pub fn query_labels(&self) -> Vec<String> {
        self.shared
            .journal()
            .iter()
            .filter_map(|call| match call {
                EngineCall::Query { label, .. } => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// Successful opens.
    pub fn opens(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Open { ok: true, .. }))
    }

    /// Successful closes.
    pub fn closes(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Close { ok: true, .. }))
    }

    /// Closes attempted, successful or not.
    pub fn close_attempts(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Close { .. }))
    }

    /// Handles opened and not yet closed or dropped.
    pub fn live_handles(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    fn count(&self, pred: impl Fn(&EngineCall) -> bool) -> usize {
        self.shared.journal().iter().filter(|call| pred(call)).count()
    }
}

impl Engine for MockEngine {
    type Handle = MockHandle;

    fn open(&self, path: &str, mode: OpenMode) -> Result<MockHandle, StrataError> {
        let (gate, error) = {
            let mut script = self.shared.script();
            (script.open_gate.clone(), script.open_error.take())
        };
        if let Some(gate) = gate {
            gate.pass();
        }

        self.shared.journal().push(EngineCall::Open {
            path: path.to_string(),
            mode,
            ok: error.is_none(),
        });
        if let Some(err) = error {
            debug!(path, "mock open failing");
            return Err(err);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(MockHandle {
            id,
            shared: Arc::clone(&self.shared),
        })
    }

    fn close(&self, handle: MockHandle) -> Result<(), (MockHandle, StrataError)> {
        let (gate, error) = {
            let mut script = self.shared.script();
            (script.close_gate.clone(), script.close_errors.pop_front())
        };
        if let Some(gate) = gate {
            gate.pass();
        }

        self.shared.journal().push(EngineCall::Close {
            handle: handle.id,
            ok: error.is_none(),
        });
        match error {
            Some(err) => Err((handle, err)),
            None => {
                drop(handle);
                Ok(())
            }
        }
    }
}

/// Native handle issued by [`MockEngine`].
#[derive(Debug)]
pub struct MockHandle {
    id: usize,
    shared: Arc<Shared>,
}

impl MockHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Record a query against this handle.
    pub fn record(&self, label: impl Into<String>) {
        self.shared.journal().push(EngineCall::Query {
            handle: self.id,
            label: label.into(),
        });
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_query_close_is_journaled() {
        let engine = MockEngine::new();
        let handle = engine.open("mem", OpenMode::default()).unwrap();
        handle.record("select");
        assert_eq!(engine.live_handles(), 1);
        engine.close(handle).unwrap();

        assert_eq!(
            engine.journal(),
            vec![
                EngineCall::Open {
                    path: "mem".into(),
                    mode: OpenMode::default(),
                    ok: true
                },
                EngineCall::Query {
                    handle: 0,
                    label: "select".into()
                },
                EngineCall::Close { handle: 0, ok: true },
            ]
        );
        assert_eq!(engine.live_handles(), 0);
    }

    #[test]
    fn scripted_failures_are_consumed_once() {
        let engine = MockEngine::new();
        engine.fail_open(StrataError::engine(14, "unable to open database file"));
        assert!(engine.open("a", OpenMode::default()).is_err());
        let handle = engine.open("a", OpenMode::default()).unwrap();

        engine.fail_next_close(StrataError::engine(5, "database is locked"));
        let (handle, err) = engine.close(handle).unwrap_err();
        assert_eq!(err.code(), 5);
        engine.close(handle).unwrap();

        assert_eq!(engine.opens(), 1);
        assert_eq!(engine.closes(), 1);
        assert_eq!(engine.close_attempts(), 2);
        assert_eq!(engine.live_handles(), 0);
    }
}
