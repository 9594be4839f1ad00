// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference-counting guard that decides when a connection may be finalized.
//!
//! `refs` counts dispatches in flight (the open, the close, every shared
//! call). `external` is true while at least one [`Database`](crate::Database)
//! handle is alive. The connection is finalized exactly once, on the first
//! transition into `refs == 0 && !external`.

#[derive(Debug)]
pub struct Lifecycle {
    refs: usize,
    external: bool,
    finalized: bool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// A freshly constructed connection: externally held, nothing in flight.
    pub fn new() -> Self {
        Self {
            refs: 0,
            external: true,
            finalized: false,
        }
    }

    pub fn refs(&self) -> usize {
        self.refs
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    /// Taken immediately before a dispatch.
    pub fn acquire(&mut self) {
        self.refs += 1;
    }

    /// Dropped when a dispatch's completion reaches the event loop.
    pub fn release(&mut self) {
        debug_assert!(self.refs > 0, "lifecycle released more often than acquired");
        self.refs = self.refs.saturating_sub(1);
    }

    /// The last external handle is gone.
    pub fn detach(&mut self) {
        self.external = false;
    }

    /// Returns `true` exactly once: the first time the connection becomes collectible.
    pub fn try_finalize(&mut self) -> bool {
        if self.finalized || self.external || self.refs > 0 {
            return false;
        }
        self.finalized = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn held_connection_is_never_finalized() {
        let mut lifecycle = Lifecycle::new();
        assert!(lifecycle.is_external());
        assert!(!lifecycle.try_finalize());

        lifecycle.acquire();
        lifecycle.release();
        assert_eq!(lifecycle.refs(), 0);
        assert!(!lifecycle.try_finalize());
    }

    #[test]
    fn detach_with_refs_outstanding_defers_finalization() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.acquire();
        lifecycle.acquire();
        lifecycle.detach();
        assert!(!lifecycle.try_finalize());

        lifecycle.release();
        assert!(!lifecycle.try_finalize());

        lifecycle.release();
        assert!(lifecycle.try_finalize());
    }

    #[test]
    fn finalization_happens_once() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.detach();
        assert!(lifecycle.try_finalize());
        assert!(!lifecycle.try_finalize());
    }
}
