// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, the scheduler, and callers.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::StrataError;

/// Open mode bitmask understood by the engine.
///
/// Bit values match SQLite's `SQLITE_OPEN_*` flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenMode(u32);

impl OpenMode {
    pub const READ_ONLY: OpenMode = OpenMode(0x0000_0001);
    pub const READ_WRITE: OpenMode = OpenMode(0x0000_0002);
    pub const CREATE: OpenMode = OpenMode(0x0000_0004);

    /// Construct a mode from raw bits. Unknown bits are kept as-is.
    pub const fn from_bits(bits: u32) -> Self {
        OpenMode(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: OpenMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for OpenMode {
    fn default() -> Self {
        OpenMode::READ_WRITE | OpenMode::CREATE
    }
}

impl BitOr for OpenMode {
    type Output = OpenMode;

    fn bitor(self, rhs: OpenMode) -> OpenMode {
        OpenMode(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenMode {
    fn bitor_assign(&mut self, rhs: OpenMode) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(OpenMode::READ_ONLY) {
            names.push("READ_ONLY");
        }
        if self.contains(OpenMode::READ_WRITE) {
            names.push("READ_WRITE");
        }
        if self.contains(OpenMode::CREATE) {
            names.push("CREATE");
        }
        write!(f, "OpenMode({} = {:#x})", names.join(" | "), self.0)
    }
}

/// Lifecycle phase of a connection, derived from its state flags.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Constructed, open not yet dispatched.
    Unopened,
    /// Open dispatched to a worker.
    Opening,
    /// Usable.
    Open,
    /// Close dispatched to a worker.
    Closing,
    /// Terminal. No transition leaves this phase.
    Closed,
}

/// Notification emitted on a connection when no completion action claimed the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection finished opening.
    Open,
    /// The connection finished closing.
    Close,
    /// A request failed and had no completion action.
    Error(StrataError),
}

/// Point-in-time view of a connection's scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub phase: Phase,
    pub open: bool,
    pub locked: bool,
    /// Shared operations dispatched and not yet completed.
    pub pending: usize,
    /// Records waiting in the queue.
    pub queued: usize,
    /// In-flight dispatches keeping the connection alive.
    pub refs: usize,
}
