// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Strata.
//!
//! - [`MockEngine`]: an in-memory engine with a call journal, scripted
//!   failures, and gated opens and closes
//! - [`Gate`]: a latch that holds worker threads until released
//! - [`serial_runtime`]: a runtime whose blocking work runs in dispatch order

pub mod gate;
pub mod harness;
pub mod mock_engine;

pub use gate::Gate;
pub use harness::{poll_until, serial_runtime};
pub use mock_engine::{EngineCall, MockEngine, MockHandle};
