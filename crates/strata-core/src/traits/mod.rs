// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams between the connection scheduler and its collaborators.

pub mod engine;

pub use engine::Engine;
