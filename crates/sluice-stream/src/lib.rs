// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming layer for the Sluice turn engine.
//!
//! [`StreamingState`] is the per-turn accumulator and [`emitter`] turns typed
//! [`AgentEvent`]s into the canonical [`StreamEvent`](sluice_core::StreamEvent)
//! sequence, applying the at-most-once guards as it goes.

pub mod emitter;
pub mod event;
pub mod state;

pub use emitter::Emission;
pub use event::AgentEvent;
pub use state::StreamingState;
