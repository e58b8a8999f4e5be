// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Sluice integration tests.
//!
//! Provides mock collaborators and a harness for fast, deterministic,
//! CI-runnable tests without a real agent subprocess or chat server.
//!
//! # Components
//!
//! - [`MockAgent`] - Scripted agent subprocess with a notification stream
//! - [`MockSink`] - Room transport capturing envelopes, messages and edits
//! - [`MemoryStore`] - In-memory conversation and turn persistence
//! - [`TestHarness`] - A wired [`TurnEngine`](sluice_engine::TurnEngine)

pub mod fixtures;
pub mod harness;
pub mod memory_store;
pub mod mock_agent;
pub mod mock_sink;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryStore;
pub use mock_agent::MockAgent;
pub use mock_sink::MockSink;
