// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the engine is wired against.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod rpc;
pub mod sink;
pub mod store;

pub use rpc::AgentRpc;
pub use sink::RoomSink;
pub use store::RoomStore;
