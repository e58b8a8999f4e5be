// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Sluice turn engine.
//!
//! This crate provides the error taxonomy, shared types, the canonical
//! streaming event vocabulary, and the collaborator traits (persistence,
//! chat transport, agent subprocess calls) every other crate builds on.

pub mod error;
pub mod events;
pub mod status;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SluiceError;
pub use events::{StreamEnvelope, StreamEvent};
pub use status::TurnStatus;
pub use types::{
    AccessLevel, AgentRequest, ApprovalPolicy, Conversation, InboundMessage, MessageId,
    MessageKind, Notification, RoomId, ThreadId, TokenUsage, ToolCallRecord, ToolStatus, TurnId,
    TurnKey, TurnRecord,
};

pub use traits::{AgentRpc, RoomSink, RoomStore};
