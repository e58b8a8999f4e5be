// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Sluice turn engine.

use thiserror::Error;

use crate::status::TurnStatus;

/// The primary error type used across the collaborator traits and the engine.
#[derive(Debug, Error)]
pub enum SluiceError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence collaborator errors.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat transport errors (send, edit, ephemeral delivery).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A remote call to the agent subprocess failed or returned an error.
    #[error("rpc call `{method}` failed: {message}")]
    Rpc { method: String, message: String },

    /// The thread or turn could not be started.
    #[error("turn start failed: {message}")]
    StartFailed { message: String },

    /// Another turn already holds the room's execution lock.
    #[error("room {room} already has a turn in progress")]
    RoomBusy { room: String },

    /// A mailbox is already registered for this turn.
    #[error("turn {key} already has a live subscription")]
    DuplicateSubscription { key: String },

    /// No active turn matches the given key.
    #[error("no active turn for {key}")]
    UnknownTurn { key: String },

    /// The turn state machine rejected a transition.
    #[error("invalid turn transition from {from} to {to}")]
    InvalidTransition { from: TurnStatus, to: TurnStatus },

    /// A provider payload did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SluiceError {
    /// Wraps any error as a storage failure.
    pub fn storage(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// Builds a channel failure with no underlying source.
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
            source: None,
        }
    }
}
