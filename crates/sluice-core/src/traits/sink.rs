// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat transport used to reach rooms.

use async_trait::async_trait;

use crate::error::SluiceError;
use crate::events::StreamEnvelope;
use crate::types::{MessageId, MessageKind, RoomId};

/// Delivers streaming envelopes and visible messages to rooms.
#[async_trait]
pub trait RoomSink: Send + Sync + 'static {
    /// Delivers one non-persisted streaming event.
    async fn send_ephemeral(
        &self,
        room: &RoomId,
        envelope: &StreamEnvelope,
    ) -> Result<(), SluiceError>;

    /// Sends a visible message and returns its id for later edits.
    async fn send_message(
        &self,
        room: &RoomId,
        body: &str,
        kind: MessageKind,
    ) -> Result<MessageId, SluiceError>;

    /// Replaces the content of a previously sent message.
    async fn edit_message(
        &self,
        room: &RoomId,
        message_id: &MessageId,
        body: &str,
    ) -> Result<(), SluiceError>;
}
