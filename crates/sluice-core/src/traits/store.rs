// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room and message persistence.

use async_trait::async_trait;

use crate::error::SluiceError;
use crate::types::{Conversation, MessageId, RoomId, TurnRecord};

/// Persistence collaborator for conversations, bot messages and turn summaries.
#[async_trait]
pub trait RoomStore: Send + Sync + 'static {
    /// Returns the room's conversation, creating it on first use.
    async fn get_or_create_conversation(&self, room: &RoomId) -> Result<Conversation, SluiceError>;

    /// Saves changes to a conversation (e.g. a newly started thread id).
    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), SluiceError>;

    /// Inserts a bot-authored message bound to `correlation_id`.
    async fn insert_bot_message(
        &self,
        room: &RoomId,
        correlation_id: &str,
        body: &str,
    ) -> Result<MessageId, SluiceError>;

    /// Inserts or replaces the persisted summary of a finished turn.
    async fn upsert_turn_record(&self, record: &TurnRecord) -> Result<(), SluiceError>;
}
