// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`RoomStore`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use sluice_core::{Conversation, MessageId, RoomId, RoomStore, SluiceError, TurnRecord};

/// A persisted bot message.
#[derive(Debug, Clone, PartialEq)]
pub struct BotMessage {
    pub id: MessageId,
    pub room: RoomId,
    pub correlation_id: String,
    pub body: String,
}

#[derive(Default)]
pub struct MemoryStore {
    conversations: Mutex<HashMap<RoomId, Conversation>>,
    bot_messages: Mutex<Vec<BotMessage>>,
    turn_records: Mutex<Vec<TurnRecord>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-binds a room to an existing provider thread.
    pub fn seed_thread(&self, room: &str, thread_id: &str) {
        let mut conversation = Conversation::new(RoomId::from(room));
        conversation.thread_id = Some(thread_id.into());
        self.conversations
            .lock()
            .unwrap()
            .insert(conversation.room.clone(), conversation);
    }

    pub fn conversation(&self, room: &str) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .get(&RoomId::from(room))
            .cloned()
    }

    pub fn bot_messages(&self) -> Vec<BotMessage> {
        self.bot_messages.lock().unwrap().clone()
    }

    pub fn turn_records(&self) -> Vec<TurnRecord> {
        self.turn_records.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn get_or_create_conversation(&self, room: &RoomId) -> Result<Conversation, SluiceError> {
        Ok(self
            .conversations
            .lock()
            .unwrap()
            .entry(room.clone())
            .or_insert_with(|| Conversation::new(room.clone()))
            .clone())
    }

    async fn save_conversation(&self, conversation: &Conversation) -> Result<(), SluiceError> {
        let mut saved = conversation.clone();
        saved.updated_at = Utc::now();
        self.conversations
            .lock()
            .unwrap()
            .insert(saved.room.clone(), saved);
        Ok(())
    }

    async fn insert_bot_message(
        &self,
        room: &RoomId,
        correlation_id: &str,
        body: &str,
    ) -> Result<MessageId, SluiceError> {
        let id = MessageId::from(format!(
            "stored_{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ));
        self.bot_messages.lock().unwrap().push(BotMessage {
            id: id.clone(),
            room: room.clone(),
            correlation_id: correlation_id.to_string(),
            body: body.to_string(),
        });
        Ok(id)
    }

    async fn upsert_turn_record(&self, record: &TurnRecord) -> Result<(), SluiceError> {
        let mut records = self.turn_records.lock().unwrap();
        let existing = records.iter_mut().find(|r| {
            r.room == record.room && r.turn_id.is_some() && r.turn_id == record.turn_id
        });
        match existing {
            Some(slot) => *slot = record.clone(),
            None => records.push(record.clone()),
        }
        Ok(())
    }
}
