// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Room transport that records everything it is asked to deliver.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sluice_core::{
    MessageId, MessageKind, RoomId, RoomSink, SluiceError, StreamEnvelope, StreamEvent, TurnId,
};

/// A visible message as sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub room: RoomId,
    pub id: MessageId,
    pub body: String,
    pub kind: MessageKind,
}

/// An edit as applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    pub room: RoomId,
    pub id: MessageId,
    pub body: String,
}

pub struct MockSink {
    envelopes: Mutex<Vec<(RoomId, StreamEnvelope)>>,
    messages: Mutex<Vec<SentMessage>>,
    edits: Mutex<Vec<Edit>>,
    next_id: AtomicU64,
    fail_ephemeral: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self {
            envelopes: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            edits: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            fail_ephemeral: AtomicBool::new(false),
        }
    }

    /// Makes every ephemeral delivery fail from now on.
    pub fn fail_ephemeral(&self, fail: bool) {
        self.fail_ephemeral.store(fail, Ordering::SeqCst);
    }

    pub fn envelopes(&self) -> Vec<(RoomId, StreamEnvelope)> {
        self.envelopes.lock().unwrap().clone()
    }

    /// Events published for one turn, in delivery order.
    pub fn events_for(&self, turn_id: &str) -> Vec<StreamEvent> {
        self.envelopes
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, env)| env.turn_id == TurnId::from(turn_id))
            .map(|(_, env)| env.event.clone())
            .collect()
    }

    /// The `type` tags of [`events_for`](Self::events_for).
    pub fn kinds_for(&self, turn_id: &str) -> Vec<&'static str> {
        self.events_for(turn_id).iter().map(StreamEvent::kind).collect()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn messages_in(&self, room: &str) -> Vec<SentMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.room == RoomId::from(room))
            .collect()
    }

    pub fn notices(&self) -> Vec<SentMessage> {
        self.messages()
            .into_iter()
            .filter(|m| m.kind == MessageKind::Notice)
            .collect()
    }

    pub fn edits(&self) -> Vec<Edit> {
        self.edits.lock().unwrap().clone()
    }

    /// Current body of a visible message after all edits.
    pub fn body_of(&self, id: &MessageId) -> Option<String> {
        let edited = self
            .edits
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|e| &e.id == id)
            .map(|e| e.body.clone());
        edited.or_else(|| {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .find(|m| &m.id == id)
                .map(|m| m.body.clone())
        })
    }

    /// Polls until an event of `kind` was published for `turn_id`.
    pub async fn wait_for_kind(&self, turn_id: &str, kind: &str) {
        while !self.kinds_for(turn_id).contains(&kind) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Polls until a notice containing `needle` was sent.
    pub async fn wait_for_notice(&self, needle: &str) {
        while !self.notices().iter().any(|m| m.body.contains(needle)) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }
}

impl Default for MockSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RoomSink for MockSink {
    async fn send_ephemeral(
        &self,
        room: &RoomId,
        envelope: &StreamEnvelope,
    ) -> Result<(), SluiceError> {
        if self.fail_ephemeral.load(Ordering::SeqCst) {
            return Err(SluiceError::channel("ephemeral delivery refused"));
        }
        self.envelopes
            .lock()
            .unwrap()
            .push((room.clone(), envelope.clone()));
        Ok(())
    }

    async fn send_message(
        &self,
        room: &RoomId,
        body: &str,
        kind: MessageKind,
    ) -> Result<MessageId, SluiceError> {
        let id = MessageId::from(format!(
            "$msg_{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        self.messages.lock().unwrap().push(SentMessage {
            room: room.clone(),
            id: id.clone(),
            body: body.to_string(),
            kind,
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        room: &RoomId,
        message_id: &MessageId,
        body: &str,
    ) -> Result<(), SluiceError> {
        self.edits.lock().unwrap().push(Edit {
            room: room.clone(),
            id: message_id.clone(),
            body: body.to_string(),
        });
        Ok(())
    }
}
