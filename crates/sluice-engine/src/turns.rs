// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Active-turn table and the per-turn event publisher.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use sluice_core::{
    AccessLevel, ApprovalPolicy, RoomId, RoomSink, SluiceError, StreamEnvelope, StreamEvent,
    TurnId, TurnKey,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Publishes a turn's events to its room with a strictly increasing `seq`.
///
/// Cloned into the approval handler so both paths share one sequence.
#[derive(Clone)]
pub struct TurnPublisher {
    room: RoomId,
    turn_id: TurnId,
    seq: Arc<AtomicU64>,
    sink: Arc<dyn RoomSink>,
}

impl TurnPublisher {
    pub fn new(room: RoomId, turn_id: TurnId, sink: Arc<dyn RoomSink>) -> Self {
        Self {
            room,
            turn_id,
            seq: Arc::new(AtomicU64::new(0)),
            sink,
        }
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn turn_id(&self) -> &TurnId {
        &self.turn_id
    }

    /// Sequence number of the last event handed out.
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Sends one event. Transport failures are logged, not propagated.
    pub async fn publish(&self, event: StreamEvent) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        let kind = event.kind();
        let envelope = StreamEnvelope::new(self.turn_id.clone(), seq, event);
        if let Err(e) = self.sink.send_ephemeral(&self.room, &envelope).await {
            debug!(
                room = %self.room,
                turn_id = %self.turn_id,
                seq,
                kind,
                error = %e,
                "failed to deliver stream event"
            );
        }
    }

    pub async fn publish_all(&self, events: Vec<StreamEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }
}

impl std::fmt::Debug for TurnPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnPublisher")
            .field("room", &self.room)
            .field("turn_id", &self.turn_id)
            .field("seq", &self.last_seq())
            .finish()
    }
}

/// A turn between a successful start call and the end of its drain loop.
#[derive(Debug)]
pub struct ActiveTurn {
    pub key: TurnKey,
    pub room: RoomId,
    pub model: String,
    pub approval_policy: ApprovalPolicy,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
    pub publisher: TurnPublisher,
    /// Cancelled when the turn ends; bounds approval waits for this turn.
    pub cancel: CancellationToken,
}

/// Table of active turns keyed by `(thread, turn)`.
#[derive(Debug, Default)]
pub struct ActiveTurns {
    turns: Mutex<HashMap<TurnKey, Arc<ActiveTurn>>>,
}

impl ActiveTurns {
    pub fn new() -> Self {
        Self::default()
    }

    fn turns(&self) -> MutexGuard<'_, HashMap<TurnKey, Arc<ActiveTurn>>> {
        self.turns.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, turn: Arc<ActiveTurn>) -> Result<(), SluiceError> {
        let mut turns = self.turns();
        if turns.contains_key(&turn.key) {
            return Err(SluiceError::DuplicateSubscription {
                key: turn.key.to_string(),
            });
        }
        turns.insert(turn.key.clone(), turn);
        Ok(())
    }

    pub fn get(&self, key: &TurnKey) -> Option<Arc<ActiveTurn>> {
        self.turns().get(key).cloned()
    }

    pub fn remove(&self, key: &TurnKey) -> Option<Arc<ActiveTurn>> {
        self.turns().remove(key)
    }

    pub fn len(&self) -> usize {
        self.turns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns().is_empty()
    }

    pub fn keys(&self) -> Vec<TurnKey> {
        self.turns().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_test_utils::MockSink;

    fn turn(key: TurnKey, sink: Arc<MockSink>) -> Arc<ActiveTurn> {
        Arc::new(ActiveTurn {
            publisher: TurnPublisher::new(RoomId::from("r"), key.turn_id.clone(), sink),
            key,
            room: RoomId::from("r"),
            model: "m".into(),
            approval_policy: ApprovalPolicy::OnRequest,
            access_level: AccessLevel::Workspace,
            created_at: Utc::now(),
            cancel: CancellationToken::new(),
        })
    }

    #[tokio::test]
    async fn duplicate_keys_are_rejected() {
        let sink = Arc::new(MockSink::new());
        let table = ActiveTurns::new();
        let key = TurnKey::new("th", "t1");
        table.insert(turn(key.clone(), Arc::clone(&sink))).unwrap();
        assert!(table.insert(turn(key.clone(), sink)).is_err());
        assert!(table.remove(&key).is_some());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn same_turn_id_in_different_threads_is_distinct() {
        let sink = Arc::new(MockSink::new());
        let table = ActiveTurns::new();
        table.insert(turn(TurnKey::new("a", "t1"), Arc::clone(&sink))).unwrap();
        table.insert(turn(TurnKey::new("b", "t1"), sink)).unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn publisher_sequence_is_strictly_increasing() {
        let sink = Arc::new(MockSink::new());
        let publisher = TurnPublisher::new(RoomId::from("r"), TurnId::from("t1"), sink.clone());
        let clone = publisher.clone();
        publisher.publish(StreamEvent::StartStep).await;
        clone.publish(StreamEvent::FinishStep).await;
        let seqs: Vec<u64> = sink.envelopes().iter().map(|(_, e)| e.seq).collect();
        assert_eq!(seqs, [1, 2]);
        assert_eq!(sink.envelopes()[1].1.txn_id, "t1:2");
    }
}
