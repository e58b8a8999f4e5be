// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-room execution lock.
//!
//! A presence set rather than a mutex: acquiring a held room fails at once
//! instead of queueing, and the guard releases on drop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use sluice_core::{RoomId, SluiceError};

#[derive(Debug, Clone, Default)]
pub struct RoomLocks {
    held: Arc<Mutex<HashSet<RoomId>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> MutexGuard<'_, HashSet<RoomId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the room's lock or fails with [`SluiceError::RoomBusy`].
    pub fn try_acquire(&self, room: &RoomId) -> Result<RoomGuard, SluiceError> {
        if !self.held().insert(room.clone()) {
            return Err(SluiceError::RoomBusy {
                room: room.to_string(),
            });
        }
        Ok(RoomGuard {
            held: Arc::clone(&self.held),
            room: room.clone(),
        })
    }

    pub fn is_held(&self, room: &RoomId) -> bool {
        self.held().contains(room)
    }

    pub fn len(&self) -> usize {
        self.held().len()
    }

    pub fn is_empty(&self) -> bool {
        self.held().is_empty()
    }
}

/// Releases the room when dropped.
#[derive(Debug)]
pub struct RoomGuard {
    held: Arc<Mutex<HashSet<RoomId>>>,
    room: RoomId,
}

impl RoomGuard {
    pub fn room(&self) -> &RoomId {
        &self.room
    }
}

impl Drop for RoomGuard {
    fn drop(&mut self) {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.room);
    }
}
