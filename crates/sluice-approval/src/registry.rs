// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyed store of outstanding approvals.
//!
//! An entry is removed exactly once: when its decision is consumed by
//! [`ApprovalRegistry::wait`], when its deadline passes, or when a late
//! caller reaps it after a cancelled wait.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::decision::ApprovalDecision;
use crate::error::ApprovalError;

/// One outstanding approval request.
#[derive(Debug)]
pub struct PendingApproval {
    approval_id: String,
    tool_call_id: String,
    tool_name: String,
    created_at: Instant,
    expires_at: Instant,
    slot: mpsc::Sender<ApprovalDecision>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<ApprovalDecision>>,
}

impl PendingApproval {
    fn new(approval_id: &str, tool_call_id: &str, tool_name: &str, ttl: Duration) -> Self {
        let (slot, receiver) = mpsc::channel(1);
        let created_at = Instant::now();
        Self {
            approval_id: approval_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            created_at,
            expires_at: created_at + ttl,
            slot,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    pub fn approval_id(&self) -> &str {
        &self.approval_id
    }

    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Registry of pending approvals keyed by provider request id.
#[derive(Debug)]
pub struct ApprovalRegistry {
    entries: Mutex<HashMap<String, Arc<PendingApproval>>>,
    default_ttl: Duration,
}

impl ApprovalRegistry {
    /// `default_ttl` applies whenever `register` is given a zero TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<PendingApproval>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an approval, or returns the live one already under this id.
    ///
    /// The flag is `true` only when a new entry was created.
    pub fn register(
        &self,
        approval_id: &str,
        tool_call_id: &str,
        tool_name: &str,
        ttl: Duration,
    ) -> (Arc<PendingApproval>, bool) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let mut entries = self.entries();
        drop_expired(&mut entries);

        if let Some(existing) = entries.get(approval_id) {
            return (Arc::clone(existing), false);
        }

        let pending = Arc::new(PendingApproval::new(
            approval_id,
            tool_call_id,
            tool_name,
            ttl,
        ));
        entries.insert(approval_id.to_string(), Arc::clone(&pending));
        debug!(approval_id, tool_call_id, tool_name, ?ttl, "approval registered");
        (pending, true)
    }

    /// Delivers `decision` into the approval's slot.
    pub fn resolve(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        let result = self.try_resolve(approval_id, decision);
        if let Err(error) = &result {
            warn!(approval_id, %error, "approval decision rejected");
        }
        result
    }

    fn try_resolve(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        if approval_id.trim().is_empty() {
            return Err(ApprovalError::MissingId);
        }

        let pending = {
            let mut entries = self.entries();
            let Some(pending) = entries.get(approval_id).cloned() else {
                return Err(ApprovalError::Unknown(approval_id.to_string()));
            };
            if pending.is_expired() {
                entries.remove(approval_id);
                return Err(ApprovalError::Expired(approval_id.to_string()));
            }
            pending
        };

        match pending.slot.try_send(decision) {
            Ok(()) => {
                debug!(approval_id, "approval decision delivered");
                Ok(())
            }
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                Err(ApprovalError::AlreadyHandled(approval_id.to_string()))
            }
        }
    }

    /// Blocks until a decision arrives, the deadline passes, or `cancel` fires.
    ///
    /// A decision or the deadline removes the entry. Cancellation leaves it in
    /// place and returns `None`. An unknown id returns `None` immediately.
    /// A replayed waiter queues behind the current one but still honors its
    /// own token and the deadline.
    pub async fn wait(
        &self,
        cancel: &CancellationToken,
        approval_id: &str,
    ) -> Option<ApprovalDecision> {
        let pending = self.entries().get(approval_id).cloned()?;
        let next_decision = async { pending.receiver.lock().await.recv().await };

        tokio::select! {
            biased;
            decision = next_decision => {
                self.remove_entry(&pending);
                decision
            }
            _ = tokio::time::sleep_until(pending.expires_at) => {
                self.remove_entry(&pending);
                debug!(approval_id, "approval expired without a decision");
                None
            }
            _ = cancel.cancelled() => {
                debug!(approval_id, "approval wait cancelled");
                None
            }
        }
    }

    /// Removes `approval_id` regardless of state. Returns whether it existed.
    pub fn remove(&self, approval_id: &str) -> bool {
        self.entries().remove(approval_id).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let removed = drop_expired(&mut self.entries());
        if removed > 0 {
            debug!(removed, "expired approvals swept");
        }
        removed
    }

    pub fn get(&self, approval_id: &str) -> Option<Arc<PendingApproval>> {
        self.entries().get(approval_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Removes the entry only if it is still the same registration.
    fn remove_entry(&self, pending: &Arc<PendingApproval>) {
        let mut entries = self.entries();
        if entries
            .get(&pending.approval_id)
            .is_some_and(|current| Arc::ptr_eq(current, pending))
        {
            entries.remove(&pending.approval_id);
        }
    }
}

fn drop_expired(entries: &mut HashMap<String, Arc<PendingApproval>>) -> usize {
    let before = entries.len();
    entries.retain(|_, pending| !pending.is_expired());
    before - entries.len()
}
