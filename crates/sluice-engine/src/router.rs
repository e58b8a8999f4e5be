// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-consumer notification router.
//!
//! Each turn subscribes a bounded mailbox under its `(thread, turn)` key.
//! The start call can return after the subprocess already emitted events
//! for the new turn, so terminal notifications that find no mailbox are
//! re-checked a bounded number of times before being dropped. Everything
//! else without a mailbox is dropped at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::{Stream, StreamExt};
use sluice_config::model::RoutingConfig;
use sluice_core::{Notification, SluiceError, TurnKey};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::account::AccountState;

/// Delivery policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterSettings {
    pub terminal_retry_attempts: u32,
    pub terminal_retry_interval: Duration,
    pub terminal_send_timeout: Duration,
}

impl From<&RoutingConfig> for RouterSettings {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            terminal_retry_attempts: config.terminal_retry_attempts,
            terminal_retry_interval: config.terminal_retry_interval(),
            terminal_send_timeout: config.terminal_send_timeout(),
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from(&RoutingConfig::default())
    }
}

/// Outcome of routing one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// Consumed by the process-wide account state.
    ProcessWide,
    NoCorrelation,
    NoSubscriber,
    MailboxFull,
    MailboxClosed,
}

#[derive(Debug)]
struct Mailbox {
    generation: u64,
    sender: mpsc::Sender<Notification>,
}

#[derive(Debug)]
pub struct NotificationRouter {
    mailboxes: Mutex<HashMap<TurnKey, Mailbox>>,
    next_generation: AtomicU64,
    settings: RouterSettings,
    account: Arc<AccountState>,
}

impl NotificationRouter {
    pub fn new(settings: RouterSettings, account: Arc<AccountState>) -> Arc<Self> {
        Arc::new(Self {
            mailboxes: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            settings,
            account,
        })
    }

    fn mailboxes(&self) -> MutexGuard<'_, HashMap<TurnKey, Mailbox>> {
        self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the mailbox for `key`. At most one live subscription per key.
    pub fn subscribe(
        self: &Arc<Self>,
        key: TurnKey,
        capacity: usize,
    ) -> Result<Subscription, SluiceError> {
        let mut mailboxes = self.mailboxes();
        if mailboxes.contains_key(&key) {
            return Err(SluiceError::DuplicateSubscription {
                key: key.to_string(),
            });
        }
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        mailboxes.insert(key.clone(), Mailbox { generation, sender });
        debug!(thread_id = %key.thread_id, turn_id = %key.turn_id, "mailbox subscribed");
        Ok(Subscription {
            key,
            generation,
            receiver,
            router: Arc::downgrade(self),
        })
    }

    pub fn is_subscribed(&self, key: &TurnKey) -> bool {
        self.mailboxes().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.mailboxes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mailboxes().is_empty()
    }

    fn unsubscribe(&self, key: &TurnKey, generation: u64) {
        let mut mailboxes = self.mailboxes();
        if mailboxes
            .get(key)
            .is_some_and(|mailbox| mailbox.generation == generation)
        {
            mailboxes.remove(key);
            debug!(thread_id = %key.thread_id, turn_id = %key.turn_id, "mailbox unsubscribed");
        }
    }

    /// Finds the mailbox for a notification.
    ///
    /// A notification with a thread id but no turn id goes to the thread's
    /// only live subscription, if there is exactly one.
    fn lookup(&self, notification: &Notification) -> Option<(TurnKey, mpsc::Sender<Notification>)> {
        let mailboxes = self.mailboxes();
        if let Some(key) = notification.turn_key() {
            return mailboxes
                .get(&key)
                .map(|mailbox| (key, mailbox.sender.clone()));
        }
        let thread_id = notification.thread_id()?;
        let mut matching = mailboxes.iter().filter(|(key, _)| key.thread_id == thread_id);
        match (matching.next(), matching.next()) {
            (Some((key, mailbox)), None) => Some((key.clone(), mailbox.sender.clone())),
            _ => None,
        }
    }

    /// Routes one notification to its turn.
    pub async fn route(&self, notification: Notification) -> Delivery {
        if notification.is_process_wide() {
            self.account.apply(&notification);
            return Delivery::ProcessWide;
        }
        if notification.thread_id().is_none() {
            debug!(method = %notification.method, "dropping uncorrelated notification");
            return Delivery::NoCorrelation;
        }

        let terminal = notification.is_terminal();
        let attempts = if terminal {
            self.settings.terminal_retry_attempts
        } else {
            0
        };

        let mut retries = 0;
        let (key, sender) = loop {
            if let Some(found) = self.lookup(&notification) {
                break found;
            }
            if retries >= attempts {
                debug!(
                    method = %notification.method,
                    thread_id = ?notification.thread_id(),
                    turn_id = ?notification.turn_id(),
                    retries,
                    "no subscription for notification, dropping"
                );
                return Delivery::NoSubscriber;
            }
            retries += 1;
            tokio::time::sleep(self.settings.terminal_retry_interval).await;
        };

        self.deliver(&key, &sender, notification, terminal).await
    }

    async fn deliver(
        &self,
        key: &TurnKey,
        sender: &mpsc::Sender<Notification>,
        notification: Notification,
        terminal: bool,
    ) -> Delivery {
        match sender.try_send(notification) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Closed(n)) => {
                debug!(%key, method = %n.method, "mailbox closed, dropping");
                Delivery::MailboxClosed
            }
            Err(TrySendError::Full(n)) if terminal => {
                let method = n.method.clone();
                match sender
                    .send_timeout(n, self.settings.terminal_send_timeout)
                    .await
                {
                    Ok(()) => Delivery::Delivered,
                    Err(_) => {
                        debug!(%key, %method, "mailbox full past send timeout, dropping terminal event");
                        Delivery::MailboxFull
                    }
                }
            }
            Err(TrySendError::Full(n)) => {
                debug!(%key, method = %n.method, "mailbox full, dropping");
                Delivery::MailboxFull
            }
        }
    }

    /// Drains `notifications` until the stream ends or `cancel` fires.
    pub async fn run<S>(self: Arc<Self>, notifications: S, cancel: CancellationToken)
    where
        S: Stream<Item = Notification> + Send,
    {
        let mut notifications = std::pin::pin!(notifications);
        info!("notification router running");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = notifications.next() => match next {
                    Some(notification) => {
                        self.route(notification).await;
                    }
                    None => break,
                },
            }
        }
        info!("notification router stopped");
    }
}

/// A live mailbox. Dropping it unregisters the key.
#[derive(Debug)]
pub struct Subscription {
    key: TurnKey,
    generation: u64,
    receiver: mpsc::Receiver<Notification>,
    router: Weak<NotificationRouter>,
}

impl Subscription {
    pub fn key(&self) -> &TurnKey {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<Notification> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(router) = self.router.upgrade() {
            router.unsubscribe(&self.key, self.generation);
        }
    }
}
