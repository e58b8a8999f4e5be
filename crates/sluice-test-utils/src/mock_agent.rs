// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted agent subprocess.
//!
//! `MockAgent` answers `thread/start` with `thread_N` and `turn/start` with
//! `turn_N`. A script registered with [`MockAgent::on_next_turn`] is pushed
//! onto the notification stream *before* `turn/start` returns, which is the
//! ordering a real subprocess can produce. With
//! [`MockAgent::route_before_start_returns`] the call also waits until the
//! router has taken every pushed notification, so terminal events reach the
//! router while the turn has no mailbox yet.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde_json::{Value, json};
use sluice_core::types::methods;
use sluice_core::{AgentRpc, Notification, SluiceError, ThreadId, TurnKey};
use tokio::sync::mpsc;

type Script = Box<dyn FnOnce(&TurnKey) -> Vec<Notification> + Send>;

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
}

pub struct MockAgent {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<VecDeque<Script>>,
    failures: Mutex<HashMap<String, String>>,
    hangs: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    next_thread: AtomicU64,
    next_turn: AtomicU64,
    route_first: AtomicBool,
    pushed: AtomicU64,
    consumed: Arc<AtomicU64>,
    sender: mpsc::UnboundedSender<Notification>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
}

impl MockAgent {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
            hangs: Mutex::new(HashSet::new()),
            delays: Mutex::new(HashMap::new()),
            next_thread: AtomicU64::new(1),
            next_turn: AtomicU64::new(1),
            route_first: AtomicBool::new(false),
            pushed: AtomicU64::new(0),
            consumed: Arc::new(AtomicU64::new(0)),
            sender,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    /// The notification stream. Can be taken once.
    pub fn notifications(&self) -> impl Stream<Item = Notification> + Send + 'static {
        let receiver = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("notification stream already taken");
        let consumed = Arc::clone(&self.consumed);
        futures::stream::unfold((receiver, consumed), |(mut receiver, consumed)| async move {
            let n = receiver.recv().await?;
            consumed.fetch_add(1, Ordering::SeqCst);
            Some((n, (receiver, consumed)))
        })
    }

    /// Emits one notification now.
    pub fn push(&self, notification: Notification) {
        if self.sender.send(notification).is_ok() {
            self.pushed.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn push_all(&self, notifications: impl IntoIterator<Item = Notification>) {
        for notification in notifications {
            self.push(notification);
        }
    }

    /// Queues notifications emitted during the next `turn/start` call.
    pub fn on_next_turn<F>(&self, script: F)
    where
        F: FnOnce(&TurnKey) -> Vec<Notification> + Send + 'static,
    {
        self.scripts.lock().unwrap().push_back(Box::new(script));
    }

    /// Holds every later `turn/start` answer until the router has taken the
    /// scripted notifications off the stream.
    ///
    /// The router looks up the mailbox in the same poll that takes a
    /// notification, so on a current-thread runtime each scripted event is
    /// routed before the turn can subscribe. A script must end with its
    /// terminal events: the router holds later notifications while it
    /// retries one, and the call would never return.
    pub fn route_before_start_returns(&self) {
        self.route_first.store(true, Ordering::SeqCst);
    }

    async fn settle(&self) {
        while self.consumed.load(Ordering::SeqCst) < self.pushed.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }

    /// Makes `method` fail with an RPC error.
    pub fn fail(&self, method: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(method.to_string(), message.to_string());
    }

    /// Makes `method` never answer.
    pub fn hang(&self, method: &str) {
        self.hangs.lock().unwrap().insert(method.to_string());
    }

    /// Delays the answer to `method`.
    pub fn delay(&self, method: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(method.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .map(|c| c.params)
            .collect()
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRpc for MockAgent {
    async fn call(
        &self,
        method: &str,
        params: Value,
        _timeout: Duration,
    ) -> Result<Value, SluiceError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            params: params.clone(),
        });

        let delay = self.delays.lock().unwrap().get(method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let hangs = self.hangs.lock().unwrap().contains(method);
        if hangs {
            std::future::pending::<()>().await;
        }
        let failure = self.failures.lock().unwrap().get(method).cloned();
        if let Some(message) = failure {
            return Err(SluiceError::Rpc {
                method: method.to_string(),
                message,
            });
        }

        match method {
            methods::THREAD_START => {
                let n = self.next_thread.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "thread": { "id": format!("thread_{n}") } }))
            }
            methods::TURN_START => {
                let n = self.next_turn.fetch_add(1, Ordering::SeqCst);
                let turn_id = format!("turn_{n}");
                let thread_id = params
                    .get("threadId")
                    .and_then(Value::as_str)
                    .map(ThreadId::from)
                    .unwrap_or_else(|| ThreadId::from("thread_unknown"));
                let key = TurnKey::new(thread_id, turn_id.as_str());
                let script = self.scripts.lock().unwrap().pop_front();
                if let Some(script) = script {
                    self.push_all(script(&key));
                    if self.route_first.load(Ordering::SeqCst) {
                        self.settle().await;
                    }
                }
                Ok(json!({ "turn": { "id": turn_id, "status": "inProgress" } }))
            }
            _ => Ok(json!({})),
        }
    }
}
