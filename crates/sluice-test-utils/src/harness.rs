// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine tests.
//!
//! `TestHarness` wires a [`TurnEngine`] to a [`MockAgent`], a [`MockSink`]
//! and a [`MemoryStore`], and runs the router over the agent's stream.

use std::sync::Arc;
use std::time::Duration;

use sluice_core::{AccessLevel, RoomId, TurnKey};
use sluice_engine::{EngineSettings, TurnEngine, TurnOutcome, TurnRequest};
use tokio::task::JoinHandle;

use crate::memory_store::MemoryStore;
use crate::mock_agent::MockAgent;
use crate::mock_sink::MockSink;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    settings: EngineSettings,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut settings = EngineSettings::default();
        settings.edit_throttle = Duration::ZERO;
        Self { settings }
    }

    pub fn access_level(mut self, access_level: AccessLevel) -> Self {
        self.settings.access_level = access_level;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.settings.idle_timeout = timeout;
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.settings.start_timeout = timeout;
        self
    }

    pub fn approval_ttl(mut self, ttl: Duration) -> Self {
        self.settings.approval_ttl = ttl;
        self
    }

    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.settings.mailbox_capacity = capacity;
        self
    }

    pub fn edit_throttle(mut self, throttle: Duration) -> Self {
        self.settings.edit_throttle = throttle;
        self
    }

    /// Arbitrary adjustments to the engine settings.
    pub fn settings(mut self, adjust: impl FnOnce(&mut EngineSettings)) -> Self {
        adjust(&mut self.settings);
        self
    }

    /// Builds the harness and spawns the router. Needs a tokio runtime.
    pub fn build(self) -> TestHarness {
        let agent = Arc::new(MockAgent::new());
        let sink = Arc::new(MockSink::new());
        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(TurnEngine::with_settings(
            self.settings,
            agent.clone(),
            sink.clone(),
            store.clone(),
        ));
        let router = engine.spawn_router(agent.notifications());
        TestHarness {
            engine,
            agent,
            sink,
            store,
            router,
        }
    }
}

pub struct TestHarness {
    pub engine: Arc<TurnEngine>,
    pub agent: Arc<MockAgent>,
    pub sink: Arc<MockSink>,
    pub store: Arc<MemoryStore>,
    pub router: JoinHandle<()>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Submits a prompt and waits for the turn to finalize.
    pub async fn run(&self, room: &str, prompt: &str) -> TurnOutcome {
        self.submit(TurnRequest::new(RoomId::from(room), prompt))
            .await
            .expect("turn task panicked")
    }

    /// Polls until `key` is in the active-turn table, which means its
    /// mailbox is subscribed.
    pub async fn wait_for_turn(&self, key: &TurnKey) {
        while !self.engine.active_turns().contains(key) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    /// Submits a request and returns the turn task.
    pub fn submit(&self, request: TurnRequest) -> JoinHandle<TurnOutcome> {
        self.engine.submit(request).expect("room should be free")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
