// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn execution engine for Sluice.
//!
//! [`TurnEngine`] is the single entry point the bridge wires up. It owns
//! the notification router, the room locks, the active-turn table and the
//! approval registry, and spawns one task per turn. The agent subprocess
//! connection is reached only through [`AgentRpc`], the chat transport
//! through [`RoomSink`] and persistence through [`RoomStore`].

pub mod account;
pub mod approval;
pub mod commands;
pub mod controller;
pub mod locks;
pub mod protocol;
pub mod router;
pub mod settings;
pub mod shutdown;
pub mod turns;

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use sluice_approval::{ApprovalDecision, ApprovalError, ApprovalRegistry};
use sluice_config::SluiceConfig;
use sluice_core::{
    AgentRequest, AgentRpc, InboundMessage, MessageKind, Notification, RoomId, RoomSink,
    RoomStore, SluiceError, TurnKey,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

pub use account::{AccountSnapshot, AccountState};
pub use approval::{AUTO_APPROVER, ApprovalHandler};
pub use commands::{ApprovalCommand, parse_command};
pub use controller::{TurnOutcome, TurnRequest};
pub use locks::{RoomGuard, RoomLocks};
pub use router::{Delivery, NotificationRouter, RouterSettings, Subscription};
pub use settings::EngineSettings;
pub use turns::{ActiveTurn, ActiveTurns, TurnPublisher};

use controller::EngineShared;

/// What an inbound room message turned into.
#[derive(Debug)]
pub enum InboundAction {
    /// An approval command filled its slot.
    Resolved { approval_id: String },
    /// An approval command was refused (unknown, expired, already handled).
    Rejected {
        approval_id: String,
        error: ApprovalError,
    },
    /// The message started a turn.
    Started(JoinHandle<TurnOutcome>),
}

pub struct TurnEngine {
    shared: Arc<EngineShared>,
    locks: RoomLocks,
    registry: Arc<ApprovalRegistry>,
    approvals: ApprovalHandler,
    account: Arc<AccountState>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl TurnEngine {
    pub fn new(
        config: &SluiceConfig,
        rpc: Arc<dyn AgentRpc>,
        sink: Arc<dyn RoomSink>,
        store: Arc<dyn RoomStore>,
    ) -> Self {
        Self::with_settings(EngineSettings::from(config), rpc, sink, store)
    }

    pub fn with_settings(
        settings: EngineSettings,
        rpc: Arc<dyn AgentRpc>,
        sink: Arc<dyn RoomSink>,
        store: Arc<dyn RoomStore>,
    ) -> Self {
        let account = Arc::new(AccountState::new());
        let router = NotificationRouter::new(settings.routing, Arc::clone(&account));
        let turns = Arc::new(ActiveTurns::new());
        let registry = Arc::new(ApprovalRegistry::new(settings.approval_ttl));
        let approvals = ApprovalHandler::new(
            Arc::clone(&registry),
            Arc::clone(&turns),
            Arc::clone(&sink),
            settings.approval_ttl,
            settings.command_prefix.clone(),
        );
        let shared = Arc::new(EngineShared {
            rpc,
            sink,
            store,
            router,
            turns,
            settings,
        });
        Self {
            shared,
            locks: RoomLocks::new(),
            registry,
            approvals,
            account,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.shared.settings
    }

    /// Spawns the router over the subprocess notification stream. It stops
    /// when the stream ends or the engine shuts down.
    pub fn spawn_router<S>(&self, notifications: S) -> JoinHandle<()>
    where
        S: Stream<Item = Notification> + Send + 'static,
    {
        let router = Arc::clone(&self.shared.router);
        tokio::spawn(router.run(notifications, self.shutdown.child_token()))
    }

    /// Routes one notification directly, for transports that push.
    pub async fn route(&self, notification: Notification) -> Delivery {
        self.shared.router.route(notification).await
    }

    /// Starts a turn in the request's room.
    ///
    /// Fails with [`SluiceError::RoomBusy`] while another turn holds the
    /// room; the lock is taken before any subprocess call is made.
    pub fn submit(&self, request: TurnRequest) -> Result<JoinHandle<TurnOutcome>, SluiceError> {
        if self.shutdown.is_cancelled() {
            return Err(SluiceError::Internal("engine is shutting down".to_string()));
        }
        let guard = self.locks.try_acquire(&request.room)?;
        let cancel = self.shutdown.child_token();
        let shared = Arc::clone(&self.shared);
        Ok(self
            .tracker
            .spawn(controller::run_turn(shared, request, guard, cancel)))
    }

    /// Answers one subprocess request. The transport replies with the
    /// returned value once it resolves.
    pub async fn handle_request(&self, request: AgentRequest) -> Value {
        self.approvals.handle(request).await
    }

    pub fn resolve_approval(
        &self,
        approval_id: &str,
        decision: ApprovalDecision,
    ) -> Result<(), ApprovalError> {
        self.registry.resolve(approval_id, decision)
    }

    /// Dispatches a room message: approval commands resolve slots,
    /// everything else starts a turn.
    pub async fn handle_inbound(
        &self,
        message: InboundMessage,
    ) -> Result<InboundAction, SluiceError> {
        let prefix = &self.shared.settings.command_prefix;
        if let Some(command) = parse_command(&message.body, prefix) {
            let approval_id = command.id().to_string();
            let decision = match command {
                ApprovalCommand::Approve { reason, .. } => {
                    with_reason(ApprovalDecision::approve(&message.sender), reason)
                }
                ApprovalCommand::Deny { reason, .. } => {
                    with_reason(ApprovalDecision::deny(&message.sender), reason)
                }
            };
            return Ok(match self.registry.resolve(&approval_id, decision) {
                Ok(()) => {
                    info!(room = %message.room, approval_id, sender = %message.sender, "approval command accepted");
                    InboundAction::Resolved { approval_id }
                }
                Err(error) => {
                    self.notice(&message.room, &rejection_notice(&error)).await;
                    InboundAction::Rejected { approval_id, error }
                }
            });
        }

        let room = message.room.clone();
        match self.submit(TurnRequest::new(message.room, message.body)) {
            Ok(handle) => Ok(InboundAction::Started(handle)),
            Err(e @ SluiceError::RoomBusy { .. }) => {
                self.notice(
                    &room,
                    "A turn is already running in this room. Wait for it to finish.",
                )
                .await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn notice(&self, room: &RoomId, body: &str) {
        if let Err(e) = self
            .shared
            .sink
            .send_message(room, body, MessageKind::Notice)
            .await
        {
            warn!(%room, error = %e, "failed to send notice");
        }
    }

    pub fn account_state(&self) -> AccountSnapshot {
        self.account.snapshot()
    }

    pub fn active_turns(&self) -> Vec<TurnKey> {
        self.shared.turns.keys()
    }

    pub fn is_room_busy(&self, room: &RoomId) -> bool {
        self.locks.is_held(room)
    }

    /// Approvals still inside their deadline.
    pub fn pending_approvals(&self) -> usize {
        self.registry.sweep_expired();
        self.registry.len()
    }

    /// Interrupts one active turn. Returns false when no turn matches.
    pub fn cancel_turn(&self, key: &TurnKey) -> bool {
        match self.shared.turns.get(key) {
            Some(turn) => {
                turn.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Interrupts every turn and waits up to `timeout` for them to finalize.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        info!(active = self.shared.turns.len(), "engine shutting down");
        self.shutdown.cancel();
        shutdown::drain_turns(&self.tracker, timeout).await
    }

    /// Waits for `signal`, then shuts down like [`TurnEngine::shutdown`].
    pub async fn shutdown_when(&self, signal: CancellationToken, timeout: Duration) -> bool {
        signal.cancelled().await;
        self.shutdown(timeout).await
    }

    /// Shuts down on SIGTERM or SIGINT, for embedders that own the process.
    pub async fn shutdown_on_signal(&self, timeout: Duration) -> bool {
        self.shutdown_when(shutdown::install_signal_handler(), timeout)
            .await
    }
}

fn with_reason(decision: ApprovalDecision, reason: Option<String>) -> ApprovalDecision {
    match reason {
        Some(reason) => decision.with_reason(reason),
        None => decision,
    }
}

fn rejection_notice(error: &ApprovalError) -> String {
    match error {
        ApprovalError::MissingId => "Approval command needs an id.".to_string(),
        ApprovalError::Unknown(id) => format!("No pending approval with id {id}."),
        ApprovalError::Expired(id) => format!("Approval {id} has expired."),
        ApprovalError::AlreadyHandled(id) => format!("Approval {id} was already answered."),
    }
}
