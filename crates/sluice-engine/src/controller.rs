// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn lifecycle controller.
//!
//! One task per turn. The task owns the room guard, the turn's
//! [`StreamingState`] and its mailbox, and always ends in [`finalize`]
//! whichever terminal state it reaches.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};
use sluice_core::types::methods;
use sluice_core::{
    AccessLevel, AgentRpc, ApprovalPolicy, Conversation, MessageId, MessageKind, RoomId,
    RoomSink, RoomStore, SluiceError, ThreadId, TurnId, TurnKey, TurnRecord, TurnStatus,
};
use sluice_stream::{StreamingState, emitter};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::locks::RoomGuard;
use crate::protocol::{self, TurnSignal};
use crate::router::{NotificationRouter, Subscription};
use crate::settings::EngineSettings;
use crate::turns::{ActiveTurn, ActiveTurns, TurnPublisher};

/// Everything a turn task borrows from the engine.
pub(crate) struct EngineShared {
    pub rpc: Arc<dyn AgentRpc>,
    pub sink: Arc<dyn RoomSink>,
    pub store: Arc<dyn RoomStore>,
    pub router: Arc<NotificationRouter>,
    pub turns: Arc<ActiveTurns>,
    pub settings: EngineSettings,
}

/// A user prompt to run as a turn in a room.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    pub room: RoomId,
    pub prompt: String,
    /// Falls back to `codex.default_model`.
    pub model: Option<String>,
    pub access_level: Option<AccessLevel>,
    pub approval_policy: Option<ApprovalPolicy>,
}

impl TurnRequest {
    pub fn new(room: impl Into<RoomId>, prompt: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            prompt: prompt.into(),
            model: None,
            access_level: None,
            approval_policy: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_access_level(mut self, access_level: AccessLevel) -> Self {
        self.access_level = Some(access_level);
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = Some(policy);
        self
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub room: RoomId,
    /// `None` when the start call never produced a turn.
    pub key: Option<TurnKey>,
    pub status: TurnStatus,
    pub error: Option<String>,
    pub text: String,
    /// Visible reply in the room.
    pub visible_message_id: Option<MessageId>,
    /// Persisted bot message.
    pub stored_message_id: Option<MessageId>,
}

/// Turn-scoped parameters resolved against the defaults.
struct Resolved {
    model: String,
    access_level: AccessLevel,
    approval_policy: ApprovalPolicy,
}

pub(crate) async fn run_turn(
    shared: Arc<EngineShared>,
    request: TurnRequest,
    guard: RoomGuard,
    cancel: CancellationToken,
) -> TurnOutcome {
    let settings = &shared.settings;
    let resolved = Resolved {
        model: request
            .model
            .clone()
            .unwrap_or_else(|| settings.default_model.clone()),
        access_level: request.access_level.unwrap_or(settings.access_level),
        approval_policy: request.approval_policy.unwrap_or(settings.approval_policy),
    };
    let started_at = Utc::now();
    let status = TurnStatus::Starting;
    info!(room = %request.room, model = %resolved.model, "turn starting");

    let started = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(None),
        result = start(&shared, &request, &resolved) => result.map_err(Some),
    };

    let (thread_id, turn_id) = match started {
        Ok(ids) => ids,
        Err(cause) => {
            let (next, message) = match cause {
                Some(e) => {
                    error!(room = %request.room, error = %e, "turn start failed");
                    (TurnStatus::Failed, Some(e.to_string()))
                }
                None => (TurnStatus::Interrupted, None),
            };
            let local_id = TurnId::from(format!("local-{}", uuid::Uuid::new_v4()));
            let publisher = TurnPublisher::new(
                request.room.clone(),
                local_id.clone(),
                Arc::clone(&shared.sink),
            );
            let mut state = StreamingState::new(format!("msg_{local_id}"));
            let finish = Finish {
                status: advance(status, next),
                error: message,
                thread_id: None,
                turn_id: None,
                correlation: local_id,
                started_at,
            };
            let mut visible = VisibleReply::new(&shared, &request.room);
            return finalize(
                &shared,
                &request,
                &resolved,
                &publisher,
                &mut state,
                &mut visible,
                finish,
                guard,
            )
            .await;
        }
    };

    let key = TurnKey::new(thread_id.clone(), turn_id.clone());
    let publisher = TurnPublisher::new(
        request.room.clone(),
        turn_id.clone(),
        Arc::clone(&shared.sink),
    );
    let mut state = StreamingState::new(format!("msg_{turn_id}"));
    let mut visible = VisibleReply::new(&shared, &request.room);

    let (registered, next, error) =
        match register(&shared, &request, &resolved, &key, &publisher, &cancel) {
            Ok(subscription) => {
                let status = advance(status, TurnStatus::Running);
                info!(room = %request.room, thread_id = %thread_id, turn_id = %turn_id, "turn running");
                publisher.publish_all(emitter::begin(&mut state)).await;
                let (next, error) = drain(
                    &shared,
                    &key,
                    subscription,
                    &publisher,
                    &mut state,
                    &mut visible,
                    &cancel,
                )
                .await;
                (true, advance(status, next), error)
            }
            Err(e) => {
                error!(room = %request.room, %key, error = %e, "turn registration failed");
                (false, advance(status, TurnStatus::Failed), Some(e.to_string()))
            }
        };

    // The subscription is already gone; only remove an entry this turn owns.
    if registered {
        shared.turns.remove(&key);
    }
    let cancelled = cancel.is_cancelled();
    cancel.cancel();

    if next == TurnStatus::Interrupted && cancelled {
        interrupt(&shared, &key).await;
    }

    let finish = Finish {
        status: next,
        error,
        thread_id: Some(thread_id),
        turn_id: Some(turn_id.clone()),
        correlation: turn_id,
        started_at,
    };
    let mut outcome = finalize(
        &shared, &request, &resolved, &publisher, &mut state, &mut visible, finish, guard,
    )
    .await;
    outcome.key = Some(key);
    outcome
}

/// Ensures the room's thread exists and starts the turn on it.
async fn start(
    shared: &EngineShared,
    request: &TurnRequest,
    resolved: &Resolved,
) -> Result<(ThreadId, TurnId), SluiceError> {
    let timeout = shared.settings.start_timeout;
    let mut conversation = shared.store.get_or_create_conversation(&request.room).await?;

    let thread_id = match conversation.thread_id.clone() {
        Some(thread_id) => thread_id,
        None => {
            let thread_id = start_thread(shared, resolved).await?;
            save_thread(shared, &mut conversation, &thread_id).await?;
            thread_id
        }
    };

    let params = json!({
        "threadId": thread_id,
        "input": [{ "type": "text", "text": request.prompt }],
        "model": resolved.model,
        "approvalPolicy": resolved.approval_policy,
    });
    let response = bounded_call(shared, methods::TURN_START, params, timeout).await?;
    let turn_id = response
        .get("turn")
        .and_then(|turn| turn.get("id"))
        .or_else(|| response.get("turnId"))
        .and_then(Value::as_str)
        .ok_or_else(|| SluiceError::StartFailed {
            message: "turn/start response carried no turn id".to_string(),
        })?;
    Ok((thread_id, TurnId::from(turn_id)))
}

async fn start_thread(shared: &EngineShared, resolved: &Resolved) -> Result<ThreadId, SluiceError> {
    let params = json!({
        "model": resolved.model,
        "cwd": shared.settings.cwd,
        "approvalPolicy": resolved.approval_policy,
        "sandbox": resolved.access_level.sandbox_mode(),
    });
    let response =
        bounded_call(shared, methods::THREAD_START, params, shared.settings.start_timeout).await?;
    response
        .get("thread")
        .and_then(|thread| thread.get("id"))
        .or_else(|| response.get("threadId"))
        .and_then(Value::as_str)
        .map(ThreadId::from)
        .ok_or_else(|| SluiceError::StartFailed {
            message: "thread/start response carried no thread id".to_string(),
        })
}

async fn save_thread(
    shared: &EngineShared,
    conversation: &mut Conversation,
    thread_id: &ThreadId,
) -> Result<(), SluiceError> {
    conversation.thread_id = Some(thread_id.clone());
    conversation.updated_at = Utc::now();
    shared.store.save_conversation(conversation).await?;
    debug!(room = %conversation.room, thread_id = %thread_id, "thread started for room");
    Ok(())
}

/// An RPC call bounded by `timeout` even if the transport ignores it.
async fn bounded_call(
    shared: &EngineShared,
    method: &str,
    params: Value,
    timeout: Duration,
) -> Result<Value, SluiceError> {
    match tokio::time::timeout(timeout, shared.rpc.call(method, params, timeout)).await {
        Ok(result) => result,
        Err(_) => Err(SluiceError::Timeout { duration: timeout }),
    }
}

fn register(
    shared: &EngineShared,
    request: &TurnRequest,
    resolved: &Resolved,
    key: &TurnKey,
    publisher: &TurnPublisher,
    cancel: &CancellationToken,
) -> Result<Subscription, SluiceError> {
    let subscription = shared
        .router
        .subscribe(key.clone(), shared.settings.mailbox_capacity)?;
    shared.turns.insert(Arc::new(ActiveTurn {
        key: key.clone(),
        room: request.room.clone(),
        model: resolved.model.clone(),
        approval_policy: resolved.approval_policy,
        access_level: resolved.access_level,
        created_at: Utc::now(),
        publisher: publisher.clone(),
        cancel: cancel.clone(),
    }))?;
    Ok(subscription)
}

/// Drains the mailbox until a terminal condition. Returns the next state
/// and an optional error line.
async fn drain(
    shared: &EngineShared,
    key: &TurnKey,
    mut subscription: Subscription,
    publisher: &TurnPublisher,
    state: &mut StreamingState,
    visible: &mut VisibleReply,
    cancel: &CancellationToken,
) -> (TurnStatus, Option<String>) {
    let idle_timeout = shared.settings.idle_timeout;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%key, "turn cancelled");
                return (TurnStatus::Interrupted, None);
            }
            next = tokio::time::timeout(idle_timeout, subscription.recv()) => next,
        };

        let notification = match next {
            Err(_) => {
                warn!(%key, ?idle_timeout, "turn idle deadline reached");
                return (
                    TurnStatus::Timeout,
                    Some(format!(
                        "no activity from the agent for {}s",
                        idle_timeout.as_secs()
                    )),
                );
            }
            Ok(None) => {
                return (
                    TurnStatus::Failed,
                    Some("notification mailbox closed".to_string()),
                );
            }
            Ok(Some(notification)) => notification,
        };

        match protocol::parse_notification(&notification) {
            TurnSignal::Completed { status, error, .. } => {
                if protocol::completion_matches(key, &notification) {
                    return (status, error);
                }
                debug!(%key, "ignoring completion for another turn");
            }
            TurnSignal::Failed { message } => return (TurnStatus::Failed, Some(message)),
            TurnSignal::Event(event) => {
                let emission = emitter::apply(state, event);
                publisher.publish_all(emission.events).await;
                if let Some(body) = emission.notice {
                    visible.notice(&body).await;
                }
                visible.update(state.text()).await;
            }
            TurnSignal::Ignored => {}
        }
    }
}

/// Best-effort `turn/interrupt` for a turn we stopped waiting on.
async fn interrupt(shared: &EngineShared, key: &TurnKey) {
    let params = json!({ "threadId": key.thread_id, "turnId": key.turn_id });
    let timeout = shared.settings.interrupt_timeout;
    match bounded_call(shared, methods::TURN_INTERRUPT, params, timeout).await {
        Ok(_) => debug!(%key, "turn interrupt acknowledged"),
        Err(e) => debug!(%key, error = %e, "turn interrupt failed"),
    }
}

/// Moves along the state machine, treating an illegal edge as a failure.
fn advance(from: TurnStatus, to: TurnStatus) -> TurnStatus {
    from.transition(to).unwrap_or_else(|e| {
        warn!(error = %e, "rejected turn transition");
        TurnStatus::Failed
    })
}

struct Finish {
    status: TurnStatus,
    error: Option<String>,
    thread_id: Option<ThreadId>,
    turn_id: Option<TurnId>,
    correlation: TurnId,
    started_at: chrono::DateTime<Utc>,
}

#[allow(clippy::too_many_arguments)]
async fn finalize(
    shared: &EngineShared,
    request: &TurnRequest,
    resolved: &Resolved,
    publisher: &TurnPublisher,
    state: &mut StreamingState,
    visible: &mut VisibleReply,
    finish: Finish,
    guard: RoomGuard,
) -> TurnOutcome {
    publisher
        .publish_all(emitter::finish(state, finish.status, finish.error.as_deref()))
        .await;

    let body = render_body(state.text(), finish.status, finish.error.as_deref());
    let visible_message_id = visible.finish(&body).await;

    let stored_message_id = match shared
        .store
        .insert_bot_message(&request.room, finish.correlation.as_str(), &body)
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            warn!(room = %request.room, error = %e, "failed to persist bot message");
            None
        }
    };

    let record = TurnRecord {
        room: request.room.clone(),
        thread_id: finish.thread_id,
        turn_id: finish.turn_id,
        model: resolved.model.clone(),
        message_id: stored_message_id.clone(),
        finish_reason: finish.status,
        error: finish.error.clone(),
        usage: state.usage(),
        tool_calls: state.tool_calls().to_vec(),
        reasoning: state.reasoning().to_string(),
        started_at: finish.started_at,
        first_token_at: state.first_token_at(),
        completed_at: state.completed_at().unwrap_or_else(Utc::now),
    };
    if let Err(e) = shared.store.upsert_turn_record(&record).await {
        warn!(room = %request.room, error = %e, "failed to persist turn record");
    }

    drop(guard);
    info!(
        room = %request.room,
        status = %finish.status,
        input_tokens = record.usage.input_tokens,
        output_tokens = record.usage.output_tokens,
        tool_calls = record.tool_calls.len(),
        "turn finished"
    );

    TurnOutcome {
        room: request.room.clone(),
        key: None,
        status: finish.status,
        error: finish.error,
        text: state.text().to_string(),
        visible_message_id,
        stored_message_id,
    }
}

/// Final visible body: the reply text plus a status line when the turn
/// did not complete normally.
pub fn render_body(text: &str, status: TurnStatus, error: Option<&str>) -> String {
    let text = text.trim();
    let status_line = match (status, error) {
        (TurnStatus::Completed, _) => None,
        (TurnStatus::Failed, Some(e)) => Some(format!("Turn failed: {e}")),
        (TurnStatus::Failed, None) => Some("Turn failed.".to_string()),
        (TurnStatus::Timeout, Some(e)) => Some(format!("Turn timed out: {e}")),
        (TurnStatus::Timeout, None) => Some("Turn timed out.".to_string()),
        (TurnStatus::Interrupted, _) => Some("Turn interrupted.".to_string()),
        (TurnStatus::Starting | TurnStatus::Running, _) => None,
    };
    match (text.is_empty(), status_line) {
        (true, None) => "(no response)".to_string(),
        (true, Some(line)) => line,
        (false, None) => text.to_string(),
        (false, Some(line)) => format!("{text}\n\n_{line}_"),
    }
}

/// The visible reply, sent on the first text and edited in place.
struct VisibleReply {
    room: RoomId,
    sink: Arc<dyn RoomSink>,
    throttle: Duration,
    message_id: Option<MessageId>,
    last_edit: Option<Instant>,
    shown_len: usize,
}

impl VisibleReply {
    fn new(shared: &EngineShared, room: &RoomId) -> Self {
        Self {
            room: room.clone(),
            sink: Arc::clone(&shared.sink),
            throttle: shared.settings.edit_throttle,
            message_id: None,
            last_edit: None,
            shown_len: 0,
        }
    }

    async fn update(&mut self, text: &str) {
        if text.is_empty() || text.len() == self.shown_len {
            return;
        }
        match &self.message_id {
            None => match self.sink.send_message(&self.room, text, MessageKind::Text).await {
                Ok(id) => {
                    self.message_id = Some(id);
                    self.last_edit = Some(Instant::now());
                    self.shown_len = text.len();
                }
                Err(e) => warn!(room = %self.room, error = %e, "failed to send initial reply"),
            },
            Some(id) => {
                if self
                    .last_edit
                    .is_some_and(|at| at.elapsed() < self.throttle)
                {
                    return;
                }
                match self.sink.edit_message(&self.room, id, text).await {
                    Ok(()) => self.shown_len = text.len(),
                    Err(e) => debug!(room = %self.room, error = %e, "failed to edit reply"),
                }
                self.last_edit = Some(Instant::now());
            }
        }
    }

    async fn notice(&self, body: &str) {
        if let Err(e) = self
            .sink
            .send_message(&self.room, body, MessageKind::Notice)
            .await
        {
            debug!(room = %self.room, error = %e, "failed to send notice");
        }
    }

    /// Final edit, or a single send when nothing was streamed.
    async fn finish(&mut self, body: &str) -> Option<MessageId> {
        match &self.message_id {
            Some(id) => {
                if let Err(e) = self.sink.edit_message(&self.room, id, body).await {
                    debug!(room = %self.room, error = %e, "failed to send final edit");
                }
                Some(id.clone())
            }
            None => match self.sink.send_message(&self.room, body, MessageKind::Text).await {
                Ok(id) => {
                    self.message_id = Some(id.clone());
                    Some(id)
                }
                Err(e) => {
                    error!(room = %self.room, error = %e, "failed to send reply");
                    None
                }
            },
        }
    }
}
