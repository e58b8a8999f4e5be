// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Answers the agent subprocess's approval requests.
//!
//! The transport awaits [`ApprovalHandler::handle`] before replying, so the
//! subprocess stays blocked until a decision, the deadline, or the end of
//! the turn. No answer means decline.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sluice_approval::{ApprovalDecision, ApprovalError, ApprovalRegistry};
use sluice_core::{AgentRequest, MessageKind, RoomSink, StreamEvent};
use tracing::{debug, info, warn};

use crate::protocol::{ApprovalPrompt, decision_response, parse_approval_request};
use crate::turns::{ActiveTurn, ActiveTurns};

/// Decider recorded on synthesized decisions for elevated turns.
pub const AUTO_APPROVER: &str = "auto-approve";

pub struct ApprovalHandler {
    registry: Arc<ApprovalRegistry>,
    turns: Arc<ActiveTurns>,
    sink: Arc<dyn RoomSink>,
    ttl: Duration,
    command_prefix: String,
}

impl ApprovalHandler {
    pub fn new(
        registry: Arc<ApprovalRegistry>,
        turns: Arc<ActiveTurns>,
        sink: Arc<dyn RoomSink>,
        ttl: Duration,
        command_prefix: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            turns,
            sink,
            ttl,
            command_prefix: command_prefix.into(),
        }
    }

    /// Produces the wire answer for one subprocess request.
    pub async fn handle(&self, request: AgentRequest) -> Value {
        let approval_id = request.id.as_str();
        let Some(prompt) = parse_approval_request(&request) else {
            warn!(method = %request.method, approval_id, "unsupported agent request, declining");
            return decision_response(false);
        };
        let Some(turn) = prompt.key.as_ref().and_then(|key| self.turns.get(key)) else {
            warn!(
                approval_id,
                tool_name = %prompt.tool_name,
                key = ?prompt.key,
                "approval request matches no active turn, declining"
            );
            return decision_response(false);
        };

        let (pending, created) = self.registry.register(
            approval_id,
            &prompt.tool_call_id,
            &prompt.tool_name,
            self.ttl,
        );
        if created {
            turn.publisher
                .publish(StreamEvent::approval_request(
                    approval_id,
                    pending.tool_call_id(),
                ))
                .await;
        }

        if turn.access_level.is_elevated() {
            return self.auto_approve(approval_id, &turn);
        }

        if created {
            self.notify(&turn, approval_id, &prompt).await;
        }

        let approved = match self.registry.wait(&turn.cancel, approval_id).await {
            Some(decision) => {
                info!(
                    approval_id,
                    approved = decision.is_approved(),
                    decided_by = decision.decided_by(),
                    "approval decided"
                );
                decision.is_approved()
            }
            None => {
                if turn.cancel.is_cancelled() {
                    self.registry.remove(approval_id);
                }
                info!(approval_id, "approval got no answer, declining");
                false
            }
        };
        decision_response(approved)
    }

    /// Fills the slot with a synthesized accept and answers at once.
    ///
    /// Nothing consumes the slot, so a late human decision on this id is
    /// reported as `AlreadyHandled`. The entry is reaped at its deadline.
    fn auto_approve(&self, approval_id: &str, turn: &ActiveTurn) -> Value {
        match self
            .registry
            .resolve(approval_id, ApprovalDecision::approve(AUTO_APPROVER))
        {
            Ok(()) | Err(ApprovalError::AlreadyHandled(_)) => {}
            Err(e) => debug!(approval_id, error = %e, "auto-approve slot not filled"),
        }
        info!(
            approval_id,
            room = %turn.room,
            turn_id = %turn.key.turn_id,
            "approval auto-approved for elevated turn"
        );
        decision_response(true)
    }

    async fn notify(&self, turn: &ActiveTurn, approval_id: &str, prompt: &ApprovalPrompt) {
        let body = approval_notice(&self.command_prefix, approval_id, prompt);
        if let Err(e) = self
            .sink
            .send_message(&turn.room, &body, MessageKind::Notice)
            .await
        {
            warn!(approval_id, room = %turn.room, error = %e, "failed to send approval notice");
        }
    }
}

/// Room-facing text asking for a decision.
pub fn approval_notice(prefix: &str, approval_id: &str, prompt: &ApprovalPrompt) -> String {
    let action = match prompt.tool_name.as_str() {
        "commandExecution" => "run a command",
        "fileChange" => "change files",
        other => other,
    };
    let mut body = format!("Approval needed: the agent wants to {action}.");
    if let Some(summary) = &prompt.summary {
        body.push_str(&format!("\n    {summary}"));
    }
    body.push_str(&format!(
        "\nReply `{prefix}approve {approval_id} [reason]` or `{prefix}deny {approval_id} [reason]`."
    ));
    body
}
