// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval requests answered by access level, chat commands, deadlines and
//! turn completion.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use sluice_approval::{ApprovalDecision, ApprovalError};
use sluice_core::{AccessLevel, AgentRequest, InboundMessage, RoomId, StreamEvent, TurnKey};
use sluice_engine::{InboundAction, TurnEngine, TurnRequest};
use sluice_test_utils::TestHarness;
use sluice_test_utils::fixtures::*;
use tokio::task::JoinHandle;

const ACCEPT: &str = "accept";
const DECLINE: &str = "decline";

fn decision(value: &Value) -> &str {
    value["decision"].as_str().unwrap()
}

fn spawn_request(engine: &Arc<TurnEngine>, request: AgentRequest) -> JoinHandle<Value> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move { engine.handle_request(request).await })
}

fn command(room: &str, body: &str) -> InboundMessage {
    InboundMessage {
        room: RoomId::from(room),
        sender: "@alice:example.org".into(),
        body: body.into(),
    }
}

async fn running(h: &TestHarness) -> (JoinHandle<sluice_engine::TurnOutcome>, TurnKey) {
    let turn = h.submit(TurnRequest::new("!room", "fix the build"));
    let key = TurnKey::new("thread_1", "turn_1");
    h.wait_for_turn(&key).await;
    (turn, key)
}

// ---- Test 1: Elevated access ----

#[tokio::test]
async fn test_full_access_auto_approves_and_announces_request() {
    let h = TestHarness::builder()
        .access_level(AccessLevel::Full)
        .build();
    let (turn, key) = running(&h).await;

    let response = h
        .engine
        .handle_request(command_approval("123", &key, "item_1", "cargo build"))
        .await;

    assert_eq!(response, json!({ "decision": ACCEPT }));
    assert!(
        h.sink
            .events_for("turn_1")
            .contains(&StreamEvent::approval_request("123", "item_1"))
    );
    assert!(h.sink.notices().is_empty());
    // The filled slot stays registered until its deadline.
    assert_eq!(h.engine.pending_approvals(), 1);

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_auto_approved_request_rejects_late_human_command() {
    let h = TestHarness::builder()
        .access_level(AccessLevel::Full)
        .build();
    let (turn, key) = running(&h).await;
    h.engine
        .handle_request(command_approval("7", &key, "item_1", "ls"))
        .await;

    let action = h.engine.handle_inbound(command("!room", "!deny 7")).await.unwrap();
    assert!(matches!(
        action,
        InboundAction::Rejected {
            error: ApprovalError::AlreadyHandled(_),
            ..
        }
    ));

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_auto_approved_entry_is_swept_after_its_deadline() {
    let h = TestHarness::builder()
        .access_level(AccessLevel::Full)
        .approval_ttl(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(60))
        .build();
    let (turn, key) = running(&h).await;
    h.engine
        .handle_request(command_approval("8", &key, "item_1", "ls"))
        .await;
    assert_eq!(h.engine.pending_approvals(), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.engine.pending_approvals(), 0);

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

// ---- Test 2: Human decisions ----

#[tokio::test]
async fn test_approve_command_accepts_pending_request() {
    let h = TestHarness::new();
    let (turn, key) = running(&h).await;

    let request = spawn_request(&h.engine, command_approval("123", &key, "item_1", "cargo build"));
    h.sink.wait_for_notice("!approve 123").await;
    assert!(h.sink.notices()[0].body.contains("cargo build"));

    let action = h
        .engine
        .handle_inbound(command("!room", "!approve 123 looks fine"))
        .await
        .unwrap();
    assert!(matches!(action, InboundAction::Resolved { ref approval_id } if approval_id == "123"));
    assert_eq!(decision(&request.await.unwrap()), ACCEPT);
    assert_eq!(h.engine.pending_approvals(), 0);

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_deny_command_declines_pending_request() {
    let h = TestHarness::new();
    let (turn, key) = running(&h).await;

    let request = spawn_request(&h.engine, command_approval("9", &key, "item_2", "rm -rf /"));
    h.sink.wait_for_notice("!deny 9").await;

    h.engine
        .handle_inbound(command("!room", "!DENY 9 absolutely not"))
        .await
        .unwrap();
    assert_eq!(decision(&request.await.unwrap()), DECLINE);

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_second_decision_is_already_handled() {
    let h = TestHarness::new();
    let (turn, key) = running(&h).await;

    let request = spawn_request(&h.engine, command_approval("5", &key, "item_1", "make"));
    h.sink.wait_for_notice("!approve 5").await;

    assert!(
        h.engine
            .resolve_approval("5", ApprovalDecision::approve("@alice"))
            .is_ok()
    );
    // Nothing has consumed the slot yet, so the entry is still registered.
    assert!(matches!(
        h.engine.resolve_approval("5", ApprovalDecision::deny("@bob")),
        Err(ApprovalError::AlreadyHandled(_))
    ));
    assert_eq!(decision(&request.await.unwrap()), ACCEPT);
    // The waiter consumed the decision and reaped the entry.
    assert!(matches!(
        h.engine.resolve_approval("5", ApprovalDecision::deny("@bob")),
        Err(ApprovalError::Unknown(_))
    ));

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_unknown_and_missing_ids_are_reported() {
    let h = TestHarness::new();

    let action = h.engine.handle_inbound(command("!room", "!approve 404")).await.unwrap();
    assert!(matches!(
        action,
        InboundAction::Rejected {
            error: ApprovalError::Unknown(_),
            ..
        }
    ));
    let action = h.engine.handle_inbound(command("!room", "!approve")).await.unwrap();
    assert!(matches!(
        action,
        InboundAction::Rejected {
            error: ApprovalError::MissingId,
            ..
        }
    ));
    let notices = h.sink.notices();
    assert_eq!(notices.len(), 2);
    assert!(notices[0].body.contains("404"));
    assert!(h.engine.active_turns().is_empty());
}

// ---- Test 3: No answer ----

#[tokio::test]
async fn test_request_without_active_turn_is_declined() {
    let h = TestHarness::new();
    let key = TurnKey::new("thread_x", "turn_x");

    let response = h
        .engine
        .handle_request(command_approval("1", &key, "item_1", "ls"))
        .await;

    assert_eq!(decision(&response), DECLINE);
    assert_eq!(h.engine.pending_approvals(), 0);
    assert!(h.sink.envelopes().is_empty());
}

#[tokio::test]
async fn test_unsupported_request_is_declined() {
    let h = TestHarness::new();
    let request = AgentRequest {
        id: "2".into(),
        method: "item/tool/requestUserInput".into(),
        params: json!({}),
    };
    assert_eq!(decision(&h.engine.handle_request(request).await), DECLINE);
}

#[tokio::test(start_paused = true)]
async fn test_expired_approval_is_declined_and_reaped() {
    let h = TestHarness::builder()
        .approval_ttl(Duration::from_secs(5))
        .build();
    let (turn, key) = running(&h).await;

    let request = spawn_request(&h.engine, command_approval("42", &key, "item_1", "make"));
    assert_eq!(decision(&request.await.unwrap()), DECLINE);
    assert_eq!(h.engine.pending_approvals(), 0);

    let late = h.engine.resolve_approval("42", ApprovalDecision::approve("@alice"));
    assert_eq!(late, Err(ApprovalError::Unknown("42".into())));

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_turn_end_unblocks_pending_approval() {
    let h = TestHarness::new();
    let (turn, key) = running(&h).await;

    let request = spawn_request(&h.engine, command_approval("77", &key, "item_1", "make"));
    h.sink.wait_for_notice("!approve 77").await;

    h.agent.push(turn_completed(&key, "completed"));
    turn.await.unwrap();

    assert_eq!(decision(&request.await.unwrap()), DECLINE);
    assert_eq!(h.engine.pending_approvals(), 0);
}
