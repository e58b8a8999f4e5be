// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the turn lifecycle.
//!
//! Each test builds an isolated TestHarness with a scripted agent, a
//! recording room sink and an in-memory store.

use std::time::Duration;

use serde_json::json;
use sluice_core::types::methods;
use sluice_core::{
    InboundMessage, MessageKind, RoomId, SluiceError, StreamEvent, ToolStatus, TurnKey, TurnStatus,
};
use sluice_engine::{InboundAction, TurnRequest};
use sluice_test_utils::TestHarness;
use sluice_test_utils::fixtures::*;
use tokio_util::sync::CancellationToken;

fn key(thread: &str, turn: &str) -> TurnKey {
    TurnKey::new(thread, turn)
}

// ---- Test 1: Streaming happy path ----

#[tokio::test]
async fn test_streams_text_and_completes() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    h.agent.push_all([
        agent_delta(&k, "Hel"),
        agent_delta(&k, "lo"),
        token_usage(&k, 10, 2),
        turn_completed(&k, "completed"),
    ]);
    let outcome = turn.await.unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.text, "Hello");
    assert_eq!(outcome.key, Some(k.clone()));
    assert_eq!(
        h.sink.kinds_for("turn_1"),
        [
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-delta",
            "message-metadata",
            "text-end",
            "finish-step",
            "finish",
        ]
    );

    let events = h.sink.events_for("turn_1");
    assert_eq!(events[0], StreamEvent::start("msg_turn_1"));
    match events.last().unwrap() {
        StreamEvent::Finish {
            finish_reason,
            message_metadata,
        } => {
            assert_eq!(*finish_reason, TurnStatus::Completed);
            let meta = message_metadata.as_ref().unwrap();
            assert_eq!(meta["usage"]["inputTokens"], 10);
            assert!(meta["firstTokenAt"].is_string());
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test]
async fn test_sequence_numbers_start_at_one_and_increase() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;
    h.agent
        .push_all([agent_delta(&k, "a"), turn_completed(&k, "completed")]);
    turn.await.unwrap();

    let seqs: Vec<u64> = h.sink.envelopes().iter().map(|(_, e)| e.seq).collect();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);
    assert_eq!(h.sink.envelopes()[0].1.txn_id, "turn_1:1");
}

#[tokio::test]
async fn test_visible_reply_and_persistence() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;
    h.agent.push_all([
        agent_delta(&k, "Hi "),
        agent_delta(&k, "there"),
        turn_completed(&k, "completed"),
    ]);
    let outcome = turn.await.unwrap();

    let visible = outcome.visible_message_id.unwrap();
    assert_eq!(h.sink.body_of(&visible).as_deref(), Some("Hi there"));

    let stored = h.store.bot_messages();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].correlation_id, "turn_1");
    assert_eq!(stored[0].body, "Hi there");

    let records = h.store.turn_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].finish_reason, TurnStatus::Completed);
    assert_eq!(records[0].model, "gpt-5-codex");
    assert_eq!(records[0].message_id, outcome.stored_message_id);

    let conversation = h.store.conversation("!room").unwrap();
    assert_eq!(conversation.thread_id, Some("thread_1".into()));
}

#[tokio::test]
async fn test_start_calls_carry_turn_parameters() {
    let h = TestHarness::new();
    let turn = h.submit(
        TurnRequest::new("!room", "list files")
            .with_model("o4-mini")
            .with_access_level(sluice_core::AccessLevel::ReadOnly),
    );
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;
    h.agent.push(turn_completed(&k, "completed"));
    turn.await.unwrap();

    let thread_start = &h.agent.calls_to(methods::THREAD_START)[0];
    assert_eq!(thread_start["model"], "o4-mini");
    assert_eq!(thread_start["sandbox"], "read-only");

    let turn_start = &h.agent.calls_to(methods::TURN_START)[0];
    assert_eq!(turn_start["threadId"], "thread_1");
    assert_eq!(
        turn_start["input"],
        json!([{ "type": "text", "text": "list files" }])
    );
}

#[tokio::test]
async fn test_existing_thread_is_reused() {
    let h = TestHarness::new();
    h.store.seed_thread("!room", "thread_9");
    h.agent
        .on_next_turn(|k| vec![turn_completed(k, "completed")]);

    let outcome = h.run("!room", "again").await;

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.key, Some(key("thread_9", "turn_1")));
    assert!(h.agent.calls_to(methods::THREAD_START).is_empty());
}

#[tokio::test]
async fn test_empty_reply_renders_placeholder() {
    let h = TestHarness::new();
    h.agent
        .on_next_turn(|k| vec![turn_completed(k, "completed")]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.text, "");
    assert_eq!(h.store.bot_messages()[0].body, "(no response)");
}

// ---- Test 2: Early terminal events ----

#[tokio::test(start_paused = true)]
async fn test_completion_emitted_before_start_returns_is_delivered() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();
    h.agent.route_before_start_returns();
    h.agent.on_next_turn(|k| vec![turn_completed(k, "completed")]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert!(h.sink.kinds_for("turn_1").ends_with(&["finish-step", "finish"]));
}

#[tokio::test(start_paused = true)]
async fn test_early_completion_is_lost_without_terminal_retries() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .settings(|s| s.routing.terminal_retry_attempts = 0)
        .build();
    h.agent.route_before_start_returns();
    h.agent.on_next_turn(|k| vec![turn_completed(k, "completed")]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Timeout);
}

#[tokio::test(start_paused = true)]
async fn test_early_error_is_retried_into_the_mailbox() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();
    h.agent.route_before_start_returns();
    h.agent
        .on_next_turn(|k| vec![agent_delta(k, "lost"), error(k, "stream disconnected", false)]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("stream disconnected"));
    // Non-terminal events that beat the subscription are dropped.
    assert_eq!(outcome.text, "");
}

#[tokio::test]
async fn test_failed_completion_carries_provider_error() {
    let h = TestHarness::new();
    h.agent.on_next_turn(|k| vec![turn_failed(k, "quota exceeded")]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("quota exceeded"));
    assert!(h.sink.kinds_for("turn_1").contains(&"error"));
    assert!(h.store.bot_messages()[0].body.contains("quota exceeded"));
}

#[tokio::test]
async fn test_fatal_error_notification_fails_turn() {
    let h = TestHarness::new();
    h.agent
        .on_next_turn(|k| vec![error(k, "stream disconnected", false)]);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert_eq!(outcome.error.as_deref(), Some("stream disconnected"));
}

#[tokio::test]
async fn test_completion_without_turn_id_is_accepted() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    h.agent.push(agent_delta(&k, "done"));
    h.agent.push(sluice_core::Notification::new(
        methods::TURN_COMPLETED,
        json!({ "threadId": "thread_1", "turn": { "status": "completed" } }),
    ));

    let outcome = turn.await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.text, "done");
}

// ---- Test 3: Room exclusivity ----

#[tokio::test]
async fn test_busy_room_rejects_second_turn() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "first"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    let second = h.engine.submit(TurnRequest::new("!room", "second"));
    assert!(matches!(second, Err(SluiceError::RoomBusy { .. })));
    assert!(h.engine.is_room_busy(&RoomId::from("!room")));
    assert_eq!(h.agent.calls_to(methods::TURN_START).len(), 1);

    h.agent.push(turn_completed(&k, "completed"));
    turn.await.unwrap();

    assert!(!h.engine.is_room_busy(&RoomId::from("!room")));
    h.agent
        .on_next_turn(|k| vec![turn_completed(k, "completed")]);
    let outcome = h.run("!room", "third").await;
    assert_eq!(outcome.status, TurnStatus::Completed);
}

#[tokio::test]
async fn test_inbound_message_in_busy_room_is_refused_with_notice() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "first"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    let result = h
        .engine
        .handle_inbound(InboundMessage {
            room: RoomId::from("!room"),
            sender: "@bob:example.org".into(),
            body: "another prompt".into(),
        })
        .await;
    assert!(matches!(result, Err(SluiceError::RoomBusy { .. })));
    assert!(
        h.sink
            .notices()
            .iter()
            .any(|m| m.body.contains("already running"))
    );

    h.agent.push(turn_completed(&k, "completed"));
    turn.await.unwrap();
}

#[tokio::test]
async fn test_inbound_prompt_starts_turn() {
    let h = TestHarness::new();
    h.agent
        .on_next_turn(|k| vec![turn_completed(k, "completed")]);

    let action = h
        .engine
        .handle_inbound(InboundMessage {
            room: RoomId::from("!room"),
            sender: "@bob:example.org".into(),
            body: "what is in this repo?".into(),
        })
        .await
        .unwrap();
    let InboundAction::Started(turn) = action else {
        panic!("expected a started turn");
    };
    assert_eq!(turn.await.unwrap().status, TurnStatus::Completed);
}

// ---- Test 4: Concurrent turns ----

#[tokio::test]
async fn test_concurrent_turns_stay_isolated() {
    let h = TestHarness::new();
    let turn_a = h.submit(TurnRequest::new("!a", "one"));
    let ka = key("thread_1", "turn_1");
    h.wait_for_turn(&ka).await;
    let turn_b = h.submit(TurnRequest::new("!b", "two"));
    let kb = key("thread_2", "turn_2");
    h.wait_for_turn(&kb).await;

    h.agent.push_all([
        agent_delta(&kb, "b1"),
        agent_delta(&ka, "a1"),
        agent_delta(&ka, "a2"),
        agent_delta(&kb, "b2"),
        turn_completed(&kb, "completed"),
    ]);
    let outcome_b = turn_b.await.unwrap();
    assert!(h.engine.active_turns().contains(&ka));

    h.agent.push(turn_completed(&ka, "completed"));
    let outcome_a = turn_a.await.unwrap();

    assert_eq!(outcome_a.text, "a1a2");
    assert_eq!(outcome_b.text, "b1b2");
    for (_, env) in h.sink.envelopes() {
        if let StreamEvent::TextDelta { delta, .. } = &env.event {
            let expected = if env.turn_id.as_str() == "turn_1" { 'a' } else { 'b' };
            assert!(delta.starts_with(expected), "{delta} leaked into {}", env.turn_id);
        }
    }
    let rooms: Vec<String> = h
        .sink
        .envelopes()
        .iter()
        .filter(|(_, e)| e.turn_id.as_str() == "turn_2")
        .map(|(room, _)| room.to_string())
        .collect();
    assert!(rooms.iter().all(|r| r == "!b"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_turns_stay_isolated_when_start_races() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();
    let turn_a = h.submit(TurnRequest::new("!a", "one"));
    let ka = key("thread_1", "turn_1");
    h.wait_for_turn(&ka).await;

    h.agent.route_before_start_returns();
    h.agent.on_next_turn({
        let ka = ka.clone();
        move |kb| {
            vec![
                agent_delta(&ka, "a1"),
                agent_delta(&ka, "a2"),
                turn_completed(kb, "completed"),
            ]
        }
    });
    let outcome_b = h.submit(TurnRequest::new("!b", "two")).await.unwrap();

    assert_eq!(outcome_b.status, TurnStatus::Completed);
    assert_eq!(outcome_b.key, Some(key("thread_2", "turn_2")));
    assert_eq!(outcome_b.text, "");
    assert!(h.engine.active_turns().contains(&ka));

    h.agent.push(turn_completed(&ka, "completed"));
    let outcome_a = turn_a.await.unwrap();
    assert_eq!(outcome_a.status, TurnStatus::Completed);
    assert_eq!(outcome_a.text, "a1a2");
    assert!(!h.sink.kinds_for("turn_2").contains(&"text-delta"));
}

#[tokio::test(start_paused = true)]
async fn test_visible_reply_edits_are_throttled() {
    let h = TestHarness::builder()
        .edit_throttle(Duration::from_secs(3600))
        .build();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    for chunk in ["a", "b", "c"] {
        h.agent.push(agent_delta(&k, chunk));
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    assert_eq!(h.sink.messages_in("!room").len(), 1);
    assert!(h.sink.edits().is_empty());

    h.agent.push(turn_completed(&k, "completed"));
    let outcome = turn.await.unwrap();

    let sent = h.sink.messages_in("!room");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, MessageKind::Text);
    assert_eq!(sent[0].body, "a");
    let edits = h.sink.edits();
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].body, "abc");
    assert_eq!(outcome.visible_message_id, Some(sent[0].id.clone()));
}

// ---- Test 5: Timeouts and cancellation ----

#[tokio::test(start_paused = true)]
async fn test_idle_turn_times_out() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Timeout);
    let kinds = h.sink.kinds_for("turn_1");
    assert_eq!(&kinds[kinds.len() - 3..], ["error", "finish-step", "finish"]);
    assert!(h.store.bot_messages()[0].body.contains("Turn timed out"));
    assert!(h.engine.active_turns().is_empty());
    assert!(!h.engine.is_room_busy(&RoomId::from("!room")));
}

#[tokio::test(start_paused = true)]
async fn test_activity_resets_idle_deadline() {
    let h = TestHarness::builder()
        .idle_timeout(Duration::from_secs(30))
        .build();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    for chunk in ["a", "b", "c"] {
        tokio::time::sleep(Duration::from_secs(20)).await;
        h.agent.push(agent_delta(&k, chunk));
    }
    h.agent.push(turn_completed(&k, "completed"));

    let outcome = turn.await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.text, "abc");
}

#[tokio::test]
async fn test_cancelled_turn_is_interrupted_and_persisted() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;
    h.agent.push(agent_delta(&k, "partial"));
    h.sink.wait_for_kind("turn_1", "text-delta").await;

    assert!(h.engine.cancel_turn(&k));
    let outcome = turn.await.unwrap();

    assert_eq!(outcome.status, TurnStatus::Interrupted);
    let interrupts = h.agent.calls_to(methods::TURN_INTERRUPT);
    assert_eq!(interrupts.len(), 1);
    assert_eq!(interrupts[0]["threadId"], "thread_1");
    assert_eq!(interrupts[0]["turnId"], "turn_1");
    assert!(h.store.bot_messages()[0].body.starts_with("partial"));
    assert!(!h.engine.cancel_turn(&k));
}

#[tokio::test]
async fn test_shutdown_interrupts_and_drains() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    h.wait_for_turn(&key("thread_1", "turn_1")).await;

    assert!(h.engine.shutdown(Duration::from_secs(5)).await);
    assert_eq!(turn.await.unwrap().status, TurnStatus::Interrupted);
    assert_eq!(h.store.turn_records().len(), 1);
    assert!(h.engine.submit(TurnRequest::new("!other", "late")).is_err());
}

#[tokio::test]
async fn test_shutdown_waits_for_external_signal() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    h.wait_for_turn(&key("thread_1", "turn_1")).await;

    let signal = CancellationToken::new();
    let waiter = tokio::spawn({
        let engine = h.engine.clone();
        let signal = signal.clone();
        async move { engine.shutdown_when(signal, Duration::from_secs(5)).await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(h.engine.is_room_busy(&RoomId::from("!room")));

    signal.cancel();
    assert!(waiter.await.unwrap());
    assert_eq!(turn.await.unwrap().status, TurnStatus::Interrupted);
    assert!(!h.engine.is_room_busy(&RoomId::from("!room")));
}

// ---- Test 6: Start failures ----

#[tokio::test]
async fn test_start_failure_fails_turn_and_releases_room() {
    let h = TestHarness::new();
    h.agent.fail(methods::TURN_START, "app-server unavailable");

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert!(outcome.key.is_none());
    assert!(outcome.error.unwrap().contains("app-server unavailable"));
    assert!(!h.engine.is_room_busy(&RoomId::from("!room")));

    let published: Vec<_> = h.sink.envelopes();
    let kinds: Vec<&str> = published.iter().map(|(_, e)| e.event.kind()).collect();
    assert_eq!(kinds, ["start", "start-step", "error", "finish-step", "finish"]);
    assert!(published[0].1.turn_id.as_str().starts_with("local-"));
    assert!(h.store.bot_messages()[0].correlation_id.starts_with("local-"));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_start_call_times_out_as_failure() {
    let h = TestHarness::builder()
        .start_timeout(Duration::from_secs(2))
        .build();
    h.agent.hang(methods::THREAD_START);

    let outcome = h.run("!room", "hello").await;

    assert_eq!(outcome.status, TurnStatus::Failed);
    assert!(outcome.error.unwrap().contains("timed out"));
    assert!(h.agent.calls_to(methods::TURN_START).is_empty());
}

// ---- Test 7: Tools, notices and account state ----

#[tokio::test]
async fn test_command_tool_lifecycle_is_streamed_and_recorded() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "build it"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    h.agent.push_all([
        agent_delta(&k, "Running the build."),
        command_started(&k, "item_1", "cargo build"),
        command_output_delta(&k, "item_1", "Compiling"),
        command_completed(&k, "item_1", "cargo build", "completed", "Compiling\nFinished", 0),
        agent_delta(&k, "Done."),
        turn_completed(&k, "completed"),
    ]);
    let outcome = turn.await.unwrap();

    assert_eq!(
        h.sink.kinds_for("turn_1"),
        [
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "tool-input-start",
            "tool-input-available",
            "tool-output-available",
            "tool-output-available",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish",
        ]
    );
    assert_eq!(outcome.text, "Running the build.Done.");

    let record = &h.store.turn_records()[0];
    assert_eq!(record.tool_calls.len(), 1);
    assert_eq!(record.tool_calls[0].status, ToolStatus::Completed);
    assert_eq!(record.tool_calls[0].input["command"], "cargo build");
}

#[tokio::test]
async fn test_plan_and_retry_notices_are_sent_once() {
    let h = TestHarness::new();
    let turn = h.submit(TurnRequest::new("!room", "plan it"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;

    let plan = [("read the code", "completed"), ("write the fix", "inProgress")];
    h.agent.push_all([
        plan_updated(&k, &plan),
        plan_updated(&k, &plan),
        error(&k, "overloaded", true),
        error(&k, "overloaded", true),
        turn_completed(&k, "completed"),
    ]);
    let outcome = turn.await.unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    let notices = h.sink.notices();
    assert_eq!(notices.len(), 2);
    assert!(notices[0].body.contains("[x] read the code"));
    assert!(notices[1].body.contains("overloaded"));
}

#[tokio::test]
async fn test_account_notifications_update_snapshot() {
    let h = TestHarness::new();
    h.agent.push(account_updated("chatgpt"));

    while h.engine.account_state().auth_mode.is_none() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(h.engine.account_state().auth_mode.as_deref(), Some("chatgpt"));
}

#[tokio::test]
async fn test_transport_failures_do_not_stop_the_turn() {
    let h = TestHarness::new();
    h.sink.fail_ephemeral(true);
    let turn = h.submit(TurnRequest::new("!room", "hello"));
    let k = key("thread_1", "turn_1");
    h.wait_for_turn(&k).await;
    h.agent
        .push_all([agent_delta(&k, "ok"), turn_completed(&k, "completed")]);

    let outcome = turn.await.unwrap();
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert!(h.sink.envelopes().is_empty());
    assert_eq!(h.store.bot_messages()[0].body, "ok");
}
