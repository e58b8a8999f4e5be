// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builders for agent subprocess notifications and requests.

use serde_json::{Value, json};
use sluice_core::types::methods;
use sluice_core::{AgentRequest, Notification, TurnKey};

fn scoped(key: &TurnKey, mut params: Value) -> Value {
    if let Value::Object(map) = &mut params {
        map.insert("threadId".into(), json!(key.thread_id));
        map.insert("turnId".into(), json!(key.turn_id));
    }
    params
}

pub fn agent_delta(key: &TurnKey, delta: &str) -> Notification {
    Notification::new(methods::AGENT_MESSAGE_DELTA, scoped(key, json!({ "delta": delta })))
}

pub fn reasoning_delta(key: &TurnKey, delta: &str) -> Notification {
    Notification::new(methods::REASONING_TEXT_DELTA, scoped(key, json!({ "delta": delta })))
}

pub fn reasoning_summary_delta(key: &TurnKey, delta: &str) -> Notification {
    Notification::new(
        methods::REASONING_SUMMARY_DELTA,
        scoped(key, json!({ "delta": delta })),
    )
}

pub fn agent_message_completed(key: &TurnKey, item_id: &str, text: &str) -> Notification {
    Notification::new(
        methods::ITEM_COMPLETED,
        scoped(
            key,
            json!({ "item": { "type": "agentMessage", "id": item_id, "text": text } }),
        ),
    )
}

pub fn command_started(key: &TurnKey, item_id: &str, command: &str) -> Notification {
    Notification::new(
        methods::ITEM_STARTED,
        scoped(
            key,
            json!({ "item": {
                "type": "commandExecution",
                "id": item_id,
                "command": command,
                "cwd": "/workspace",
                "status": "inProgress",
            } }),
        ),
    )
}

pub fn command_output_delta(key: &TurnKey, item_id: &str, delta: &str) -> Notification {
    Notification::new(
        methods::COMMAND_OUTPUT_DELTA,
        scoped(key, json!({ "itemId": item_id, "delta": delta })),
    )
}

/// `status` is the provider item status: `completed`, `failed` or `declined`.
pub fn command_completed(
    key: &TurnKey,
    item_id: &str,
    command: &str,
    status: &str,
    output: &str,
    exit_code: i64,
) -> Notification {
    Notification::new(
        methods::ITEM_COMPLETED,
        scoped(
            key,
            json!({ "item": {
                "type": "commandExecution",
                "id": item_id,
                "command": command,
                "cwd": "/workspace",
                "status": status,
                "aggregatedOutput": output,
                "exitCode": exit_code,
            } }),
        ),
    )
}

pub fn token_usage(key: &TurnKey, input: u64, output: u64) -> Notification {
    Notification::new(
        methods::TOKEN_USAGE_UPDATED,
        scoped(
            key,
            json!({ "tokenUsage": { "total": {
                "inputTokens": input,
                "outputTokens": output,
                "totalTokens": input + output,
            } } }),
        ),
    )
}

pub fn plan_updated(key: &TurnKey, steps: &[(&str, &str)]) -> Notification {
    let plan: Vec<Value> = steps
        .iter()
        .map(|(step, status)| json!({ "step": step, "status": status }))
        .collect();
    Notification::new(methods::TURN_PLAN_UPDATED, scoped(key, json!({ "plan": plan })))
}

pub fn error(key: &TurnKey, message: &str, will_retry: bool) -> Notification {
    Notification::new(
        methods::ERROR,
        scoped(
            key,
            json!({ "error": { "message": message }, "willRetry": will_retry }),
        ),
    )
}

/// `turn/completed` in the provider's nested shape.
pub fn turn_completed(key: &TurnKey, status: &str) -> Notification {
    Notification::new(
        methods::TURN_COMPLETED,
        json!({
            "threadId": key.thread_id,
            "turn": { "id": key.turn_id, "status": status },
        }),
    )
}

pub fn turn_failed(key: &TurnKey, message: &str) -> Notification {
    Notification::new(
        methods::TURN_COMPLETED,
        json!({
            "threadId": key.thread_id,
            "turn": { "id": key.turn_id, "status": "failed", "error": { "message": message } },
        }),
    )
}

pub fn account_updated(auth_mode: &str) -> Notification {
    Notification::new(methods::ACCOUNT_UPDATED, json!({ "authMode": auth_mode }))
}

pub fn command_approval(
    approval_id: &str,
    key: &TurnKey,
    item_id: &str,
    command: &str,
) -> AgentRequest {
    AgentRequest {
        id: approval_id.to_string(),
        method: methods::COMMAND_APPROVAL.to_string(),
        params: json!({
            "threadId": key.thread_id,
            "turnId": key.turn_id,
            "itemId": item_id,
            "command": command,
        }),
    }
}
