// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of the codex app-server vocabulary into typed turn signals.

use serde_json::{Value, json};
use sluice_core::types::methods;
use sluice_core::{AgentRequest, Notification, TokenUsage, ToolStatus, TurnKey, TurnStatus};
use sluice_stream::AgentEvent;

/// Item types that surface as tool calls.
const TOOL_ITEM_TYPES: &[&str] = &["commandExecution", "fileChange", "mcpToolCall", "webSearch"];

/// What a routed notification means to the turn that receives it.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnSignal {
    /// Hand to the emitter.
    Event(AgentEvent),
    /// `turn/completed`.
    Completed {
        turn_id: Option<String>,
        status: TurnStatus,
        error: Option<String>,
    },
    /// A non-retryable `error`.
    Failed { message: String },
    /// Known or unknown, but nothing to do.
    Ignored,
}

/// Classifies one notification.
pub fn parse_notification(notification: &Notification) -> TurnSignal {
    let params = &notification.params;
    match notification.method.as_str() {
        methods::AGENT_MESSAGE_DELTA => delta(params)
            .map(|delta| TurnSignal::Event(AgentEvent::TextDelta { delta }))
            .unwrap_or(TurnSignal::Ignored),
        methods::REASONING_SUMMARY_DELTA | methods::REASONING_TEXT_DELTA => delta(params)
            .map(|delta| {
                TurnSignal::Event(AgentEvent::ReasoningDelta {
                    delta,
                    summary: notification.method == methods::REASONING_SUMMARY_DELTA,
                })
            })
            .unwrap_or(TurnSignal::Ignored),
        methods::COMMAND_OUTPUT_DELTA | methods::FILE_CHANGE_OUTPUT_DELTA => {
            let tool_name = if notification.method == methods::COMMAND_OUTPUT_DELTA {
                "commandExecution"
            } else {
                "fileChange"
            };
            match (str_field(params, "itemId"), delta(params)) {
                (Some(call_id), Some(delta)) => TurnSignal::Event(AgentEvent::ToolOutputDelta {
                    call_id,
                    tool_name: tool_name.to_string(),
                    delta,
                }),
                _ => TurnSignal::Ignored,
            }
        }
        methods::ITEM_STARTED => params
            .get("item")
            .and_then(item_started)
            .map(TurnSignal::Event)
            .unwrap_or(TurnSignal::Ignored),
        methods::ITEM_COMPLETED => params
            .get("item")
            .and_then(item_completed)
            .map(TurnSignal::Event)
            .unwrap_or(TurnSignal::Ignored),
        methods::TURN_PLAN_UPDATED => plan_notice(params)
            .map(TurnSignal::Event)
            .unwrap_or(TurnSignal::Ignored),
        methods::TOKEN_USAGE_UPDATED => token_usage(params)
            .map(|usage| TurnSignal::Event(AgentEvent::Usage(usage)))
            .unwrap_or(TurnSignal::Ignored),
        methods::ERROR => {
            let message = params
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("agent reported an error")
                .to_string();
            let will_retry = params
                .get("willRetry")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if will_retry {
                TurnSignal::Event(AgentEvent::Notice {
                    key: format!("retry:{message}"),
                    body: format!("Retrying after error: {message}"),
                })
            } else {
                TurnSignal::Failed { message }
            }
        }
        methods::TURN_COMPLETED => {
            let turn = params.get("turn").unwrap_or(&Value::Null);
            let status = turn
                .get("status")
                .and_then(Value::as_str)
                .map(TurnStatus::from_provider)
                .unwrap_or(TurnStatus::Completed);
            let error = turn
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string);
            TurnSignal::Completed {
                turn_id: str_field(turn, "id").or_else(|| str_field(params, "turnId")),
                status,
                error,
            }
        }
        _ => TurnSignal::Ignored,
    }
}

/// True when a completion belongs to `key`. Only an explicit mismatch rejects.
pub fn completion_matches(key: &TurnKey, notification: &Notification) -> bool {
    let thread_ok = notification
        .thread_id()
        .is_none_or(|thread| thread == key.thread_id);
    let turn_ok = notification
        .turn_id()
        .is_none_or(|turn| turn == key.turn_id);
    thread_ok && turn_ok
}

fn delta(params: &Value) -> Option<String> {
    params
        .get("delta")
        .and_then(Value::as_str)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn item_type(item: &Value) -> Option<&str> {
    item.get("type").and_then(Value::as_str)
}

fn is_tool_item(item: &Value) -> bool {
    item_type(item).is_some_and(|t| TOOL_ITEM_TYPES.contains(&t))
}

fn item_started(item: &Value) -> Option<AgentEvent> {
    if !is_tool_item(item) {
        return None;
    }
    Some(AgentEvent::ToolStarted {
        call_id: str_field(item, "id")?,
        tool_name: tool_name(item),
        input: tool_input(item),
    })
}

fn item_completed(item: &Value) -> Option<AgentEvent> {
    match item_type(item)? {
        "agentMessage" => Some(AgentEvent::MessageCompleted {
            text: str_field(item, "text")?,
        }),
        "reasoning" => {
            let text = joined(item.get("summary")).or_else(|| joined(item.get("content")))?;
            Some(AgentEvent::ReasoningCompleted { text })
        }
        _ if is_tool_item(item) => {
            let status = match item.get("status").and_then(Value::as_str) {
                Some("declined") => ToolStatus::Denied,
                Some("failed") => ToolStatus::Errored,
                _ => ToolStatus::Completed,
            };
            let error = (status == ToolStatus::Errored).then(|| tool_error(item));
            Some(AgentEvent::ToolFinished {
                call_id: str_field(item, "id")?,
                tool_name: tool_name(item),
                input: tool_input(item),
                output: tool_output(item),
                status,
                error,
            })
        }
        _ => None,
    }
}

fn joined(parts: Option<&Value>) -> Option<String> {
    let text = parts?
        .as_array()?
        .iter()
        .filter_map(|part| part.as_str().or_else(|| part.get("text").and_then(Value::as_str)))
        .collect::<Vec<_>>()
        .join("\n");
    (!text.is_empty()).then_some(text)
}

fn tool_name(item: &Value) -> String {
    match item_type(item) {
        Some("mcpToolCall") => match (str_field(item, "server"), str_field(item, "tool")) {
            (Some(server), Some(tool)) => format!("{server}.{tool}"),
            _ => "mcpToolCall".to_string(),
        },
        Some(other) => other.to_string(),
        None => "tool".to_string(),
    }
}

/// Joins a command given either as a string or as argv.
pub fn command_string(value: &Value) -> Option<String> {
    match value.get("command") {
        Some(Value::String(text)) if !text.trim().is_empty() => Some(text.clone()),
        Some(Value::Array(parts)) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

fn tool_input(item: &Value) -> Value {
    match item_type(item) {
        Some("commandExecution") => json!({
            "command": command_string(item),
            "cwd": item.get("cwd"),
        }),
        Some("fileChange") => json!({ "changes": item.get("changes") }),
        Some("mcpToolCall") => item.get("arguments").cloned().unwrap_or(Value::Null),
        Some("webSearch") => json!({ "query": item.get("query") }),
        _ => Value::Null,
    }
}

fn tool_output(item: &Value) -> Value {
    match item_type(item) {
        Some("commandExecution") => {
            let aggregated = item.get("aggregatedOutput").and_then(Value::as_str);
            let exit_code = item.get("exitCode").and_then(Value::as_i64);
            if aggregated.is_none() && exit_code.is_none() {
                return Value::Null;
            }
            json!({ "output": aggregated.unwrap_or(""), "exitCode": exit_code })
        }
        Some("fileChange") => json!({ "changes": item.get("changes") }),
        Some("mcpToolCall") => item.get("result").cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn tool_error(item: &Value) -> String {
    if let Some(message) = item
        .get("error")
        .and_then(|e| e.get("message").or(Some(e)))
        .and_then(Value::as_str)
    {
        return message.to_string();
    }
    match item.get("exitCode").and_then(Value::as_i64) {
        Some(code) => format!("exited with code {code}"),
        None => "tool failed".to_string(),
    }
}

fn plan_notice(params: &Value) -> Option<AgentEvent> {
    let steps = params.get("plan")?.as_array()?;
    let mut body = String::from("Plan:");
    if let Some(explanation) = params.get("explanation").and_then(Value::as_str) {
        body.push(' ');
        body.push_str(explanation);
    }
    for step in steps {
        let text = step.get("step").and_then(Value::as_str).unwrap_or("");
        let mark = match step.get("status").and_then(Value::as_str) {
            Some("completed") => "[x]",
            Some("inProgress") => "[~]",
            _ => "[ ]",
        };
        body.push_str(&format!("\n{mark} {text}"));
    }
    Some(AgentEvent::Notice {
        key: format!("plan:{body}"),
        body,
    })
}

fn token_usage(params: &Value) -> Option<TokenUsage> {
    let usage = params.get("tokenUsage")?;
    let totals = usage.get("total").unwrap_or(usage);
    serde_json::from_value(totals.clone()).ok()
}

/// The parts of an approval request the engine acts on.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalPrompt {
    pub key: Option<TurnKey>,
    pub tool_name: String,
    pub tool_call_id: String,
    /// Command line or reason shown to the room.
    pub summary: Option<String>,
}

/// Parses an approval request. `None` when the method is not one.
pub fn parse_approval_request(request: &AgentRequest) -> Option<ApprovalPrompt> {
    let tool_name = match request.method.as_str() {
        methods::COMMAND_APPROVAL => "commandExecution",
        methods::FILE_CHANGE_APPROVAL => "fileChange",
        _ => return None,
    };
    let params = &request.params;
    let key = match (str_field(params, "threadId"), str_field(params, "turnId")) {
        (Some(thread), Some(turn)) => Some(TurnKey::new(thread, turn)),
        _ => None,
    };
    let tool_call_id = str_field(params, "itemId")
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| tool_name.to_string());
    let summary = command_string(params).or_else(|| str_field(params, "reason"));
    Some(ApprovalPrompt {
        key,
        tool_name: tool_name.to_string(),
        tool_call_id,
        summary,
    })
}

/// Wire answer for an approval request.
pub fn decision_response(approve: bool) -> Value {
    json!({ "decision": if approve { "accept" } else { "decline" } })
}
