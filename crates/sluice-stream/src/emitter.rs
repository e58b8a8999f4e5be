// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Translation of [`AgentEvent`]s into the canonical stream.
//!
//! The functions here hold no state of their own. Everything they need to
//! stay idempotent lives in the [`StreamingState`] they are handed:
//!
//! - text and reasoning blocks open lazily and close exactly once
//! - `tool-input-start` and the final tool output appear at most once per call
//! - completion backfill is ignored once deltas populated the accumulator
//! - notices are deduplicated by key
//! - nothing is emitted after [`finish`]

use chrono::Utc;
use serde_json::{Value, json};
use sluice_core::{StreamEvent, ToolCallRecord, ToolStatus, TurnStatus};
use tracing::debug;

use crate::event::AgentEvent;
use crate::state::{StreamingState, ToolProgress};

const TEXT_PREFIX: &str = "txt";
const REASONING_PREFIX: &str = "rsn";

/// What one [`AgentEvent`] produced.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Emission {
    /// Canonical events to publish, in order.
    pub events: Vec<StreamEvent>,
    /// A notice body that was not sent before in this turn.
    pub notice: Option<String>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.notice.is_none()
    }
}

/// `start` and `start-step`, the first time only.
pub fn begin(state: &mut StreamingState) -> Vec<StreamEvent> {
    if state.started || state.finalized {
        return Vec::new();
    }
    state.started = true;
    vec![StreamEvent::start(state.message_id.clone()), StreamEvent::StartStep]
}

/// Applies one event to the accumulator and returns what to publish.
pub fn apply(state: &mut StreamingState, event: AgentEvent) -> Emission {
    if state.finalized {
        debug!(message_id = %state.message_id, event = ?event, "event after finish ignored");
        return Emission::default();
    }

    let mut events = Vec::new();
    let mut notice = None;

    match event {
        AgentEvent::TextDelta { delta } => push_text(state, &delta, &mut events),
        AgentEvent::MessageCompleted { text } => {
            if state.text.is_empty() {
                push_text(state, &text, &mut events);
            }
        }
        AgentEvent::ReasoningDelta { delta, summary } => {
            push_reasoning(state, &delta, summary, &mut events)
        }
        AgentEvent::ReasoningCompleted { text } => {
            if state.reasoning.is_empty() {
                let summary = state.summary_seen;
                push_reasoning(state, &text, summary, &mut events);
            }
        }
        AgentEvent::ToolStarted {
            call_id,
            tool_name,
            input,
        } => {
            start_tool(state, &call_id, &tool_name, input, &mut events);
        }
        AgentEvent::ToolOutputDelta {
            call_id,
            tool_name,
            delta,
        } => {
            start_tool(state, &call_id, &tool_name, Value::Null, &mut events);
            if let Some(progress) = state.tools.get_mut(&call_id)
                && !progress.finalized
            {
                progress.output.push_str(&delta);
                let so_far = Value::String(progress.output.clone());
                events.push(StreamEvent::tool_output(call_id, so_far, true));
            }
        }
        AgentEvent::ToolFinished {
            call_id,
            tool_name,
            input,
            output,
            status,
            error,
        } => {
            finish_tool(
                state,
                FinishedTool {
                    call_id,
                    tool_name,
                    input,
                    output,
                    status,
                    error,
                },
                &mut events,
            );
        }
        AgentEvent::Notice { key, body } => {
            if state.notices.insert(key) {
                notice = Some(body);
            }
        }
        AgentEvent::Usage(usage) => {
            state.usage = usage;
            with_begin(state, &mut events);
            events.push(StreamEvent::metadata(json!({ "usage": usage })));
        }
    }

    Emission { events, notice }
}

/// Closes open blocks and emits the terminal sequence, once.
///
/// Produces `[text-end] [reasoning-end] [error] finish-step finish`. A turn
/// that never started still gets a well-formed `start` prefix.
pub fn finish(
    state: &mut StreamingState,
    status: TurnStatus,
    error: Option<&str>,
) -> Vec<StreamEvent> {
    if state.finalized {
        return Vec::new();
    }

    let mut events = begin(state);
    close_text(state, &mut events);
    close_reasoning(state, &mut events);
    if let Some(message) = error {
        events.push(StreamEvent::error(message));
    }

    let completed_at = Utc::now();
    state.completed_at = Some(completed_at);
    state.finalized = true;

    events.push(StreamEvent::FinishStep);
    events.push(StreamEvent::finish(status, Some(finish_metadata(state))));
    events
}

/// Metadata attached to `finish`: usage and timing.
pub fn finish_metadata(state: &StreamingState) -> Value {
    json!({
        "usage": state.usage,
        "startedAt": state.started_at,
        "firstTokenAt": state.first_token_at,
        "completedAt": state.completed_at,
    })
}

fn with_begin(state: &mut StreamingState, events: &mut Vec<StreamEvent>) {
    events.extend(begin(state));
}

fn push_text(state: &mut StreamingState, delta: &str, events: &mut Vec<StreamEvent>) {
    if delta.is_empty() {
        return;
    }
    with_begin(state, events);
    close_reasoning(state, events);

    let id = match &state.open_text {
        Some(id) => id.clone(),
        None => {
            let id = state.next_block_id(TEXT_PREFIX);
            events.push(StreamEvent::text_start(id.clone()));
            state.open_text = Some(id.clone());
            id
        }
    };
    events.push(StreamEvent::text_delta(id, delta));
    state.text.push_str(delta);
    state.mark_first_token();
}

fn push_reasoning(
    state: &mut StreamingState,
    delta: &str,
    summary: bool,
    events: &mut Vec<StreamEvent>,
) {
    if delta.is_empty() || (!summary && state.summary_seen) {
        return;
    }
    with_begin(state, events);

    if summary && !state.summary_seen {
        // Raw reasoning streamed so far is superseded by the summary.
        state.summary_seen = true;
        close_reasoning(state, events);
        state.reasoning.clear();
    }

    let id = match &state.open_reasoning {
        Some(id) => id.clone(),
        None => {
            let id = state.next_block_id(REASONING_PREFIX);
            events.push(StreamEvent::reasoning_start(id.clone()));
            state.open_reasoning = Some(id.clone());
            id
        }
    };
    events.push(StreamEvent::reasoning_delta(id, delta));
    state.reasoning.push_str(delta);
    state.mark_first_token();
}

fn close_text(state: &mut StreamingState, events: &mut Vec<StreamEvent>) {
    if let Some(id) = state.open_text.take() {
        events.push(StreamEvent::text_end(id));
    }
}

fn close_reasoning(state: &mut StreamingState, events: &mut Vec<StreamEvent>) {
    if let Some(id) = state.open_reasoning.take() {
        events.push(StreamEvent::reasoning_end(id));
    }
}

/// Emits `tool-input-start` and `tool-input-available` unless already seen.
fn start_tool(
    state: &mut StreamingState,
    call_id: &str,
    tool_name: &str,
    input: Value,
    events: &mut Vec<StreamEvent>,
) {
    if state.tools.contains_key(call_id) {
        return;
    }
    with_begin(state, events);
    close_text(state, events);
    close_reasoning(state, events);

    events.push(StreamEvent::tool_input_start(call_id, tool_name));
    events.push(StreamEvent::tool_input_available(
        call_id,
        tool_name,
        input.clone(),
    ));
    state.tools.insert(
        call_id.to_string(),
        ToolProgress {
            tool_name: tool_name.to_string(),
            input,
            output: String::new(),
            started_at: Utc::now(),
            finalized: false,
        },
    );
}

struct FinishedTool {
    call_id: String,
    tool_name: String,
    input: Value,
    output: Value,
    status: ToolStatus,
    error: Option<String>,
}

fn finish_tool(state: &mut StreamingState, tool: FinishedTool, events: &mut Vec<StreamEvent>) {
    start_tool(
        state,
        &tool.call_id,
        &tool.tool_name,
        tool.input.clone(),
        events,
    );
    let Some(progress) = state.tools.get_mut(&tool.call_id) else {
        return;
    };
    if progress.finalized {
        debug!(call_id = %tool.call_id, "duplicate tool completion ignored");
        return;
    }
    progress.finalized = true;

    let input = if tool.input.is_null() {
        progress.input.clone()
    } else {
        tool.input
    };
    let output = if tool.output.is_null() && !progress.output.is_empty() {
        Value::String(progress.output.clone())
    } else {
        tool.output
    };
    let record = ToolCallRecord {
        call_id: tool.call_id.clone(),
        tool_name: progress.tool_name.clone(),
        input,
        output: output.clone(),
        status: tool.status,
        error: tool.error.clone(),
        started_at: progress.started_at,
        completed_at: Utc::now(),
    };

    events.push(match tool.status {
        ToolStatus::Completed => StreamEvent::tool_output(tool.call_id, output, false),
        ToolStatus::Denied => StreamEvent::tool_denied(tool.call_id),
        ToolStatus::Errored => StreamEvent::tool_error(
            tool.call_id,
            tool.error.unwrap_or_else(|| "tool failed".to_string()),
        ),
    });
    state.tool_calls.push(record);
}
