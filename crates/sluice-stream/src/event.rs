// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider-neutral turn events consumed by the emitter.

use serde_json::Value;
use sluice_core::{TokenUsage, ToolStatus};

/// One parsed, turn-scoped event from the agent subprocess.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Incremental visible text.
    TextDelta { delta: String },

    /// Incremental reasoning. `summary` deltas win over raw ones for the
    /// rest of the turn once the first is seen.
    ReasoningDelta { delta: String, summary: bool },

    /// Full text of a finished assistant message, used only as backfill.
    MessageCompleted { text: String },

    /// Full reasoning of a finished reasoning item, used only as backfill.
    ReasoningCompleted { text: String },

    ToolStarted {
        call_id: String,
        tool_name: String,
        input: Value,
    },

    /// Streamed tool output, surfaced as preliminary output.
    ToolOutputDelta {
        call_id: String,
        tool_name: String,
        delta: String,
    },

    ToolFinished {
        call_id: String,
        tool_name: String,
        input: Value,
        output: Value,
        status: ToolStatus,
        error: Option<String>,
    },

    /// A system notice. `key` dedups it within the turn.
    Notice { key: String, body: String },

    /// Running token totals.
    Usage(TokenUsage),
}
