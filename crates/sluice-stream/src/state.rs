// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-turn streaming accumulator.
//!
//! Owned by exactly one turn task and mutated only through the emitter, so
//! it carries no synchronization of its own.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sluice_core::{TokenUsage, ToolCallRecord};

/// Lifecycle flags and partial data of one tool call.
#[derive(Debug, Clone)]
pub(crate) struct ToolProgress {
    pub(crate) tool_name: String,
    pub(crate) input: Value,
    pub(crate) output: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finalized: bool,
}

#[derive(Debug)]
pub struct StreamingState {
    pub(crate) message_id: String,
    pub(crate) started: bool,
    pub(crate) finalized: bool,

    pub(crate) text: String,
    pub(crate) reasoning: String,
    pub(crate) summary_seen: bool,

    pub(crate) open_text: Option<String>,
    pub(crate) open_reasoning: Option<String>,
    pub(crate) block_counter: u32,

    pub(crate) tool_calls: Vec<ToolCallRecord>,
    pub(crate) tools: HashMap<String, ToolProgress>,
    pub(crate) notices: HashSet<String>,

    pub(crate) usage: TokenUsage,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) first_token_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
}

impl StreamingState {
    /// Creates the accumulator for the assistant message `message_id`.
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            started: false,
            finalized: false,
            text: String::new(),
            reasoning: String::new(),
            summary_seen: false,
            open_text: None,
            open_reasoning: None,
            block_counter: 0,
            tool_calls: Vec::new(),
            tools: HashMap::new(),
            notices: HashSet::new(),
            usage: TokenUsage::default(),
            started_at: Utc::now(),
            first_token_at: None,
            completed_at: None,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Visible text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Tool calls in resolution order.
    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn first_token_at(&self) -> Option<DateTime<Utc>> {
        self.first_token_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Id of the open text block, if any.
    pub fn open_text_block(&self) -> Option<&str> {
        self.open_text.as_deref()
    }

    pub fn open_reasoning_block(&self) -> Option<&str> {
        self.open_reasoning.as_deref()
    }

    pub(crate) fn next_block_id(&mut self, prefix: &str) -> String {
        let id = format!("{prefix}_{}", self.block_counter);
        self.block_counter += 1;
        id
    }

    pub(crate) fn mark_first_token(&mut self) {
        if self.first_token_at.is_none() {
            self.first_token_at = Some(Utc::now());
        }
    }
}
