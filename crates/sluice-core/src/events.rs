// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canonical streaming event vocabulary delivered to rooms.
//!
//! Events serialize with a kebab-case `type` tag and camelCase payload keys,
//! e.g. `{"type":"text-delta","id":"text_item_1","delta":"Hel"}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::TurnStatus;
use crate::types::TurnId;

/// One unit of the outward UI protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// Beginning of the assistant message for a turn.
    Start {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    StartStep,

    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },

    ReasoningStart {
        id: String,
    },
    ReasoningDelta {
        id: String,
        delta: String,
    },
    ReasoningEnd {
        id: String,
    },

    ToolInputStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },
    ToolInputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },
    /// Tool output; `preliminary` outputs are superseded by the final one.
    ToolOutputAvailable {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        output: Value,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        preliminary: bool,
    },
    ToolOutputDenied {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },
    ToolOutputError {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "errorText")]
        error_text: String,
    },
    ToolApprovalRequest {
        #[serde(rename = "approvalId")]
        approval_id: String,
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
    },

    FinishStep,
    Finish {
        #[serde(rename = "finishReason")]
        finish_reason: TurnStatus,
        #[serde(rename = "messageMetadata", skip_serializing_if = "Option::is_none")]
        message_metadata: Option<Value>,
    },
    Error {
        #[serde(rename = "errorText")]
        error_text: String,
    },
    MessageMetadata {
        #[serde(rename = "messageMetadata")]
        message_metadata: Value,
    },
}

impl StreamEvent {
    pub fn start(message_id: impl Into<String>) -> Self {
        Self::Start {
            message_id: message_id.into(),
        }
    }

    pub fn text_start(id: impl Into<String>) -> Self {
        Self::TextStart { id: id.into() }
    }

    pub fn text_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    pub fn text_end(id: impl Into<String>) -> Self {
        Self::TextEnd { id: id.into() }
    }

    pub fn reasoning_start(id: impl Into<String>) -> Self {
        Self::ReasoningStart { id: id.into() }
    }

    pub fn reasoning_delta(id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::ReasoningDelta {
            id: id.into(),
            delta: delta.into(),
        }
    }

    pub fn reasoning_end(id: impl Into<String>) -> Self {
        Self::ReasoningEnd { id: id.into() }
    }

    pub fn tool_input_start(tool_call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self::ToolInputStart {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_input_available(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolInputAvailable {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn tool_output(tool_call_id: impl Into<String>, output: Value, preliminary: bool) -> Self {
        Self::ToolOutputAvailable {
            tool_call_id: tool_call_id.into(),
            output,
            preliminary,
        }
    }

    pub fn tool_denied(tool_call_id: impl Into<String>) -> Self {
        Self::ToolOutputDenied {
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn tool_error(tool_call_id: impl Into<String>, error_text: impl Into<String>) -> Self {
        Self::ToolOutputError {
            tool_call_id: tool_call_id.into(),
            error_text: error_text.into(),
        }
    }

    pub fn approval_request(approval_id: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self::ToolApprovalRequest {
            approval_id: approval_id.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    pub fn finish(finish_reason: TurnStatus, message_metadata: Option<Value>) -> Self {
        Self::Finish {
            finish_reason,
            message_metadata,
        }
    }

    pub fn error(error_text: impl Into<String>) -> Self {
        Self::Error {
            error_text: error_text.into(),
        }
    }

    pub fn metadata(message_metadata: Value) -> Self {
        Self::MessageMetadata { message_metadata }
    }

    /// The serialized `type` tag, used in logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::StartStep => "start-step",
            Self::TextStart { .. } => "text-start",
            Self::TextDelta { .. } => "text-delta",
            Self::TextEnd { .. } => "text-end",
            Self::ReasoningStart { .. } => "reasoning-start",
            Self::ReasoningDelta { .. } => "reasoning-delta",
            Self::ReasoningEnd { .. } => "reasoning-end",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputDenied { .. } => "tool-output-denied",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::ToolApprovalRequest { .. } => "tool-approval-request",
            Self::FinishStep => "finish-step",
            Self::Finish { .. } => "finish",
            Self::Error { .. } => "error",
            Self::MessageMetadata { .. } => "message-metadata",
        }
    }
}

/// Ephemeral envelope carrying one event for one turn.
///
/// `seq` is strictly increasing per turn so receivers can detect gaps and
/// reordering; `txn_id` is derived from the turn id and `seq`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEnvelope {
    pub txn_id: String,
    pub turn_id: TurnId,
    pub seq: u64,
    pub event: StreamEvent,
}

impl StreamEnvelope {
    pub fn new(turn_id: TurnId, seq: u64, event: StreamEvent) -> Self {
        Self {
            txn_id: format!("{turn_id}:{seq}"),
            turn_id,
            seq,
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta_wire_shape() {
        let v = serde_json::to_value(StreamEvent::text_delta("t1", "Hel")).unwrap();
        assert_eq!(v, json!({"type": "text-delta", "id": "t1", "delta": "Hel"}));
    }

    #[test]
    fn final_tool_output_omits_preliminary_flag() {
        let v = serde_json::to_value(StreamEvent::tool_output("c1", json!("ok"), false)).unwrap();
        assert_eq!(
            v,
            json!({"type": "tool-output-available", "toolCallId": "c1", "output": "ok"})
        );
        let v = serde_json::to_value(StreamEvent::tool_output("c1", json!("o"), true)).unwrap();
        assert_eq!(v["preliminary"], json!(true));
    }

    #[test]
    fn finish_carries_reason_and_metadata() {
        let v = serde_json::to_value(StreamEvent::finish(
            TurnStatus::Timeout,
            Some(json!({"usage": {"inputTokens": 1}})),
        ))
        .unwrap();
        assert_eq!(v["type"], "finish");
        assert_eq!(v["finishReason"], "timeout");
        assert_eq!(v["messageMetadata"]["usage"]["inputTokens"], 1);
    }

    #[test]
    fn approval_request_wire_shape() {
        let v = serde_json::to_value(StreamEvent::approval_request("123", "item_1")).unwrap();
        assert_eq!(
            v,
            json!({"type": "tool-approval-request", "approvalId": "123", "toolCallId": "item_1"})
        );
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let events = [
            StreamEvent::start("m"),
            StreamEvent::StartStep,
            StreamEvent::reasoning_end("r"),
            StreamEvent::tool_denied("c"),
            StreamEvent::FinishStep,
            StreamEvent::metadata(json!({})),
        ];
        for event in events {
            let v = serde_json::to_value(&event).unwrap();
            assert_eq!(v["type"], event.kind());
        }
    }

    #[test]
    fn envelope_txn_id_derives_from_turn_and_seq() {
        let env = StreamEnvelope::new(TurnId::from("turn_1"), 7, StreamEvent::StartStep);
        assert_eq!(env.txn_id, "turn_1:7");
    }
}
