// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, the collaborator traits, and tests.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::status::TurnStatus;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a chat room on the room platform.
    RoomId
);
string_id!(
    /// Provider-assigned conversation thread identifier.
    ThreadId
);
string_id!(
    /// Provider-assigned turn identifier. Only unique within its thread.
    TurnId
);
string_id!(
    /// Identifier of a message delivered by the chat transport.
    MessageId
);

/// Identity of one turn. Lookups are always by the full pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnKey {
    pub thread_id: ThreadId,
    pub turn_id: TurnId,
}

impl TurnKey {
    pub fn new(thread_id: impl Into<ThreadId>, turn_id: impl Into<TurnId>) -> Self {
        Self {
            thread_id: thread_id.into(),
            turn_id: turn_id.into(),
        }
    }
}

impl fmt::Display for TurnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.thread_id, self.turn_id)
    }
}

/// Method names of the agent subprocess protocol that the engine reacts to.
pub mod methods {
    pub const THREAD_START: &str = "thread/start";
    pub const TURN_START: &str = "turn/start";
    pub const TURN_INTERRUPT: &str = "turn/interrupt";

    pub const TURN_STARTED: &str = "turn/started";
    pub const TURN_COMPLETED: &str = "turn/completed";
    pub const TURN_PLAN_UPDATED: &str = "turn/plan/updated";
    pub const TURN_DIFF_UPDATED: &str = "turn/diff/updated";
    pub const TOKEN_USAGE_UPDATED: &str = "thread/tokenUsage/updated";
    pub const ERROR: &str = "error";

    pub const ITEM_STARTED: &str = "item/started";
    pub const ITEM_COMPLETED: &str = "item/completed";
    pub const AGENT_MESSAGE_DELTA: &str = "item/agentMessage/delta";
    pub const REASONING_SUMMARY_DELTA: &str = "item/reasoning/summaryTextDelta";
    pub const REASONING_TEXT_DELTA: &str = "item/reasoning/textDelta";
    pub const COMMAND_OUTPUT_DELTA: &str = "item/commandExecution/outputDelta";
    pub const FILE_CHANGE_OUTPUT_DELTA: &str = "item/fileChange/outputDelta";

    pub const COMMAND_APPROVAL: &str = "item/commandExecution/requestApproval";
    pub const FILE_CHANGE_APPROVAL: &str = "item/fileChange/requestApproval";

    pub const ACCOUNT_UPDATED: &str = "account/updated";
    pub const ACCOUNT_LOGIN_COMPLETED: &str = "account/login/completed";
    pub const ACCOUNT_RATE_LIMITS_UPDATED: &str = "account/rateLimits/updated";
}

/// An unsolicited event from the agent subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// `params.threadId`, when present.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.params
            .get("threadId")
            .and_then(Value::as_str)
            .map(ThreadId::from)
    }

    /// `params.turnId`, falling back to `params.turn.id`.
    pub fn turn_id(&self) -> Option<TurnId> {
        self.params
            .get("turnId")
            .and_then(Value::as_str)
            .or_else(|| {
                self.params
                    .get("turn")
                    .and_then(|turn| turn.get("id"))
                    .and_then(Value::as_str)
            })
            .map(TurnId::from)
    }

    /// The correlation pair, if both halves are present.
    pub fn turn_key(&self) -> Option<TurnKey> {
        Some(TurnKey {
            thread_id: self.thread_id()?,
            turn_id: self.turn_id()?,
        })
    }

    /// Terminal kinds get the router's stronger delivery guarantees.
    pub fn is_terminal(&self) -> bool {
        self.method == methods::TURN_COMPLETED || self.method == methods::ERROR
    }

    /// Account-level notifications carry no turn correlation.
    pub fn is_process_wide(&self) -> bool {
        self.method.starts_with("account/")
    }
}

/// A synchronous request issued by the agent subprocess (approval prompts).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Provider-issued request id, used as the approval id.
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Running token totals reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub cached_input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub reasoning_output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// How a tool invocation ended.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ToolStatus {
    Completed,
    Denied,
    Errored,
}

/// Persisted summary of one tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub input: Value,
    pub output: Value,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Turn-scoped access level. `Full` bypasses the human approval wait.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum AccessLevel {
    ReadOnly,
    #[default]
    Workspace,
    Full,
}

impl AccessLevel {
    /// Sandbox mode handed to the provider when a thread is started.
    pub fn sandbox_mode(self) -> &'static str {
        match self {
            AccessLevel::ReadOnly => "read-only",
            AccessLevel::Workspace => "workspace-write",
            AccessLevel::Full => "danger-full-access",
        }
    }

    pub fn is_elevated(self) -> bool {
        self == AccessLevel::Full
    }
}

/// When the provider should ask for approval before acting.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApprovalPolicy {
    Untrusted,
    OnFailure,
    #[default]
    OnRequest,
    Never,
}

/// Presentation of a visible message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MessageKind {
    /// A regular reply.
    Text,
    /// A system notice (approval prompts, plan updates, retries).
    Notice,
}

/// A message received from a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub room: RoomId,
    pub sender: String,
    pub body: String,
}

/// The persisted conversation entity backing one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub room: RoomId,
    /// Provider thread reused across the room's turns, once started.
    pub thread_id: Option<ThreadId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(room: RoomId) -> Self {
        let now = Utc::now();
        Self {
            room,
            thread_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Canonical persisted summary of a finished turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub room: RoomId,
    pub thread_id: Option<ThreadId>,
    pub turn_id: Option<TurnId>,
    pub model: String,
    pub message_id: Option<MessageId>,
    pub finish_reason: TurnStatus,
    pub error: Option<String>,
    pub usage: TokenUsage,
    pub tool_calls: Vec<ToolCallRecord>,
    pub reasoning: String,
    pub started_at: DateTime<Utc>,
    pub first_token_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_extracts_flat_correlation() {
        let n = Notification::new(
            methods::AGENT_MESSAGE_DELTA,
            json!({"threadId": "th_1", "turnId": "turn_1", "delta": "hi"}),
        );
        assert_eq!(n.turn_key(), Some(TurnKey::new("th_1", "turn_1")));
        assert!(!n.is_terminal());
    }

    #[test]
    fn notification_falls_back_to_nested_turn_id() {
        let n = Notification::new(
            methods::TURN_COMPLETED,
            json!({"threadId": "th_1", "turn": {"id": "turn_9", "status": "completed"}}),
        );
        assert_eq!(n.turn_id(), Some(TurnId::from("turn_9")));
        assert!(n.is_terminal());
    }

    #[test]
    fn account_notifications_are_process_wide() {
        let n = Notification::new(methods::ACCOUNT_UPDATED, json!({"authMode": "chatgpt"}));
        assert!(n.is_process_wide());
        assert!(n.turn_key().is_none());
    }

    #[test]
    fn token_usage_parses_camel_case_with_missing_fields() {
        let usage: TokenUsage =
            serde_json::from_value(json!({"inputTokens": 12, "outputTokens": 3})).unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn access_level_parses_kebab_case() {
        use std::str::FromStr;
        assert_eq!(AccessLevel::from_str("full").unwrap(), AccessLevel::Full);
        assert_eq!(
            AccessLevel::from_str("read-only").unwrap(),
            AccessLevel::ReadOnly
        );
        assert!(AccessLevel::Full.is_elevated());
        assert_eq!(AccessLevel::Workspace.sandbox_mode(), "workspace-write");
    }

    #[test]
    fn turn_key_display() {
        assert_eq!(TurnKey::new("a", "b").to_string(), "a/b");
    }
}
