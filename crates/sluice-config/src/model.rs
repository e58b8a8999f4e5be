// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a mistyped key is an
//! error at startup rather than a silently ignored setting.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sluice_core::{AccessLevel, ApprovalPolicy};

/// Top-level Sluice configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SluiceConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Agent subprocess settings.
    #[serde(default)]
    pub codex: CodexConfig,

    /// Turn lifecycle settings.
    #[serde(default)]
    pub turn: TurnConfig,

    /// Notification routing settings.
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Human approval settings.
    #[serde(default)]
    pub approval: ApprovalConfig,
}

/// Process identity and logging.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name, also used in the log filter.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "sluice".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Agent subprocess settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CodexConfig {
    /// Model requested when a room does not ask for one.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Working directory handed to `thread/start`.
    #[serde(default = "default_cwd")]
    pub cwd: String,

    #[serde(default)]
    pub approval_policy: ApprovalPolicy,

    /// Default access level for new turns. `full` auto-approves.
    #[serde(default)]
    pub access_level: AccessLevel,

    /// Deadline for `thread/start` and `turn/start`.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    /// Deadline for the best-effort `turn/interrupt`.
    #[serde(default = "default_interrupt_timeout_secs")]
    pub interrupt_timeout_secs: u64,
}

impl Default for CodexConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            cwd: default_cwd(),
            approval_policy: ApprovalPolicy::default(),
            access_level: AccessLevel::default(),
            start_timeout_secs: default_start_timeout_secs(),
            interrupt_timeout_secs: default_interrupt_timeout_secs(),
        }
    }
}

impl CodexConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn interrupt_timeout(&self) -> Duration {
        Duration::from_secs(self.interrupt_timeout_secs)
    }
}

fn default_model() -> String {
    "gpt-5-codex".to_string()
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_start_timeout_secs() -> u64 {
    30
}

fn default_interrupt_timeout_secs() -> u64 {
    5
}

/// Turn lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TurnConfig {
    /// A running turn with no event for this long times out.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Bounded mailbox size per turn.
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Minimum spacing between edits of the visible reply.
    #[serde(default = "default_edit_throttle_ms")]
    pub edit_throttle_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            mailbox_capacity: default_mailbox_capacity(),
            edit_throttle_ms: default_edit_throttle_ms(),
        }
    }
}

impl TurnConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn edit_throttle(&self) -> Duration {
        Duration::from_millis(self.edit_throttle_ms)
    }
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_mailbox_capacity() -> usize {
    256
}

fn default_edit_throttle_ms() -> u64 {
    1500
}

/// Notification routing settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// How many times a terminal notification re-checks for its mailbox.
    #[serde(default = "default_terminal_retry_attempts")]
    pub terminal_retry_attempts: u32,

    #[serde(default = "default_terminal_retry_interval_ms")]
    pub terminal_retry_interval_ms: u64,

    /// Bound on the blocking send used for terminal events on a full mailbox.
    #[serde(default = "default_terminal_send_timeout_ms")]
    pub terminal_send_timeout_ms: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            terminal_retry_attempts: default_terminal_retry_attempts(),
            terminal_retry_interval_ms: default_terminal_retry_interval_ms(),
            terminal_send_timeout_ms: default_terminal_send_timeout_ms(),
        }
    }
}

impl RoutingConfig {
    pub fn terminal_retry_interval(&self) -> Duration {
        Duration::from_millis(self.terminal_retry_interval_ms)
    }

    pub fn terminal_send_timeout(&self) -> Duration {
        Duration::from_millis(self.terminal_send_timeout_ms)
    }
}

fn default_terminal_retry_attempts() -> u32 {
    20
}

fn default_terminal_retry_interval_ms() -> u64 {
    50
}

fn default_terminal_send_timeout_ms() -> u64 {
    2000
}

/// Human approval settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApprovalConfig {
    /// Lifetime of an outstanding approval.
    #[serde(default = "default_approval_ttl_secs")]
    pub ttl_secs: u64,

    /// Prefix of the `approve` / `deny` chat commands.
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_approval_ttl_secs(),
            command_prefix: default_command_prefix(),
        }
    }
}

impl ApprovalConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_approval_ttl_secs() -> u64 {
    600
}

fn default_command_prefix() -> String {
    "!".to_string()
}
