// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks that serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::SluiceConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validates a deserialized configuration, collecting every failure.
pub fn validate_config(config: &SluiceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        fail(format!(
            "agent.log_level `{}` must be one of: {}",
            config.agent.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.codex.default_model.trim().is_empty() {
        fail("codex.default_model must not be empty".to_string());
    }
    if config.codex.cwd.trim().is_empty() {
        fail("codex.cwd must not be empty".to_string());
    }

    let positive = [
        ("codex.start_timeout_secs", config.codex.start_timeout_secs),
        ("codex.interrupt_timeout_secs", config.codex.interrupt_timeout_secs),
        ("turn.idle_timeout_secs", config.turn.idle_timeout_secs),
        ("routing.terminal_retry_interval_ms", config.routing.terminal_retry_interval_ms),
        ("routing.terminal_send_timeout_ms", config.routing.terminal_send_timeout_ms),
        ("approval.ttl_secs", config.approval.ttl_secs),
    ];
    for (key, value) in positive {
        if value == 0 {
            fail(format!("{key} must be greater than zero"));
        }
    }

    if config.turn.mailbox_capacity == 0 {
        fail("turn.mailbox_capacity must be greater than zero".to_string());
    }
    if config.routing.terminal_retry_attempts == 0 {
        fail("routing.terminal_retry_attempts must be greater than zero".to_string());
    }

    let prefix = &config.approval.command_prefix;
    if prefix.is_empty() {
        fail("approval.command_prefix must not be empty".to_string());
    } else if prefix.chars().any(char::is_whitespace) {
        fail(format!(
            "approval.command_prefix `{prefix}` must not contain whitespace"
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
