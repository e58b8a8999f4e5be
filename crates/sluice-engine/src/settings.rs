// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine settings resolved from [`SluiceConfig`].

use std::time::Duration;

use sluice_config::SluiceConfig;
use sluice_core::{AccessLevel, ApprovalPolicy};

use crate::router::RouterSettings;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_model: String,
    pub cwd: String,
    pub approval_policy: ApprovalPolicy,
    pub access_level: AccessLevel,
    pub start_timeout: Duration,
    pub interrupt_timeout: Duration,
    pub idle_timeout: Duration,
    pub mailbox_capacity: usize,
    pub edit_throttle: Duration,
    pub routing: RouterSettings,
    pub approval_ttl: Duration,
    pub command_prefix: String,
}

impl From<&SluiceConfig> for EngineSettings {
    fn from(config: &SluiceConfig) -> Self {
        Self {
            default_model: config.codex.default_model.clone(),
            cwd: config.codex.cwd.clone(),
            approval_policy: config.codex.approval_policy,
            access_level: config.codex.access_level,
            start_timeout: config.codex.start_timeout(),
            interrupt_timeout: config.codex.interrupt_timeout(),
            idle_timeout: config.turn.idle_timeout(),
            mailbox_capacity: config.turn.mailbox_capacity,
            edit_throttle: config.turn.edit_throttle(),
            routing: RouterSettings::from(&config.routing),
            approval_ttl: config.approval.ttl(),
            command_prefix: config.approval.command_prefix.clone(),
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&SluiceConfig::default())
    }
}
