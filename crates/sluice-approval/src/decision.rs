// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use chrono::{DateTime, Utc};

/// An immutable answer to one approval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalDecision {
    approve: bool,
    reason: Option<String>,
    decided_at: DateTime<Utc>,
    decided_by: String,
}

impl ApprovalDecision {
    pub fn approve(decided_by: impl Into<String>) -> Self {
        Self::new(true, decided_by)
    }

    pub fn deny(decided_by: impl Into<String>) -> Self {
        Self::new(false, decided_by)
    }

    fn new(approve: bool, decided_by: impl Into<String>) -> Self {
        Self {
            approve,
            reason: None,
            decided_at: Utc::now(),
            decided_by: decided_by.into(),
        }
    }

    /// Attaches a free-form reason. Blank reasons are dropped.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let trimmed = reason.trim();
        self.reason = (!trimmed.is_empty()).then(|| trimmed.to_string());
        self
    }

    pub fn is_approved(&self) -> bool {
        self.approve
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn decided_at(&self) -> DateTime<Utc> {
        self.decided_at
    }

    pub fn decided_by(&self) -> &str {
        &self.decided_by
    }
}
