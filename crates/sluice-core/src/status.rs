// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turn lifecycle state machine.
//!
//! ```text
//! Starting ──► Running ──► Completed | Failed | Timeout | Interrupted
//!    │
//!    └──────► Failed | Interrupted
//! ```
//!
//! Terminal states accept no further transition. The terminal state of a
//! turn is also the `finishReason` carried by its `finish` event.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::SluiceError;

/// Lifecycle state of one turn.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurnStatus {
    /// The start call has been issued.
    Starting,
    /// The start call returned and the mailbox is being drained.
    Running,
    Completed,
    Failed,
    Timeout,
    Interrupted,
}

impl TurnStatus {
    /// Returns true for the four outcome states.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TurnStatus::Completed
                | TurnStatus::Failed
                | TurnStatus::Timeout
                | TurnStatus::Interrupted
        )
    }

    /// The transition table.
    pub fn can_transition_to(self, next: TurnStatus) -> bool {
        use TurnStatus::*;
        match (self, next) {
            (Starting, Running | Failed | Interrupted) => true,
            (Running, Completed | Failed | Timeout | Interrupted) => true,
            _ => false,
        }
    }

    /// Moves to `next`, rejecting transitions the table does not allow.
    pub fn transition(self, next: TurnStatus) -> Result<TurnStatus, SluiceError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(SluiceError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Maps a provider-reported turn status string onto a terminal state.
    ///
    /// Unrecognized strings are treated as a normal completion.
    pub fn from_provider(status: &str) -> TurnStatus {
        match status {
            "failed" => TurnStatus::Failed,
            "interrupted" => TurnStatus::Interrupted,
            _ => TurnStatus::Completed,
        }
    }
}
