// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// Why a decision could not be delivered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("approval id is required")]
    MissingId,

    #[error("no pending approval with id {0}")]
    Unknown(String),

    #[error("approval {0} has expired")]
    Expired(String),

    #[error("approval {0} was already handled")]
    AlreadyHandled(String),
}
