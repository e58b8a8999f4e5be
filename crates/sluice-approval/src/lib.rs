// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval registry for the Sluice turn engine.
//!
//! The agent subprocess blocks on a synchronous request until a human (or
//! the auto-approve policy) answers. Each outstanding request is a
//! [`PendingApproval`] with a one-shot decision slot and an expiry deadline.

pub mod decision;
pub mod error;
pub mod registry;

pub use decision::ApprovalDecision;
pub use error::ApprovalError;
pub use registry::{ApprovalRegistry, PendingApproval};
