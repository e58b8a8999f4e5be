// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat commands that answer pending approvals.
//!
//! `<prefix>approve <id> [reason]` and `<prefix>deny <id> [reason]`.

/// A parsed approval command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalCommand {
    Approve { id: String, reason: Option<String> },
    Deny { id: String, reason: Option<String> },
}

impl ApprovalCommand {
    pub fn id(&self) -> &str {
        match self {
            Self::Approve { id, .. } | Self::Deny { id, .. } => id,
        }
    }
}

/// Parses `body` as an approval command.
///
/// Returns `None` for anything that is not one, so the caller can treat it
/// as a prompt. An approve/deny verb with no id yields an empty id, which
/// the registry rejects as missing.
pub fn parse_command(body: &str, prefix: &str) -> Option<ApprovalCommand> {
    let rest = body.trim().strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let verb = parts.next()?.to_ascii_lowercase();
    let args = parts.next().unwrap_or("").trim();

    let (id, reason) = match args.split_once(char::is_whitespace) {
        Some((id, reason)) => (id.to_string(), Some(reason.trim().to_string())),
        None => (args.to_string(), None),
    };
    let reason = reason.filter(|r| !r.is_empty());

    match verb.as_str() {
        "approve" | "accept" => Some(ApprovalCommand::Approve { id, reason }),
        "deny" | "decline" => Some(ApprovalCommand::Deny { id, reason }),
        _ => None,
    }
}
