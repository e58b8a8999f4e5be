// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide account state fed by `account/*` notifications.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sluice_core::Notification;
use sluice_core::types::methods;
use tracing::{debug, info, warn};

/// Latest account information reported by the agent subprocess.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    /// `apikey`, `chatgpt`, or `None` when logged out.
    pub auth_mode: Option<String>,
    pub login_succeeded: Option<bool>,
    pub login_error: Option<String>,
    pub rate_limits: Option<Value>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared account state. Notifications without turn correlation land here.
#[derive(Debug, Default)]
pub struct AccountState {
    inner: Mutex<AccountSnapshot>,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one notification in. Returns `false` for methods it does not know.
    pub fn apply(&self, notification: &Notification) -> bool {
        let params = &notification.params;
        let mut snapshot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        match notification.method.as_str() {
            methods::ACCOUNT_UPDATED => {
                snapshot.auth_mode = params
                    .get("authMode")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                info!(auth_mode = ?snapshot.auth_mode, "account updated");
            }
            methods::ACCOUNT_LOGIN_COMPLETED => {
                let success = params
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                snapshot.login_succeeded = Some(success);
                snapshot.login_error = params
                    .get("error")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if success {
                    info!("account login completed");
                } else {
                    warn!(error = ?snapshot.login_error, "account login failed");
                }
            }
            methods::ACCOUNT_RATE_LIMITS_UPDATED => {
                snapshot.rate_limits = Some(
                    params
                        .get("rateLimits")
                        .cloned()
                        .unwrap_or_else(|| params.clone()),
                );
                debug!("rate limits updated");
            }
            other => {
                debug!(method = other, "ignoring unknown account notification");
                return false;
            }
        }

        snapshot.updated_at = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
