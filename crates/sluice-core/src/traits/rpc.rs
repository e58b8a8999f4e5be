// SPDX-FileCopyrightText: 2026 Sluice Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote-call side of the agent subprocess connection.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SluiceError;

/// Issues calls to the agent subprocess.
///
/// Framing and call-id correlation belong to the implementation. Requests
/// the subprocess sends back are delivered to the engine's request handler,
/// and notifications arrive on the stream handed to the router.
#[async_trait]
pub trait AgentRpc: Send + Sync + 'static {
    /// Sends `method` with `params` and waits at most `timeout` for the result.
    async fn call(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, SluiceError>;
}
