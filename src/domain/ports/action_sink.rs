//! World egress port.
//!
//! The single world-mutating boundary. Only the execution gateway calls
//! `submit`; the drift-guard test scans the source tree for violations.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::errors::CoreResult;

/// Low-level world mutation egress.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Submit one typed action to the world and await its result.
    async fn submit(
        &self,
        action_type: &str,
        parameters: &serde_json::Value,
        timeout: Duration,
    ) -> CoreResult<serde_json::Value>;
}
