//! External reasoning service port.
//!
//! The acquisition solver delegates search to an external deterministic
//! reasoner. The payload is canonicalized before transmission so the bundle
//! id is a pure function of the inputs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::CoreResult;

/// Search statistics reported by the reasoner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveMetrics {
    #[serde(default)]
    pub nodes_expanded: u64,
    #[serde(default)]
    pub frontier_peak: u64,
}

/// Response from one reasoner solve call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolveResponse {
    pub solution_found: bool,
    #[serde(default)]
    pub solution_path: Vec<String>,
    #[serde(default)]
    pub discovered_nodes: Vec<String>,
    #[serde(default)]
    pub search_edges: Vec<(String, String)>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<SolveMetrics>,
}

/// Port for the external reasoning service.
///
/// `solve` carries a deadline set by the caller; expiry surfaces as
/// [`crate::domain::errors::CoreError::DeadlineExceeded`].
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Run one bounded search in `domain` over the canonicalized payload.
    async fn solve(&self, domain: &str, payload: &serde_json::Value) -> CoreResult<SolveResponse>;

    /// Cheap availability probe.
    async fn is_available(&self) -> bool;
}
