//! Failure signature domain model.
//!
//! Failures are fingerprinted into stable signatures so the loop breaker can
//! detect the same failure recurring across distinct tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schema tag for the signature wire form.
pub const SIGNATURE_SCHEMA: &str = "failure_signature_v1";

/// Schema tag for loop-detection episodes.
pub const EPISODE_SCHEMA: &str = "loop_detected_episode_v1";

/// Broad classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Navigation,
    Acquisition,
    Crafting,
    Combat,
    Perception,
    Dispatch,
    External,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigation => "navigation",
            Self::Acquisition => "acquisition",
            Self::Crafting => "crafting",
            Self::Combat => "combat",
            Self::Perception => "perception",
            Self::Dispatch => "dispatch",
            Self::External => "external",
        }
    }
}

/// A content-addressed failure fingerprint.
///
/// `signature_id` is a hash over the normalized fields, so the same failure
/// shape always produces the same id no matter which task hit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignature {
    #[serde(rename = "_schema")]
    pub schema: String,
    pub signature_id: String,
    pub category: FailureCategory,
    /// Behavior leaf (or action family) that failed.
    pub leaf: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_param: Option<String>,
    pub diag_reason_code: String,
}

/// Normalized fields hashed into `signature_id`.
#[derive(Debug, Serialize)]
struct SignatureFields<'a> {
    category: &'a str,
    leaf: &'a str,
    target_param: Option<&'a str>,
    diag_reason_code: &'a str,
}

impl FailureSignature {
    /// Build a signature, deriving `signature_id` from the normalized
    /// fields. Leaf and reason code are trimmed and lowercased before
    /// hashing so cosmetic differences collapse to one signature.
    pub fn new(
        category: FailureCategory,
        leaf: &str,
        target_param: Option<&str>,
        diag_reason_code: &str,
    ) -> Self {
        let leaf = leaf.trim().to_lowercase();
        let diag_reason_code = diag_reason_code.trim().to_lowercase();
        let target_param = target_param.map(|p| p.trim().to_lowercase());

        let fields = SignatureFields {
            category: category.as_str(),
            leaf: &leaf,
            target_param: target_param.as_deref(),
            diag_reason_code: &diag_reason_code,
        };
        let signature_id = crate::services::canonical::content_digest16(&fields);

        Self {
            schema: SIGNATURE_SCHEMA.to_string(),
            signature_id,
            category,
            leaf,
            target_param,
            diag_reason_code,
        }
    }
}

/// Per-task identity attached to a recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureAttribution {
    pub task_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl FailureAttribution {
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            run_id: None,
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

/// Episode emitted when a signature repeats across enough distinct tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopEpisode {
    #[serde(rename = "_schema")]
    pub schema: String,
    pub signature: FailureSignature,
    pub occurrences: u64,
    pub contributing_task_ids: Vec<Uuid>,
    pub contributing_run_ids: Vec<Uuid>,
    pub detected_at: DateTime<Utc>,
    pub suppressed_until: DateTime<Utc>,
    pub shadow_mode: bool,
}
