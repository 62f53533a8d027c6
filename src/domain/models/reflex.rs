//! Reflex domain model.
//!
//! Threat assessments are derived from belief snapshots by a pure reader;
//! the arbitrator consumes them to drive the priority-override lifecycle.

use serde::{Deserialize, Serialize};

use super::track::{ThreatLevel, TrackId};

/// Emergency action recommended by the safety reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    None,
    Shield,
    Evade,
    Flee,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shield => "shield",
            Self::Evade => "evade",
            Self::Flee => "flee",
        }
    }
}

/// One threatening track surfaced by the reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatSummary {
    pub track_id: TrackId,
    pub class_label: String,
    pub threat_level: ThreatLevel,
    pub dist_bucket: u8,
}

/// Output of the safety reader for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub has_critical_threat: bool,
    pub threats: Vec<ThreatSummary>,
    pub recommended_action: RecommendedAction,
}

impl ThreatAssessment {
    /// Assessment for a snapshot with no qualifying threats.
    pub fn clear() -> Self {
        Self {
            has_critical_threat: false,
            threats: Vec::new(),
            recommended_action: RecommendedAction::None,
        }
    }
}

/// Severity of a reflex entry; selects the override duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflexSeverity {
    Default,
    High,
    Critical,
}

impl Default for ReflexSeverity {
    fn default() -> Self {
        Self::Default
    }
}

/// Lifecycle event emitted by the arbitrator.
///
/// `Enter` precedes any `Tick`; `Exit` occurs exactly once per entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReflexEvent {
    ReflexEnter {
        reason: String,
        severity: ReflexSeverity,
        remaining_ticks: u64,
    },
    ReflexTick { remaining_ticks: u64 },
    ReflexExit { reason: String },
}
