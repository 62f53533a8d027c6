//! Task history domain model.
//!
//! The history surface summarizes recent tasks for prompt construction.
//! Everything emitted toward prompts is bounded: titles truncate at 120
//! characters, summaries at 200.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum items a history snapshot may carry.
pub const MAX_HISTORY_LIMIT: usize = 50;

/// Maximum title length in prompt-safe projections.
pub const MAX_TITLE_LEN: usize = 120;

/// Maximum summary length in prompt-safe projections.
pub const MAX_SUMMARY_LEN: usize = 200;

/// Status of a task in the history surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Paused,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" | "running" => Some(Self::Active),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "paused" => Some(Self::Paused),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One step inside a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    pub label: String,
    pub done: bool,
}

/// Task bookkeeping timestamps and retry state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_error: Option<String>,
}

impl TaskMetadata {
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            updated_at: created_at,
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            solver: None,
            failure_code: None,
            failure_error: None,
        }
    }
}

/// A task as seen by the history provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub steps: Vec<TaskStep>,
    pub metadata: TaskMetadata,
}

impl Task {
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        status: TaskStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            status,
            steps: Vec::new(),
            metadata: TaskMetadata::new(created_at),
        }
    }

    /// Best-known update instant, for recency sorting.
    pub fn best_updated_at(&self) -> DateTime<Utc> {
        self.metadata
            .completed_at
            .into_iter()
            .chain(self.metadata.started_at)
            .chain(std::iter::once(self.metadata.updated_at))
            .max()
            .unwrap_or(self.metadata.created_at)
    }
}

/// Truncate a string to `max` characters for prompt safety.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

/// Prompt-safe projection of one recent task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTaskItem {
    pub id: Uuid,
    /// Truncated to 120 characters.
    pub title: String,
    pub status: TaskStatus,
    /// Truncated to 200 characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub best_updated_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl From<&Task> for RecentTaskItem {
    fn from(task: &Task) -> Self {
        let summary = task
            .metadata
            .failure_error
            .as_deref()
            .or(task.metadata.solver.as_deref())
            .map(|s| truncate_chars(s, MAX_SUMMARY_LEN));
        Self {
            id: task.id,
            title: truncate_chars(&task.title, MAX_TITLE_LEN),
            status: task.status,
            summary,
            best_updated_at: task.best_updated_at(),
            retry_count: task.metadata.retry_count,
        }
    }
}

/// Where a history snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// No source was attempted (null provider).
    None,
    /// In-process task source.
    Direct,
    /// Planning service over HTTP.
    PlanningHttp,
}

impl HistorySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Direct => "direct",
            Self::PlanningHttp => "planning_http",
        }
    }
}

/// Bounded, provenance-carrying history snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    pub ok: bool,
    /// The source that was attempted, even on failure.
    pub source: HistorySource,
    pub cache_hit: bool,
    pub items: Vec<RecentTaskItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistorySnapshot {
    /// Empty, successful snapshot from the null provider.
    pub fn empty() -> Self {
        Self {
            ok: true,
            source: HistorySource::None,
            cache_hit: false,
            items: Vec::new(),
            error: None,
        }
    }

    /// Failed snapshot with a truncated error and honest provenance.
    pub fn failed(source: HistorySource, error: &str) -> Self {
        Self {
            ok: false,
            source,
            cache_hit: false,
            items: Vec::new(),
            error: Some(truncate_chars(error, MAX_SUMMARY_LEN)),
        }
    }
}
