//! In-process task source port.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::Task;

/// Source of recent tasks for the direct history provider.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// Most recent tasks, newest first, at most `limit`.
    async fn recent_tasks(&self, limit: usize) -> CoreResult<Vec<Task>>;
}
