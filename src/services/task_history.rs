//! Task history provider.
//!
//! Bounded, cache-coherent recent-task summaries with provenance. Three
//! provider implementations exist: direct (in-process task source), HTTP
//! (planning service adapter), and null (safe default). A single-version
//! in-memory cache sits in front of whichever provider is configured.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::models::config::TaskHistoryConfig;
use crate::domain::models::task::{
    HistorySnapshot, HistorySource, RecentTaskItem, Task, MAX_HISTORY_LIMIT,
};
use crate::domain::ports::TaskSource;

/// Provider interface for recent-task snapshots.
///
/// Implementations must record honest provenance: `source` reflects the
/// attempted source even on failure, never `none` when an attempt occurred.
#[async_trait]
pub trait TaskHistoryProvider: Send + Sync {
    /// Fetch up to `limit` recent tasks (clamped to the global maximum).
    async fn get_recent(&self, limit: usize) -> HistorySnapshot;
}

/// Sort and project tasks into a bounded, prompt-safe item list.
///
/// Stable sort: `best_updated_at desc, id desc` as the tie-break.
pub fn project_recent(tasks: &[Task], limit: usize) -> Vec<RecentTaskItem> {
    let mut items: Vec<RecentTaskItem> = tasks.iter().map(RecentTaskItem::from).collect();
    items.sort_by(|a, b| {
        b.best_updated_at
            .cmp(&a.best_updated_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    items.truncate(limit.min(MAX_HISTORY_LIMIT));
    items
}

/// Safe default provider: no source, no items, always ok.
pub struct NullTaskHistoryProvider;

#[async_trait]
impl TaskHistoryProvider for NullTaskHistoryProvider {
    async fn get_recent(&self, _limit: usize) -> HistorySnapshot {
        HistorySnapshot::empty()
    }
}

/// Direct provider wrapping an in-process [`TaskSource`].
pub struct DirectTaskHistoryProvider {
    source: Arc<dyn TaskSource>,
}

impl DirectTaskHistoryProvider {
    pub fn new(source: Arc<dyn TaskSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl TaskHistoryProvider for DirectTaskHistoryProvider {
    async fn get_recent(&self, limit: usize) -> HistorySnapshot {
        let limit = limit.min(MAX_HISTORY_LIMIT);
        match self.source.recent_tasks(limit).await {
            Ok(tasks) => HistorySnapshot {
                ok: true,
                source: HistorySource::Direct,
                cache_hit: false,
                items: project_recent(&tasks, limit),
                error: None,
            },
            Err(err) => HistorySnapshot::failed(HistorySource::Direct, &err.to_string()),
        }
    }
}

/// Cached snapshot plus its expiry.
struct CacheSlot {
    snapshot: HistorySnapshot,
    limit: usize,
    fetched_at: DateTime<Utc>,
}

/// Single-version caching front for a history provider.
pub struct TaskHistoryService {
    config: TaskHistoryConfig,
    provider: Arc<dyn TaskHistoryProvider>,
    cache: Mutex<Option<CacheSlot>>,
}

impl TaskHistoryService {
    pub fn new(config: TaskHistoryConfig, provider: Arc<dyn TaskHistoryProvider>) -> Self {
        Self {
            config,
            provider,
            cache: Mutex::new(None),
        }
    }

    /// Recent tasks through the cache.
    ///
    /// A hit returns the cached snapshot with `cache_hit = true`; failed
    /// snapshots are never cached.
    pub async fn get_recent(&self, limit: usize) -> HistorySnapshot {
        self.get_recent_at(limit, Utc::now()).await
    }

    /// Cache-aware fetch at an explicit instant (injectable for tests).
    pub async fn get_recent_at(&self, limit: usize, now: DateTime<Utc>) -> HistorySnapshot {
        let limit = limit.min(self.config.max_limit).min(MAX_HISTORY_LIMIT);
        let ttl = Duration::milliseconds(i64::try_from(self.config.ttl_ms).unwrap_or(i64::MAX));

        {
            let cache = self.cache.lock().await;
            if let Some(slot) = cache.as_ref() {
                if slot.limit == limit && now - slot.fetched_at < ttl {
                    let mut snapshot = slot.snapshot.clone();
                    snapshot.cache_hit = true;
                    return snapshot;
                }
            }
        }

        let snapshot = self.provider.get_recent(limit).await;
        if snapshot.ok {
            let mut cache = self.cache.lock().await;
            *cache = Some(CacheSlot {
                snapshot: snapshot.clone(),
                limit,
                fetched_at: now,
            });
        }
        snapshot
    }

    /// Drop the cached version.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.lock().await;
        *cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{CoreError, CoreResult};
    use crate::domain::models::task::TaskStatus;
    use uuid::Uuid;

    struct FixedSource {
        tasks: Vec<Task>,
    }

    #[async_trait]
    impl TaskSource for FixedSource {
        async fn recent_tasks(&self, limit: usize) -> CoreResult<Vec<Task>> {
            Ok(self.tasks.iter().take(limit).cloned().collect())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl TaskSource for BrokenSource {
        async fn recent_tasks(&self, _limit: usize) -> CoreResult<Vec<Task>> {
            Err(CoreError::transport("task store unreachable"))
        }
    }

    fn task_at(seconds_ago: i64) -> Task {
        let created = Utc::now() - Duration::seconds(seconds_ago);
        Task::new(Uuid::new_v4(), format!("task {seconds_ago}"), TaskStatus::Completed, created)
    }

    #[test]
    fn test_projection_sorts_desc_with_id_tiebreak() {
        let newest = task_at(1);
        let oldest = task_at(100);
        let same_a = task_at(50);
        let mut same_b = task_at(50);
        // Force an exact timestamp tie.
        same_b.metadata.updated_at = same_a.metadata.updated_at;
        same_b.metadata.created_at = same_a.metadata.created_at;

        let items = project_recent(
            &[oldest.clone(), same_a.clone(), newest.clone(), same_b.clone()],
            10,
        );
        assert_eq!(items[0].id, newest.id);
        assert_eq!(items[3].id, oldest.id);
        // Tie broken by id desc.
        let tie_ids: Vec<Uuid> = items[1..3].iter().map(|i| i.id).collect();
        let mut expected = vec![same_a.id, same_b.id];
        expected.sort();
        expected.reverse();
        assert_eq!(tie_ids, expected);
    }

    #[test]
    fn test_projection_clamps_limit() {
        let tasks: Vec<Task> = (0..80).map(task_at).collect();
        let items = project_recent(&tasks, 500);
        assert_eq!(items.len(), MAX_HISTORY_LIMIT);
    }

    #[tokio::test]
    async fn test_null_provider() {
        let snapshot = NullTaskHistoryProvider.get_recent(10).await;
        assert!(snapshot.ok);
        assert_eq!(snapshot.source, HistorySource::None);
        assert!(snapshot.items.is_empty());
    }

    #[tokio::test]
    async fn test_direct_provider_success_and_failure() {
        let provider = DirectTaskHistoryProvider::new(Arc::new(FixedSource {
            tasks: vec![task_at(1), task_at(2)],
        }));
        let snapshot = provider.get_recent(10).await;
        assert!(snapshot.ok);
        assert_eq!(snapshot.source, HistorySource::Direct);
        assert_eq!(snapshot.items.len(), 2);

        let broken = DirectTaskHistoryProvider::new(Arc::new(BrokenSource));
        let snapshot = broken.get_recent(10).await;
        assert!(!snapshot.ok);
        // Provenance still names the attempted source.
        assert_eq!(snapshot.source, HistorySource::Direct);
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let service = TaskHistoryService::new(
            TaskHistoryConfig::default(),
            Arc::new(DirectTaskHistoryProvider::new(Arc::new(FixedSource {
                tasks: vec![task_at(1)],
            }))),
        );
        let now = Utc::now();

        let first = service.get_recent_at(10, now).await;
        assert!(!first.cache_hit);

        let second = service.get_recent_at(10, now + Duration::milliseconds(100)).await;
        assert!(second.cache_hit);
        assert_eq!(second.items, first.items);

        // Past the TTL the cache misses again.
        let third = service.get_recent_at(10, now + Duration::milliseconds(5_001)).await;
        assert!(!third.cache_hit);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let service = TaskHistoryService::new(
            TaskHistoryConfig::default(),
            Arc::new(DirectTaskHistoryProvider::new(Arc::new(BrokenSource))),
        );
        let now = Utc::now();
        let first = service.get_recent_at(10, now).await;
        assert!(!first.ok);
        let second = service.get_recent_at(10, now).await;
        assert!(!second.cache_hit);
    }

    #[tokio::test]
    async fn test_limit_change_bypasses_cache() {
        let service = TaskHistoryService::new(
            TaskHistoryConfig::default(),
            Arc::new(DirectTaskHistoryProvider::new(Arc::new(FixedSource {
                tasks: (0..20).map(task_at).collect(),
            }))),
        );
        let now = Utc::now();
        service.get_recent_at(10, now).await;
        let different = service.get_recent_at(5, now).await;
        assert!(!different.cache_hit);
        assert_eq!(different.items.len(), 5);
    }
}
