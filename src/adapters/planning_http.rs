//! HTTP task history provider.
//!
//! Fetches recent tasks from the planning service at
//! `GET {endpoint_base}/tasks/recent?limit=N` and validates the response
//! against a strict schema. Non-2xx responses never schema-parse; they
//! produce `ok:false` snapshots with `source = planning_http` and a
//! truncated error.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::domain::models::task::{
    truncate_chars, HistorySnapshot, HistorySource, RecentTaskItem, TaskStatus, MAX_HISTORY_LIMIT,
    MAX_SUMMARY_LEN, MAX_TITLE_LEN,
};
use crate::services::task_history::TaskHistoryProvider;

/// Wire form of one recent task as served by the planning service.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRecentTask {
    id: uuid::Uuid,
    title: String,
    status: String,
    #[serde(default)]
    summary: Option<String>,
    best_updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    retry_count: u32,
}

/// Wire envelope: `{tasks: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRecentTasks {
    tasks: Vec<WireRecentTask>,
}

/// HTTP-backed history provider.
pub struct HttpTaskHistoryProvider {
    client: reqwest::Client,
    endpoint_base: String,
}

impl HttpTaskHistoryProvider {
    /// Build a provider against `endpoint_base` with a request timeout.
    pub fn new(endpoint_base: impl Into<String>, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint_base: endpoint_base.into(),
        })
    }

    fn convert(wire: WireRecentTask) -> RecentTaskItem {
        RecentTaskItem {
            id: wire.id,
            title: truncate_chars(&wire.title, MAX_TITLE_LEN),
            status: TaskStatus::from_str(&wire.status).unwrap_or(TaskStatus::Pending),
            summary: wire.summary.map(|s| truncate_chars(&s, MAX_SUMMARY_LEN)),
            best_updated_at: wire.best_updated_at,
            retry_count: wire.retry_count,
        }
    }
}

#[async_trait]
impl TaskHistoryProvider for HttpTaskHistoryProvider {
    async fn get_recent(&self, limit: usize) -> HistorySnapshot {
        let limit = limit.min(MAX_HISTORY_LIMIT);
        let url = format!("{}/tasks/recent?limit={limit}", self.endpoint_base);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "planning history request failed");
                return HistorySnapshot::failed(HistorySource::PlanningHttp, &err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return HistorySnapshot::failed(
                HistorySource::PlanningHttp,
                &format!("HTTP {status}: {body}"),
            );
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                return HistorySnapshot::failed(HistorySource::PlanningHttp, &err.to_string())
            }
        };
        match serde_json::from_str::<WireRecentTasks>(&body) {
            Ok(wire) => {
                let mut items: Vec<RecentTaskItem> =
                    wire.tasks.into_iter().map(Self::convert).collect();
                items.truncate(limit);
                HistorySnapshot {
                    ok: true,
                    source: HistorySource::PlanningHttp,
                    cache_hit: false,
                    items,
                    error: None,
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "planning history response failed validation");
                HistorySnapshot::failed(
                    HistorySource::PlanningHttp,
                    &format!("schema validation failed: {err}"),
                )
            }
        }
    }
}
