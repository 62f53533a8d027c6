//! Stub adapters for offline runs.
//!
//! The real observation and egress adapters belong to the game-protocol
//! layer. These stand-ins let the control loop run headless: observations
//! replay a fixed script and world mutations are logged and acknowledged.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::errors::CoreResult;
use crate::domain::models::EvidenceBatch;
use crate::domain::ports::{ActionSink, ObservationProvider};

/// Action sink that acknowledges everything without touching a world.
pub struct NullActionSink;

#[async_trait]
impl ActionSink for NullActionSink {
    async fn submit(
        &self,
        action_type: &str,
        parameters: &serde_json::Value,
        _timeout: Duration,
    ) -> CoreResult<serde_json::Value> {
        tracing::info!(action_type, %parameters, "null sink acknowledged action");
        Ok(serde_json::json!({"acknowledged": action_type}))
    }
}

/// Observation provider replaying scripted batches by tick.
///
/// Ticks without a scripted batch observe an empty world.
pub struct ScriptedObservationProvider {
    batches: HashMap<u64, EvidenceBatch>,
}

impl ScriptedObservationProvider {
    pub fn new() -> Self {
        Self {
            batches: HashMap::new(),
        }
    }

    pub fn with_batch(mut self, batch: EvidenceBatch) -> Self {
        self.batches.insert(batch.tick_id, batch);
        self
    }
}

impl Default for ScriptedObservationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationProvider for ScriptedObservationProvider {
    async fn observe(&self, tick: u64) -> CoreResult<EvidenceBatch> {
        Ok(self
            .batches
            .get(&tick)
            .cloned()
            .unwrap_or_else(|| EvidenceBatch::new(tick)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::track::EvidenceItem;

    #[tokio::test]
    async fn test_scripted_provider_replays_and_defaults() {
        let provider = ScriptedObservationProvider::new().with_batch(EvidenceBatch::with_items(
            3,
            vec![EvidenceItem::new(1, "zombie", 3, 2)],
        ));
        let hit = provider.observe(3).await.unwrap();
        assert_eq!(hit.items.len(), 1);
        let miss = provider.observe(4).await.unwrap();
        assert!(miss.items.is_empty());
        assert_eq!(miss.tick_id, 4);
    }

    #[tokio::test]
    async fn test_null_sink_acknowledges() {
        let sink = NullActionSink;
        let result = sink
            .submit("dig", &serde_json::json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result["acknowledged"], "dig");
    }
}
