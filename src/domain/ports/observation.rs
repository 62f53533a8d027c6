//! Observation provider port.

use async_trait::async_trait;

use crate::domain::errors::CoreResult;
use crate::domain::models::EvidenceBatch;

/// Supplies raw perception batches to the controller, one per tick.
#[async_trait]
pub trait ObservationProvider: Send + Sync {
    /// Produce the evidence batch for `tick`.
    async fn observe(&self, tick: u64) -> CoreResult<EvidenceBatch>;
}
