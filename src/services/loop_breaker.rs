//! Loop breaker for repeated failure signatures.
//!
//! Observes failures tagged with a signature and per-task identity, detects
//! the same signature recurring across distinct tasks inside a sliding
//! window, and suppresses the signature to stop thrashing. In shadow mode
//! episodes are emitted but nothing is suppressed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::models::config::LoopBreakerConfig;
use crate::domain::models::signature::{
    FailureAttribution, FailureSignature, LoopEpisode, EPISODE_SCHEMA,
};

/// One failure occurrence inside the detection window.
#[derive(Debug, Clone)]
struct Occurrence {
    task_id: Uuid,
    run_id: Option<Uuid>,
    at: DateTime<Utc>,
}

/// Per-signature detection state.
#[derive(Debug, Clone)]
struct SignatureWindow {
    signature: FailureSignature,
    occurrences: Vec<Occurrence>,
    suppressed_until: Option<DateTime<Utc>>,
    last_touched: DateTime<Utc>,
}

/// Detects signature repetition across tasks and suppresses thrashing.
pub struct LoopBreaker {
    config: LoopBreakerConfig,
    windows: HashMap<String, SignatureWindow>,
    episodes_emitted: u64,
}

impl LoopBreaker {
    pub fn new(config: LoopBreakerConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
            episodes_emitted: 0,
        }
    }

    /// Record a failure occurrence at the current wall-clock instant.
    pub fn record_failure(
        &mut self,
        signature: &FailureSignature,
        attribution: &FailureAttribution,
    ) -> Option<LoopEpisode> {
        self.record_failure_at(signature, attribution, Utc::now())
    }

    /// Record a failure at an explicit instant.
    ///
    /// Dedups by `(signature_id, task_id)` within the window; occurrences
    /// count across distinct task ids. Reaching the threshold emits exactly
    /// one episode and resets the window so detection does not re-fire
    /// immediately.
    pub fn record_failure_at(
        &mut self,
        signature: &FailureSignature,
        attribution: &FailureAttribution,
        now: DateTime<Utc>,
    ) -> Option<LoopEpisode> {
        self.evict_if_full(&signature.signature_id, now);

        let window = self
            .windows
            .entry(signature.signature_id.clone())
            .or_insert_with(|| SignatureWindow {
                signature: signature.clone(),
                occurrences: Vec::new(),
                suppressed_until: None,
                last_touched: now,
            });
        window.last_touched = now;

        // Expire occurrences that slid out of the window.
        let window_start = now - Duration::milliseconds(i64::try_from(self.config.window_ms).unwrap_or(i64::MAX));
        window.occurrences.retain(|o| o.at > window_start);

        // Dedup: one occurrence per task inside the window.
        if window
            .occurrences
            .iter()
            .any(|o| o.task_id == attribution.task_id)
        {
            return None;
        }

        window.occurrences.push(Occurrence {
            task_id: attribution.task_id,
            run_id: attribution.run_id,
            at: now,
        });

        let occurrences = window.occurrences.len() as u64;
        if occurrences < self.config.threshold {
            return None;
        }

        let suppressed_until = now
            + Duration::milliseconds(
                i64::try_from(self.config.suppression_ttl_ms).unwrap_or(i64::MAX),
            );
        let episode = LoopEpisode {
            schema: EPISODE_SCHEMA.to_string(),
            signature: window.signature.clone(),
            occurrences,
            contributing_task_ids: window.occurrences.iter().map(|o| o.task_id).collect(),
            contributing_run_ids: window
                .occurrences
                .iter()
                .filter_map(|o| o.run_id)
                .collect(),
            detected_at: now,
            suppressed_until,
            shadow_mode: self.config.shadow_mode,
        };

        // Reset the window; suppression (when not shadowed) outlives it.
        window.occurrences.clear();
        if !self.config.shadow_mode {
            window.suppressed_until = Some(suppressed_until);
        }
        self.episodes_emitted += 1;
        tracing::warn!(
            signature_id = %episode.signature.signature_id,
            occurrences = episode.occurrences,
            shadow = episode.shadow_mode,
            "loop detected"
        );
        Some(episode)
    }

    /// Whether a signature is currently suppressed.
    pub fn is_suppressed(&self, signature_id: &str) -> bool {
        self.is_suppressed_at(signature_id, Utc::now())
    }

    /// Suppression check at an explicit instant.
    pub fn is_suppressed_at(&self, signature_id: &str, now: DateTime<Utc>) -> bool {
        self.windows
            .get(signature_id)
            .and_then(|w| w.suppressed_until)
            .is_some_and(|until| now < until)
    }

    /// Lift a suppression manually.
    pub fn clear_suppression(&mut self, signature_id: &str) {
        if let Some(window) = self.windows.get_mut(signature_id) {
            window.suppressed_until = None;
        }
    }

    /// Total episodes emitted over the breaker's lifetime.
    pub fn episodes_emitted(&self) -> u64 {
        self.episodes_emitted
    }

    /// Number of tracked signatures.
    pub fn tracked_signatures(&self) -> usize {
        self.windows.len()
    }

    /// Evict the least-recently-touched signature when at capacity and a
    /// new signature arrives.
    fn evict_if_full(&mut self, incoming_id: &str, _now: DateTime<Utc>) {
        if self.windows.contains_key(incoming_id) || self.windows.len() < self.config.max_signatures
        {
            return;
        }
        let oldest = self
            .windows
            .iter()
            .min_by_key(|(_, w)| w.last_touched)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            tracing::debug!(signature_id = %id, "evicting least-recently-touched signature");
            self.windows.remove(&id);
        }
    }
}
