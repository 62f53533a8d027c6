//! Acquisition domain model.
//!
//! The acquisition solver selects how to obtain a target item from the
//! current world context. Contexts are bucketed coarsely on purpose so that
//! learned priors generalize: small positional wiggles must not change the
//! context key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::track::{distance_to_bucket, DistBucket};

/// Candidate action family for obtaining an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Loot,
    Mine,
    Salvage,
    Trade,
}

impl Strategy {
    /// All families in lexicographic order.
    pub const ALL: [Self; 4] = [Self::Loot, Self::Mine, Self::Salvage, Self::Trade];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loot => "loot",
            Self::Mine => "mine",
            Self::Salvage => "salvage",
            Self::Trade => "trade",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a candidate's preconditions were met at enumeration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    Available,
    Unknown,
}

/// A nearby entity as seen by the acquisition layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyEntity {
    pub kind: String,
    /// Raw distance; bucketed before entering the context.
    pub distance: Option<f64>,
}

impl NearbyEntity {
    pub fn new(kind: impl Into<String>, distance: f64) -> Self {
        Self {
            kind: kind.into(),
            distance: Some(distance),
        }
    }
}

/// Raw observation fed to the solver. This is the pre-bucketing view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionObservation {
    pub target_item: String,
    /// Item name to count. Capability markers use a `cap:` prefix.
    pub inventory: BTreeMap<String, u64>,
    pub nearby_blocks: Vec<String>,
    pub nearby_entities: Vec<NearbyEntity>,
}

impl AcquisitionObservation {
    pub fn new(target_item: impl Into<String>) -> Self {
        Self {
            target_item: target_item.into(),
            inventory: BTreeMap::new(),
            nearby_blocks: Vec::new(),
            nearby_entities: Vec::new(),
        }
    }

    pub fn inventory_count(&self, item: &str) -> u64 {
        self.inventory.get(item).copied().unwrap_or(0)
    }

    /// Nearest raw distance to an entity of `kind`.
    pub fn nearest_distance(&self, kind: &str) -> Option<f64> {
        self.nearby_entities
            .iter()
            .filter(|e| e.kind == kind)
            .filter_map(|e| e.distance)
            .fold(None, |best, d| match best {
                Some(b) if b <= d => Some(b),
                _ => Some(d),
            })
    }
}

/// Bucketed context — the basis of prior reuse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AcquisitionContext {
    pub target_item: String,
    pub ore_nearby: bool,
    pub villager_trade_available: bool,
    /// 0 = none, 1 = one, 2 = several.
    pub known_chest_count_bucket: u8,
    pub dist_bucket_villager: DistBucket,
    pub dist_bucket_chest: DistBucket,
    pub dist_bucket_ore: DistBucket,
    /// Deterministic digest over sorted inventory entries.
    pub inventory_hash: String,
    pub tool_tier_cap: Option<String>,
}

impl AcquisitionContext {
    /// Deterministic string key. Two observations with identical buckets
    /// yield the same key regardless of raw entity identity.
    pub fn context_key(&self) -> String {
        format!(
            "item={}|ore={}|villager={}|chests={}|dv={}|dc={}|do={}|inv={}|tool={}",
            self.target_item,
            u8::from(self.ore_nearby),
            u8::from(self.villager_trade_available),
            self.known_chest_count_bucket,
            self.dist_bucket_villager,
            self.dist_bucket_chest,
            self.dist_bucket_ore,
            self.inventory_hash,
            self.tool_tier_cap.as_deref().unwrap_or("none"),
        )
    }
}

/// Bucket a chest count: 0, 1, or "several".
pub fn chest_count_to_bucket(count: usize) -> u8 {
    match count {
        0 => 0,
        1 => 1,
        _ => 2,
    }
}

/// Re-export of the shared distance bucketing for solver callers.
pub fn bucket_distance(distance: Option<f64>) -> DistBucket {
    distance_to_bucket(distance)
}

/// One enumerated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub strategy: Strategy,
    pub item: String,
    pub estimated_cost: u64,
    pub feasibility: Feasibility,
    /// Preconditions this candidate depends on, e.g. `"tool:stone_pickaxe"`.
    pub requires: Vec<String>,
    pub context_snapshot: AcquisitionContext,
}

/// A candidate with its deterministic rank score attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: StrategyCandidate,
    /// `estimated_cost * (1 - prior) + tie_bias`, fixed-point micros.
    pub score_micros: u64,
    pub prior_success_rate: f64,
}

/// Success-rate priors keyed by `(strategy, context_key)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriorStore {
    entries: BTreeMap<String, PriorEntry>,
}

/// Outcome counts for one `(strategy, context_key)` pair.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PriorEntry {
    pub successes: u64,
    pub attempts: u64,
}

/// Neutral prior used when a pair has never been observed.
pub const NEUTRAL_PRIOR: f64 = 0.5;

impl PriorStore {
    fn key(strategy: Strategy, context_key: &str) -> String {
        format!("{}::{}", strategy.as_str(), context_key)
    }

    /// Look up the success rate, falling back to the neutral default.
    pub fn success_rate(&self, strategy: Strategy, context_key: &str) -> f64 {
        match self.entries.get(&Self::key(strategy, context_key)) {
            Some(entry) if entry.attempts > 0 => {
                #[allow(clippy::cast_precision_loss)]
                let rate = entry.successes as f64 / entry.attempts as f64;
                rate
            }
            _ => NEUTRAL_PRIOR,
        }
    }

    /// Record an attempt outcome for a pair.
    pub fn record(&mut self, strategy: Strategy, context_key: &str, success: bool) {
        let entry = self
            .entries
            .entry(Self::key(strategy, context_key))
            .or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of one acquisition solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionSolution {
    /// Content hash of the canonicalized reasoner payload.
    pub bundle_id: String,
    /// 16-hex digest over the canonicalized ranked candidate list.
    pub candidate_set_digest: String,
    pub ranked: Vec<RankedCandidate>,
    /// Chosen candidate, when the reasoner (or fallback) picked one.
    pub chosen: Option<StrategyCandidate>,
    /// Set when the reasoner failed and the fallback candidate was used.
    pub used_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_lexicographic_order() {
        let mut names: Vec<&str> = Strategy::ALL.iter().map(Strategy::as_str).collect();
        let sorted = {
            let mut s = names.clone();
            s.sort_unstable();
            s
        };
        assert_eq!(names, sorted);
        names.reverse();
        assert_ne!(names, sorted);
    }

    #[test]
    fn test_chest_count_bucketing() {
        assert_eq!(chest_count_to_bucket(0), 0);
        assert_eq!(chest_count_to_bucket(1), 1);
        assert_eq!(chest_count_to_bucket(2), 2);
        assert_eq!(chest_count_to_bucket(17), 2);
    }

    #[test]
    fn test_context_key_ignores_raw_wiggle() {
        let base = AcquisitionContext {
            target_item: "iron_ingot".to_string(),
            ore_nearby: true,
            villager_trade_available: true,
            known_chest_count_bucket: 1,
            dist_bucket_villager: bucket_distance(Some(10.0)),
            dist_bucket_chest: 2,
            dist_bucket_ore: 1,
            inventory_hash: "abcd".to_string(),
            tool_tier_cap: Some("stone".to_string()),
        };
        let wiggled = AcquisitionContext {
            dist_bucket_villager: bucket_distance(Some(15.0)),
            ..base.clone()
        };
        assert_eq!(base.context_key(), wiggled.context_key());

        let moved = AcquisitionContext {
            dist_bucket_villager: bucket_distance(Some(20.0)),
            ..base.clone()
        };
        assert_ne!(base.context_key(), moved.context_key());
    }

    #[test]
    fn test_prior_store_neutral_default() {
        let store = PriorStore::default();
        assert!((store.success_rate(Strategy::Mine, "k") - NEUTRAL_PRIOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_prior_store_updates() {
        let mut store = PriorStore::default();
        store.record(Strategy::Mine, "k", true);
        store.record(Strategy::Mine, "k", true);
        store.record(Strategy::Mine, "k", false);
        let rate = store.success_rate(Strategy::Mine, "k");
        assert!((rate - 2.0 / 3.0).abs() < 1e-9);
        // Other strategies under the same key are unaffected.
        assert!((store.success_rate(Strategy::Trade, "k") - NEUTRAL_PRIOR).abs() < f64::EPSILON);
    }

    #[test]
    fn test_nearest_distance() {
        let mut obs = AcquisitionObservation::new("iron_ingot");
        obs.nearby_entities.push(NearbyEntity::new("villager", 25.0));
        obs.nearby_entities.push(NearbyEntity::new("villager", 10.0));
        obs.nearby_entities.push(NearbyEntity::new("chest", 40.0));
        assert_eq!(obs.nearest_distance("villager"), Some(10.0));
        assert_eq!(obs.nearest_distance("chest"), Some(40.0));
        assert_eq!(obs.nearest_distance("cow"), None);
    }
}
