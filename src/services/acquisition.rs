//! Acquisition solver.
//!
//! Selects how to obtain a target item from the current world context,
//! given four strategy families: mine, trade, loot, salvage. Contexts are
//! bucketed before anything else so learned priors generalize, and every
//! identity this module emits (context key, bundle id, candidate digest) is
//! a pure function of the bucketed inputs.

use std::sync::Arc;
use std::time::Instant;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::acquisition::{
    bucket_distance, chest_count_to_bucket, AcquisitionContext, AcquisitionObservation,
    AcquisitionSolution, Feasibility, PriorStore, RankedCandidate, Strategy, StrategyCandidate,
};
use crate::domain::models::config::AcquisitionConfig;
use crate::domain::ports::ReasoningService;
use crate::services::canonical;

/// Fixed-point scale for rank scores.
const SCORE_SCALE: f64 = 1_000_000.0;

/// Tie bias keeps equal-scoring strategies in lexicographic order without
/// perturbing genuinely different scores.
const TIE_BIAS_MICROS: u64 = 1;

/// Known ore blocks per target item. The mine family only proposes when one
/// of these sits in view.
fn ore_blocks_for(target_item: &str) -> &'static [&'static str] {
    match target_item {
        "iron_ingot" | "iron_ore" => &["iron_ore", "deepslate_iron_ore"],
        "gold_ingot" | "gold_ore" => &["gold_ore", "deepslate_gold_ore"],
        "coal" => &["coal_ore"],
        "diamond" => &["diamond_ore", "deepslate_diamond_ore"],
        _ => &[],
    }
}

/// Tool tier needed to mine the target, if any.
fn required_tool_for(target_item: &str) -> Option<&'static str> {
    match target_item {
        "iron_ingot" | "iron_ore" => Some("stone_pickaxe"),
        "gold_ingot" | "gold_ore" | "diamond" => Some("iron_pickaxe"),
        "coal" => Some("wooden_pickaxe"),
        _ => None,
    }
}

/// Items that salvage into the target. `(source, yields)`.
fn salvage_sources_for(target_item: &str) -> &'static [(&'static str, u64)] {
    match target_item {
        "iron_ingot" => &[("iron_door", 2), ("rail", 1), ("iron_pickaxe", 1)],
        "gold_ingot" => &[("golden_sword", 1)],
        "stick" => &[("ladder", 2)],
        _ => &[],
    }
}

/// Derive the bucketed context from a raw observation.
pub fn bucket_context(observation: &AcquisitionObservation) -> AcquisitionContext {
    let villager_distance = observation.nearest_distance("villager");
    let chest_distance = observation.nearest_distance("chest");
    let chest_count = observation
        .nearby_entities
        .iter()
        .filter(|e| e.kind == "chest")
        .count();
    let ore_nearby = observation
        .nearby_blocks
        .iter()
        .any(|b| ore_blocks_for(&observation.target_item).contains(&b.as_str()));
    // Ore distance rides on the same bucket scale; block scans are local,
    // so presence maps to the near bucket.
    let ore_distance = if ore_nearby { Some(8.0) } else { None };

    let tool_tier_cap = observation
        .inventory
        .keys()
        .filter_map(|k| k.strip_prefix("cap:has_"))
        .max()
        .map(ToString::to_string);

    let inventory_hash = canonical::content_digest16(&observation.inventory);

    AcquisitionContext {
        target_item: observation.target_item.clone(),
        ore_nearby,
        villager_trade_available: villager_distance.is_some()
            && observation.inventory_count("emerald") > 0,
        known_chest_count_bucket: chest_count_to_bucket(chest_count),
        dist_bucket_villager: bucket_distance(villager_distance),
        dist_bucket_chest: bucket_distance(chest_distance),
        dist_bucket_ore: bucket_distance(ore_distance),
        inventory_hash,
        tool_tier_cap,
    }
}

/// Enumerate at most one candidate per strategy family.
pub fn enumerate_candidates(
    observation: &AcquisitionObservation,
    context: &AcquisitionContext,
) -> Vec<StrategyCandidate> {
    let mut candidates = Vec::new();

    // Mine: a matching ore block in view.
    if context.ore_nearby {
        let required_tool = required_tool_for(&observation.target_item);
        let has_tool = required_tool
            .is_none_or(|tool| observation.inventory_count(&format!("cap:has_{tool}")) > 0);
        candidates.push(StrategyCandidate {
            strategy: Strategy::Mine,
            item: observation.target_item.clone(),
            estimated_cost: 20 + u64::from(context.dist_bucket_ore) * 10,
            feasibility: if has_tool {
                Feasibility::Available
            } else {
                Feasibility::Unknown
            },
            requires: required_tool
                .map(|tool| vec![format!("tool:{tool}")])
                .unwrap_or_default(),
            context_snapshot: context.clone(),
        });
    }

    // Trade: a villager in range and emeralds on hand.
    if context.villager_trade_available {
        candidates.push(StrategyCandidate {
            strategy: Strategy::Trade,
            item: observation.target_item.clone(),
            estimated_cost: 15 + u64::from(context.dist_bucket_villager) * 10,
            feasibility: Feasibility::Available,
            requires: vec!["item:emerald".to_string()],
            context_snapshot: context.clone(),
        });
    }

    // Loot: at least one known chest.
    if context.known_chest_count_bucket > 0 {
        candidates.push(StrategyCandidate {
            strategy: Strategy::Loot,
            item: observation.target_item.clone(),
            estimated_cost: 10 + u64::from(context.dist_bucket_chest) * 10,
            // Chest contents are unknown until opened.
            feasibility: Feasibility::Unknown,
            requires: Vec::new(),
            context_snapshot: context.clone(),
        });
    }

    // Salvage: an inventory item that breaks down into the target.
    if let Some((source, _)) = salvage_sources_for(&observation.target_item)
        .iter()
        .find(|(source, _)| observation.inventory_count(source) > 0)
    {
        candidates.push(StrategyCandidate {
            strategy: Strategy::Salvage,
            item: observation.target_item.clone(),
            estimated_cost: 12,
            feasibility: Feasibility::Available,
            requires: vec![format!("item:{source}")],
            context_snapshot: context.clone(),
        });
    }

    candidates
}

/// Rank candidates deterministically.
///
/// `score = estimated_cost * (1 - prior) + tie_bias`; priors are looked up
/// by `(strategy, context_key)` with a neutral default; ties break
/// lexicographically by strategy name.
pub fn rank_candidates(
    candidates: Vec<StrategyCandidate>,
    priors: &PriorStore,
    context_key: &str,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let prior = priors.success_rate(candidate.strategy, context_key);
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let score_micros =
                (candidate.estimated_cost as f64 * (1.0 - prior) * SCORE_SCALE) as u64 + TIE_BIAS_MICROS;
            RankedCandidate {
                candidate,
                score_micros,
                prior_success_rate: prior,
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        a.score_micros
            .cmp(&b.score_micros)
            .then_with(|| a.candidate.strategy.as_str().cmp(b.candidate.strategy.as_str()))
    });
    ranked
}

/// Context-bucketed, rank-stable strategy selector.
pub struct AcquisitionSolver {
    config: AcquisitionConfig,
    reasoner: Arc<dyn ReasoningService>,
    priors: PriorStore,
}

impl AcquisitionSolver {
    pub fn new(config: AcquisitionConfig, reasoner: Arc<dyn ReasoningService>) -> Self {
        Self {
            config,
            reasoner,
            priors: PriorStore::default(),
        }
    }

    /// The prior store.
    pub fn priors(&self) -> &PriorStore {
        &self.priors
    }

    /// Mutable access to the prior store for outcome feedback.
    pub fn priors_mut(&mut self) -> &mut PriorStore {
        &mut self.priors
    }

    /// Build the canonical reasoner payload for an observation.
    ///
    /// Canonicalization (stable key order, integral numerics) is what makes
    /// the bundle id a pure function of the inputs.
    pub fn build_bundle_payload(
        observation: &AcquisitionObservation,
        ranked: &[RankedCandidate],
    ) -> CoreResult<serde_json::Value> {
        let entities: Vec<serde_json::Value> = observation
            .nearby_entities
            .iter()
            .map(|e| {
                serde_json::json!({
                    "kind": e.kind,
                    "dist_bucket": bucket_distance(e.distance),
                })
            })
            .collect();
        let strategies: Vec<&str> = ranked
            .iter()
            .map(|r| r.candidate.strategy.as_str())
            .collect();
        let payload = serde_json::json!({
            "target_item": observation.target_item,
            "inventory": observation.inventory,
            "nearby_blocks": observation.nearby_blocks,
            "nearby_entities": entities,
            "strategies": strategies,
        });
        canonical::canonicalize_payload(&payload)
    }

    /// Solve one acquisition query.
    ///
    /// Identical `(target_item, inventory, nearby_blocks, nearby_entities)`
    /// produce identical `bundle_id` and `candidate_set_digest`.
    pub async fn solve(
        &self,
        observation: &AcquisitionObservation,
    ) -> CoreResult<AcquisitionSolution> {
        let context = bucket_context(observation);
        let context_key = context.context_key();
        let candidates = enumerate_candidates(observation, &context);
        if candidates.is_empty() {
            tracing::debug!(item = %observation.target_item, "no acquisition candidates");
            return Err(CoreError::PreconditionUnmet(format!(
                "no strategy applies to {}",
                observation.target_item
            )));
        }

        let ranked = rank_candidates(candidates, &self.priors, &context_key);
        let candidate_set_digest = canonical::content_digest16(&ranked);
        let payload = Self::build_bundle_payload(observation, &ranked)?;
        let bundle_id = canonical::content_digest16(&payload);

        let started = Instant::now();
        let reasoner_result = tokio::time::timeout(
            std::time::Duration::from_millis(self.config.reasoner_timeout_ms),
            self.reasoner.solve("acquisition", &payload),
        )
        .await;

        let response = match reasoner_result {
            Ok(Ok(response)) => Some(response),
            Ok(Err(err)) => {
                tracing::warn!(error = %err, %bundle_id, "reasoner solve failed");
                if !self.config.fallback_to_available {
                    return Err(err);
                }
                None
            }
            Err(_elapsed) => {
                #[allow(clippy::cast_possible_truncation)]
                let waited_ms = started.elapsed().as_millis() as u64;
                tracing::warn!(%bundle_id, waited_ms, "reasoner solve timed out");
                if !self.config.fallback_to_available {
                    return Err(CoreError::DeadlineExceeded {
                        operation: "acquisition solve".to_string(),
                        waited_ms,
                    });
                }
                None
            }
        };

        let (chosen, used_fallback) = match response {
            Some(response) if response.solution_found => {
                let chosen = response
                    .solution_path
                    .first()
                    .and_then(|step| {
                        ranked
                            .iter()
                            .find(|r| r.candidate.strategy.as_str() == step.as_str())
                    })
                    .map(|r| r.candidate.clone());
                (chosen, false)
            }
            // Reasoner answered but found nothing, or failed with fallback
            // enabled: take the best available candidate.
            _ => (
                ranked
                    .iter()
                    .find(|r| r.candidate.feasibility == Feasibility::Available)
                    .map(|r| r.candidate.clone()),
                true,
            ),
        };

        Ok(AcquisitionSolution {
            bundle_id,
            candidate_set_digest,
            ranked,
            chosen,
            used_fallback,
        })
    }
}
