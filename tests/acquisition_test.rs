//! Acquisition solver scenarios: identity stability, coarse bucketing,
//! ranking determinism, and fallback behavior.

use std::sync::Arc;

use cortex::adapters::ScriptedReasoningService;
use cortex::domain::models::acquisition::{
    AcquisitionObservation, Feasibility, NearbyEntity, PriorStore, Strategy,
};
use cortex::domain::models::config::AcquisitionConfig;
use cortex::services::acquisition::{bucket_context, enumerate_candidates, rank_candidates};
use cortex::services::AcquisitionSolver;
use proptest::prelude::*;

/// The iron-ingot scenario: ore in view, villager at 10, chest at 25,
/// emeralds and a stone pickaxe on hand.
fn iron_observation(villager_distance: f64) -> AcquisitionObservation {
    let mut obs = AcquisitionObservation::new("iron_ingot");
    obs.inventory.insert("emerald".to_string(), 5);
    obs.inventory.insert("cap:has_stone_pickaxe".to_string(), 1);
    obs.nearby_blocks = vec!["iron_ore".to_string(), "stone".to_string()];
    obs.nearby_entities
        .push(NearbyEntity::new("villager", villager_distance));
    obs.nearby_entities.push(NearbyEntity::new("chest", 25.0));
    obs
}

fn solver() -> AcquisitionSolver {
    AcquisitionSolver::new(
        AcquisitionConfig::default(),
        Arc::new(ScriptedReasoningService::new().with_solution("acquisition", "mine")),
    )
}

#[tokio::test]
async fn identical_inputs_yield_identical_identities() {
    let solver = solver();
    let a = solver.solve(&iron_observation(10.0)).await.unwrap();
    let b = solver.solve(&iron_observation(10.0)).await.unwrap();

    assert_eq!(a.bundle_id, b.bundle_id);
    assert_eq!(a.candidate_set_digest, b.candidate_set_digest);
    assert_eq!(a.bundle_id.len(), 16);
    assert_eq!(a.candidate_set_digest.len(), 16);
    assert_eq!(a.chosen.unwrap().strategy, Strategy::Mine);
}

#[tokio::test]
async fn coarse_bucket_tie_villager_10_vs_15() {
    // Distances 10 and 15 both land in bucket 1: same context key.
    let near = bucket_context(&iron_observation(10.0));
    let far = bucket_context(&iron_observation(15.0));
    assert_eq!(near.context_key(), far.context_key());

    // Bucket 2 changes the key.
    let outside = bucket_context(&iron_observation(20.0));
    assert_ne!(near.context_key(), outside.context_key());
}

#[test]
fn candidate_set_covers_expected_families() {
    let obs = iron_observation(10.0);
    let context = bucket_context(&obs);
    let candidates = enumerate_candidates(&obs, &context);

    let strategies: Vec<Strategy> = candidates.iter().map(|c| c.strategy).collect();
    assert!(strategies.contains(&Strategy::Mine));
    assert!(strategies.contains(&Strategy::Trade));
    assert!(strategies.contains(&Strategy::Loot));
    assert!(!strategies.contains(&Strategy::Salvage));

    // At most one candidate per family.
    let mut deduped = strategies.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(deduped.len(), strategies.len());
}

#[test]
fn ranking_is_rank_stable_under_reordering() {
    let obs = iron_observation(10.0);
    let context = bucket_context(&obs);
    let key = context.context_key();
    let candidates = enumerate_candidates(&obs, &context);

    let forward = rank_candidates(candidates.clone(), &PriorStore::default(), &key);
    let mut reversed = candidates;
    reversed.reverse();
    let backward = rank_candidates(reversed, &PriorStore::default(), &key);

    let forward_order: Vec<Strategy> = forward.iter().map(|r| r.candidate.strategy).collect();
    let backward_order: Vec<Strategy> = backward.iter().map(|r| r.candidate.strategy).collect();
    assert_eq!(forward_order, backward_order);
}

#[tokio::test]
async fn reasoner_outage_falls_back_to_best_available() {
    let solver = AcquisitionSolver::new(
        AcquisitionConfig::default(),
        Arc::new(ScriptedReasoningService::new().unavailable()),
    );
    let solution = solver.solve(&iron_observation(10.0)).await.unwrap();
    assert!(solution.used_fallback);
    let chosen = solution.chosen.unwrap();
    assert_eq!(chosen.feasibility, Feasibility::Available);
}

#[tokio::test]
async fn salvage_consumes_inventory_source() {
    let mut obs = AcquisitionObservation::new("iron_ingot");
    obs.inventory.insert("iron_door".to_string(), 1);
    let solver = AcquisitionSolver::new(
        AcquisitionConfig::default(),
        Arc::new(ScriptedReasoningService::new().with_solution("acquisition", "salvage")),
    );
    let solution = solver.solve(&obs).await.unwrap();
    let chosen = solution.chosen.unwrap();
    assert_eq!(chosen.strategy, Strategy::Salvage);
    assert!(chosen.requires.contains(&"item:iron_door".to_string()));
}

proptest! {
    /// Bundle id and digest are pure functions of the observation.
    #[test]
    fn prop_identity_stability(
        emeralds in 0u64..10,
        villager_distance in 0.0f64..100.0,
        has_ore in any::<bool>(),
    ) {
        let make = || {
            let mut obs = AcquisitionObservation::new("iron_ingot");
            if emeralds > 0 {
                obs.inventory.insert("emerald".to_string(), emeralds);
            }
            obs.inventory.insert("cap:has_stone_pickaxe".to_string(), 1);
            if has_ore {
                obs.nearby_blocks.push("iron_ore".to_string());
            }
            obs.nearby_entities.push(NearbyEntity::new("villager", villager_distance));
            obs.nearby_entities.push(NearbyEntity::new("chest", 25.0));
            obs
        };

        let a = make();
        let b = make();
        let context_a = bucket_context(&a);
        let context_b = bucket_context(&b);
        prop_assert_eq!(context_a.context_key(), context_b.context_key());

        let key = context_a.context_key();
        let ranked_a = rank_candidates(enumerate_candidates(&a, &context_a), &PriorStore::default(), &key);
        let ranked_b = rank_candidates(enumerate_candidates(&b, &context_b), &PriorStore::default(), &key);
        prop_assert_eq!(
            cortex::services::canonical::content_digest16(&ranked_a),
            cortex::services::canonical::content_digest16(&ranked_b)
        );
    }

    /// Distances within one bucket never change the context key.
    #[test]
    fn prop_bucket_stability(base in 0.0f64..15.9, wiggle in 0.0f64..15.9) {
        let a = bucket_context(&iron_observation(base.min(15.9)));
        let b = bucket_context(&iron_observation(wiggle.min(15.9)));
        prop_assert_eq!(a.context_key(), b.context_key());
    }
}
