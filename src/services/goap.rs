//! Reactive GOAP planner.
//!
//! A bounded A* in action space with dynamic costs. Planning is pure
//! synchronous code over immutable state; only reflex dispatch touches the
//! world, and it goes through the execution gateway like everything else.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::domain::models::action::{ActionRequest, DispatchOutcome, Origin};
use crate::domain::models::config::GoapConfig;
use crate::domain::models::policy::WorldState;
use crate::domain::models::track::ThreatLevel;
use crate::services::canonical;
use crate::services::gateway::ExecutionGateway;

/// What kind of condition a subgoal expresses; selects the heuristic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GoalKind {
    /// Drive `distance_to_target` to zero.
    Distance,
    /// Possess `count` of `item`.
    ItemPossession { item: String, count: i64 },
    /// Bring the `threat` property down to zero.
    ThreatLevel,
}

/// A reactive subgoal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgoal {
    pub id: String,
    pub kind: GoalKind,
}

impl Subgoal {
    pub fn satisfied(&self, state: &WorldState) -> bool {
        match &self.kind {
            GoalKind::Distance => state.property("distance_to_target") <= 0,
            GoalKind::ItemPossession { item, count } => {
                state.property(&format!("item:{item}")) >= *count
            }
            GoalKind::ThreatLevel => state.property("threat") <= 0,
        }
    }
}

/// One action in the reactive action space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoapAction {
    pub id: String,
    pub base_cost: u64,
    /// Property minimums required to apply.
    #[serde(default)]
    pub preconditions: BTreeMap<String, i64>,
    /// Property deltas applied on completion.
    #[serde(default)]
    pub effects: BTreeMap<String, i64>,
}

impl GoapAction {
    pub fn new(id: impl Into<String>, base_cost: u64) -> Self {
        Self {
            id: id.into(),
            base_cost,
            preconditions: BTreeMap::new(),
            effects: BTreeMap::new(),
        }
    }

    pub fn with_precondition(mut self, key: impl Into<String>, minimum: i64) -> Self {
        self.preconditions.insert(key.into(), minimum);
        self
    }

    pub fn with_effect(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.effects.insert(key.into(), delta);
        self
    }

    pub fn applicable(&self, state: &WorldState) -> bool {
        self.preconditions
            .iter()
            .all(|(key, minimum)| state.property(key) >= *minimum)
    }
}

/// Situational context that shapes dynamic costs.
#[derive(Debug, Clone, Default)]
pub struct GoapContext {
    /// Current ambient threat level.
    pub threat: ThreatLevel,
    /// Hunger pressure: 0 (sated) .. 20 (starving).
    pub hunger: i64,
    /// Per-action opportunity discounts (detour value), in cost units.
    pub opportunity: BTreeMap<String, u64>,
}

/// Combine an action's base cost with urgency and opportunity.
///
/// Urgency raises the cost of everything that is not the urgent thing;
/// opportunity discounts actions that are cheap to grab in passing.
pub fn dynamic_cost(action: &GoapAction, context: &GoapContext) -> u64 {
    let mut cost = action.base_cost;

    let urgency = match context.threat {
        ThreatLevel::Critical => 4,
        ThreatLevel::High => 3,
        ThreatLevel::Medium => 2,
        ThreatLevel::Low | ThreatLevel::None => 1,
    };
    let eating = action.effects.contains_key("food");
    if context.hunger >= 14 && !eating {
        cost = cost.saturating_mul(2);
    }
    if context.threat >= ThreatLevel::High && !action.effects.contains_key("threat") {
        cost = cost.saturating_mul(urgency);
    }

    let discount = context.opportunity.get(&action.id).copied().unwrap_or(0);
    cost.saturating_sub(discount).max(1)
}

/// A plan produced by one A* run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub goal_id: String,
    pub action_ids: Vec<String>,
    pub total_cost: u64,
    /// Digest of the state this plan was computed against.
    pub state_digest: String,
}

/// Emergency reflex kinds, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyReflexKind {
    RetreatFromLava,
    SurfaceForAir,
    EatFood,
}

/// An emergency action bypassing deliberate planning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyAction {
    pub kind: SafetyReflexKind,
    pub action_type: String,
    pub parameters: serde_json::Value,
    /// Lower is more urgent.
    pub priority: u8,
}

/// Check emergency thresholds, highest priority first.
pub fn check_safety_reflexes(state: &WorldState, _context: &GoapContext) -> Option<SafetyAction> {
    if state.property("lava_proximity") > 0 && state.property("lava_distance") <= 2 {
        return Some(SafetyAction {
            kind: SafetyReflexKind::RetreatFromLava,
            action_type: "move_to".to_string(),
            parameters: serde_json::json!({"away_from": "lava", "blocks": 4}),
            priority: 0,
        });
    }
    if state.properties.get("air").is_some_and(|air| *air < 6) {
        return Some(SafetyAction {
            kind: SafetyReflexKind::SurfaceForAir,
            action_type: "swim_to".to_string(),
            parameters: serde_json::json!({"direction": "surface"}),
            priority: 1,
        });
    }
    if state.properties.get("health").is_some_and(|h| *h < 20) && state.property("item:food") > 0 {
        return Some(SafetyAction {
            kind: SafetyReflexKind::EatFood,
            action_type: "consume".to_string(),
            parameters: serde_json::json!({"item": "food"}),
            priority: 2,
        });
    }
    None
}

/// Dispatch a safety reflex through the gateway with reflex origin.
pub async fn execute_safety_reflex(
    reflex: &SafetyAction,
    gateway: &ExecutionGateway,
) -> DispatchOutcome {
    let request = ActionRequest::new(
        Origin::Reflex,
        reflex.action_type.clone(),
        reflex.parameters.clone(),
    );
    if reflex.action_type == "move_to" || reflex.action_type == "swim_to" {
        let lease = gateway.acquire_navigation_lease();
        gateway.execute_via_gateway(&request, Some(&lease)).await
    } else {
        gateway.execute_via_gateway(&request, None).await
    }
}

/// Latency and cache observability counters.
#[derive(Debug, Default, Clone)]
pub struct GoapMetrics {
    pub plan_calls: u64,
    pub replans: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    latencies_us: Vec<u64>,
}

impl GoapMetrics {
    fn record_latency(&mut self, micros: u64) {
        self.latencies_us.push(micros);
        // Keep a rolling window so percentiles track recent behavior.
        if self.latencies_us.len() > 256 {
            self.latencies_us.remove(0);
        }
    }

    fn percentile(&self, p: f64) -> Option<u64> {
        if self.latencies_us.is_empty() {
            return None;
        }
        let mut sorted = self.latencies_us.clone();
        sorted.sort_unstable();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let index = ((sorted.len() - 1) as f64 * p).round() as usize;
        sorted.get(index).copied()
    }

    pub fn p50_latency_us(&self) -> Option<u64> {
        self.percentile(0.5)
    }

    pub fn p95_latency_us(&self) -> Option<u64> {
        self.percentile(0.95)
    }

    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.cache_hits as f64 / total as f64;
        rate
    }

    pub fn replan_ratio(&self) -> f64 {
        if self.plan_calls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.replans as f64 / self.plan_calls as f64;
        ratio
    }
}

struct CachedPlan {
    plan: Plan,
    created_tick: u64,
}

/// Bounded A* planner with a short-lived plan cache.
pub struct GoapPlanner {
    config: GoapConfig,
    actions: Vec<GoapAction>,
    cache: HashMap<(String, String), CachedPlan>,
    metrics: GoapMetrics,
}

impl GoapPlanner {
    pub fn new(config: GoapConfig, actions: Vec<GoapAction>) -> Self {
        Self {
            config,
            actions,
            cache: HashMap::new(),
            metrics: GoapMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &GoapMetrics {
        &self.metrics
    }

    /// Heuristic selected by goal kind. Admissible under unit action costs.
    fn heuristic(subgoal: &Subgoal, state: &WorldState) -> u64 {
        let remaining = match &subgoal.kind {
            GoalKind::Distance => state.property("distance_to_target"),
            GoalKind::ItemPossession { item, count } => {
                count - state.property(&format!("item:{item}"))
            }
            GoalKind::ThreatLevel => state.property("threat"),
        };
        u64::try_from(remaining.max(0)).unwrap_or(0)
    }

    /// Plan toward `subgoal` within the time budget.
    ///
    /// Returns a cached plan when one is fresh and still applicable;
    /// otherwise runs A* keyed on canonical state digests. `None` means no
    /// plan was found inside the budget and bounds.
    pub fn plan_to(
        &mut self,
        subgoal: &Subgoal,
        state: &WorldState,
        context: &GoapContext,
        current_tick: u64,
    ) -> Option<Plan> {
        self.metrics.plan_calls += 1;
        let state_digest = canonical::content_digest16(&state);
        let cache_key = (subgoal.id.clone(), state_digest.clone());

        if let Some(cached) = self.cache.get(&cache_key) {
            let fresh = current_tick.saturating_sub(cached.created_tick) < self.config.cache_ttl_ticks;
            let applicable = cached
                .plan
                .action_ids
                .first()
                .and_then(|id| self.actions.iter().find(|a| &a.id == id))
                .is_none_or(|a| a.applicable(state));
            if fresh && applicable {
                self.metrics.cache_hits += 1;
                return Some(cached.plan.clone());
            }
            self.cache.remove(&cache_key);
            self.metrics.replans += 1;
        }
        self.metrics.cache_misses += 1;

        let started = Instant::now();
        let plan = self.search(subgoal, state, context, started);
        #[allow(clippy::cast_possible_truncation)]
        let elapsed_us = started.elapsed().as_micros() as u64;
        self.metrics.record_latency(elapsed_us);

        if let Some(ref plan) = plan {
            self.cache.insert(
                cache_key,
                CachedPlan {
                    plan: plan.clone(),
                    created_tick: current_tick,
                },
            );
        }
        plan
    }

    fn search(
        &self,
        subgoal: &Subgoal,
        initial: &WorldState,
        context: &GoapContext,
        started: Instant,
    ) -> Option<Plan> {
        if subgoal.satisfied(initial) {
            return Some(Plan {
                goal_id: subgoal.id.clone(),
                action_ids: Vec::new(),
                total_cost: 0,
                state_digest: canonical::content_digest16(initial),
            });
        }

        let budget = std::time::Duration::from_millis(self.config.plan_budget_ms);

        // Open set ordered by f = g + h; sequence breaks ties FIFO so
        // expansion order is deterministic.
        let mut open: BinaryHeap<(Reverse<u64>, Reverse<u64>, u64)> = BinaryHeap::new();
        let mut states: Vec<WorldState> = vec![initial.clone()];
        let mut paths: Vec<Vec<String>> = vec![Vec::new()];
        let mut costs: Vec<u64> = vec![0];
        let mut closed: HashSet<String> = HashSet::new();
        let mut seq = 0_u64;

        open.push((Reverse(Self::heuristic(subgoal, initial)), Reverse(seq), 0));

        let mut iterations = 0_usize;
        while let Some((_, _, index)) = open.pop() {
            iterations += 1;
            if iterations > self.config.max_iterations || started.elapsed() > budget {
                tracing::debug!(
                    goal = %subgoal.id,
                    iterations,
                    "reactive plan budget exhausted"
                );
                return None;
            }

            let index = usize::try_from(index).ok()?;
            let digest = canonical::content_digest16(&states[index]);
            if !closed.insert(digest) {
                continue;
            }

            if subgoal.satisfied(&states[index]) {
                return Some(Plan {
                    goal_id: subgoal.id.clone(),
                    action_ids: paths[index].clone(),
                    total_cost: costs[index],
                    state_digest: canonical::content_digest16(initial),
                });
            }

            for action in &self.actions {
                if !action.applicable(&states[index]) {
                    continue;
                }
                let mut next = states[index].clone();
                next.apply_effects(&action.effects);
                let g = costs[index] + dynamic_cost(action, context);
                let h = Self::heuristic(subgoal, &next);
                let mut path = paths[index].clone();
                path.push(action.id.clone());

                states.push(next);
                paths.push(path);
                costs.push(g);
                seq += 1;
                open.push((Reverse(g + h), Reverse(seq), (states.len() - 1) as u64));
            }
        }
        None
    }
}
