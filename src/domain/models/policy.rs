//! Contingency policy domain model.
//!
//! The contingency planner searches over world states interleaving the
//! agent's chosen actions with world-forced transitions, producing a bounded
//! policy tree. Everything here is plain data; the search lives in
//! `services::contingency`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical world state: a tick plus integer-valued properties.
///
/// Properties use a `BTreeMap` so state keys and serialized forms are
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    pub tick: u64,
    pub properties: BTreeMap<String, i64>,
}

impl WorldState {
    pub fn new(tick: u64) -> Self {
        Self {
            tick,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: i64) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> i64 {
        self.properties.get(key).copied().unwrap_or(0)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: i64) {
        self.properties.insert(key.into(), value);
    }

    /// Apply a set of property deltas in place.
    pub fn apply_effects(&mut self, effects: &BTreeMap<String, i64>) {
        for (key, delta) in effects {
            let entry = self.properties.entry(key.clone()).or_insert(0);
            *entry += delta;
        }
    }

    /// Deterministic identity string; equal states produce equal keys.
    pub fn canonical_key(&self) -> String {
        let mut key = format!("t{}", self.tick);
        for (name, value) in &self.properties {
            key.push('|');
            key.push_str(name);
            key.push('=');
            key.push_str(&value.to_string());
        }
        key
    }
}

/// When a forced transition fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fires when `(tick - offset) >= 0` and `(tick - offset) % interval == 0`.
    TickInterval { interval: u64, offset: u64 },
    /// Fires when `properties[watch_property] <= threshold`.
    Threshold { watch_property: String, threshold: i64 },
}

impl TriggerMode {
    /// Deterministic evaluation: same `(tick, properties)`, same answer.
    pub fn fires(&self, state: &WorldState) -> bool {
        match self {
            Self::TickInterval { interval, offset } => {
                if *interval == 0 {
                    return false;
                }
                state.tick >= *offset && (state.tick - offset) % interval == 0
            }
            Self::Threshold {
                watch_property,
                threshold,
            } => state.property(watch_property) <= *threshold,
        }
    }
}

/// An exogenous world event the planner cannot decline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedTransition {
    pub id: String,
    pub trigger: TriggerMode,
    /// Property deltas applied when the transition fires.
    pub effects: BTreeMap<String, i64>,
}

impl ForcedTransition {
    pub fn new(id: impl Into<String>, trigger: TriggerMode) -> Self {
        Self {
            id: id.into(),
            trigger,
            effects: BTreeMap::new(),
        }
    }

    pub fn with_effect(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.effects.insert(key.into(), delta);
        self
    }
}

/// A chosen action available to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub id: String,
    pub cost: u64,
    pub duration_ticks: u64,
    /// Property minimums that must hold for the action to be applicable.
    #[serde(default)]
    pub preconditions: BTreeMap<String, i64>,
    /// Property deltas applied at the action's end tick.
    #[serde(default)]
    pub effects: BTreeMap<String, i64>,
}

impl ActionSpec {
    pub fn new(id: impl Into<String>, cost: u64, duration_ticks: u64) -> Self {
        Self {
            id: id.into(),
            cost,
            duration_ticks: duration_ticks.max(1),
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

/// A property floor that must hold at every reachable node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyInvariant {
    pub id: String,
    pub property: String,
    pub minimum: i64,
}

impl SafetyInvariant {
    pub fn new(id: impl Into<String>, property: impl Into<String>, minimum: i64) -> Self {
        Self {
            id: id.into(),
            property: property.into(),
            minimum,
        }
    }

    pub fn holds(&self, state: &WorldState) -> bool {
        state.property(&self.property) >= self.minimum
    }
}

/// Goal predicate: a conjunction of property minimums.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSpec {
    pub minimums: BTreeMap<String, i64>,
}

impl GoalSpec {
    pub fn require(mut self, key: impl Into<String>, minimum: i64) -> Self {
        self.minimums.insert(key.into(), minimum);
        self
    }

    pub fn reached(&self, state: &WorldState) -> bool {
        self.minimums
            .iter()
            .all(|(key, minimum)| state.property(key) >= *minimum)
    }
}

/// Identifier for a node inside one policy tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyNodeId(pub u64);

/// Record of forced transitions applied at a simulated tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedApplication {
    pub tick: u64,
    /// Transition ids, sorted lexicographically.
    pub transition_ids: Vec<String>,
}

/// One node of the policy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyNode {
    pub node_id: PolicyNodeId,
    pub state: WorldState,
    /// Lowest-cost safe child action id, when the node was expanded.
    pub prescribed_action_id: Option<String>,
    pub is_terminal: bool,
    pub is_goal_reached: bool,
    pub is_safe: bool,
    /// Forced transitions applied on the way into this node.
    pub forced_applied_at_tick: Vec<ForcedApplication>,
    /// Safety invariants violated at or on the way into this node.
    pub violated_invariant_ids: Vec<String>,
    pub depth: u64,
}

impl PolicyNode {
    /// Whether any forced transitions fired on the way into this node.
    pub fn had_forced_transition(&self, transition_id: &str) -> bool {
        self.forced_applied_at_tick
            .iter()
            .any(|f| f.transition_ids.iter().any(|id| id == transition_id))
    }
}

/// Edge kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    ChosenAction,
    ForcedTransition,
}

/// One edge of the policy tree, structurally distinct by `edge_kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edge_kind", rename_all = "snake_case")]
pub enum PolicyEdge {
    ChosenAction {
        from: PolicyNodeId,
        to: PolicyNodeId,
        action_id: String,
        cost: u64,
    },
    ForcedTransition {
        from: PolicyNodeId,
        to: PolicyNodeId,
        /// Transition ids applied, sorted lexicographically.
        transition_ids: Vec<String>,
    },
}

impl PolicyEdge {
    pub fn kind(&self) -> EdgeKind {
        match self {
            Self::ChosenAction { .. } => EdgeKind::ChosenAction,
            Self::ForcedTransition { .. } => EdgeKind::ForcedTransition,
        }
    }

    pub fn from_node(&self) -> PolicyNodeId {
        match self {
            Self::ChosenAction { from, .. } | Self::ForcedTransition { from, .. } => *from,
        }
    }

    pub fn to_node(&self) -> PolicyNodeId {
        match self {
            Self::ChosenAction { to, .. } | Self::ForcedTransition { to, .. } => *to,
        }
    }
}

/// Why the search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    GoalReached,
    HorizonExhausted,
    NodeCapReached,
    Exhausted,
}

/// A bounded branching plan against forced transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTree {
    pub root: PolicyNodeId,
    pub nodes: Vec<PolicyNode>,
    pub edges: Vec<PolicyEdge>,
    pub total_nodes: usize,
    pub max_depth: u64,
    /// Union of violated invariant ids across all reachable nodes, sorted.
    pub violated_invariants: Vec<String>,
    pub all_terminals_safe: bool,
    pub outcome: PolicyOutcome,
}

impl PolicyTree {
    pub fn node(&self, id: PolicyNodeId) -> Option<&PolicyNode> {
        self.nodes.iter().find(|n| n.node_id == id)
    }

    /// Edges leaving `id`.
    pub fn edges_from(&self, id: PolicyNodeId) -> Vec<&PolicyEdge> {
        self.edges.iter().filter(|e| e.from_node() == id).collect()
    }
}
