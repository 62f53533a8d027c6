//! Contingency planner.
//!
//! A bounded policy-tree search interleaving the agent's chosen actions
//! with world-forced transitions. Forced transitions fire at their declared
//! trigger ticks and cannot be skipped, including when a chosen action spans
//! across their scheduled tick. The search is bounded by the horizon, the
//! branch factor, and the node cap; caps produce partial policies with
//! terminal frontier nodes, never errors.

use std::collections::{BTreeSet, VecDeque};

use crate::domain::models::config::PlannerConfig;
use crate::domain::models::policy::{
    ActionSpec, ForcedApplication, ForcedTransition, GoalSpec, PolicyEdge, PolicyNode,
    PolicyNodeId, PolicyOutcome, PolicyTree, SafetyInvariant, WorldState,
};

/// One planning problem instance.
#[derive(Debug, Clone)]
pub struct PlanningProblem {
    pub initial: WorldState,
    pub actions: Vec<ActionSpec>,
    pub transitions: Vec<ForcedTransition>,
    pub invariants: Vec<SafetyInvariant>,
    pub goal: GoalSpec,
    /// Requested horizon; clamped to the configured maximum.
    pub horizon_ticks: u64,
}

/// Evaluate which forced transitions fire in `state`.
///
/// Deterministic: same `(tick, properties)` always yields the same list,
/// sorted lexicographically by transition id.
pub fn evaluate_triggers(state: &WorldState, transitions: &[ForcedTransition]) -> Vec<String> {
    let mut fired: Vec<String> = transitions
        .iter()
        .filter(|t| t.trigger.fires(state))
        .map(|t| t.id.clone())
        .collect();
    fired.sort_unstable();
    fired
}

/// Return the sorted list of invariant ids violated in `state`.
pub fn check_all_safety(state: &WorldState, invariants: &[SafetyInvariant]) -> Vec<String> {
    let mut violated: Vec<String> = invariants
        .iter()
        .filter(|inv| !inv.holds(state))
        .map(|inv| inv.id.clone())
        .collect();
    violated.sort_unstable();
    violated
}

/// Work-queue entry. `post_force` marks nodes created by node-level forced
/// application; their triggers were already applied at this tick.
struct WorkItem {
    node_index: usize,
    post_force: bool,
}

/// Bounded policy-tree planner.
pub struct ContingencyPlanner {
    config: PlannerConfig,
}

impl ContingencyPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Compute a bounded contingency policy for `problem`.
    pub fn plan(&self, problem: &PlanningProblem) -> PolicyTree {
        let horizon = problem.horizon_ticks.min(self.config.max_horizon);
        let start_tick = problem.initial.tick;

        let mut nodes: Vec<PolicyNode> = Vec::new();
        let mut edges: Vec<PolicyEdge> = Vec::new();
        let mut queue: VecDeque<WorkItem> = VecDeque::new();
        let mut cap_hit = false;

        let root_violations = check_all_safety(&problem.initial, &problem.invariants);
        let root = PolicyNode {
            node_id: PolicyNodeId(0),
            state: problem.initial.clone(),
            prescribed_action_id: None,
            is_terminal: false,
            is_goal_reached: problem.goal.reached(&problem.initial),
            is_safe: root_violations.is_empty(),
            forced_applied_at_tick: Vec::new(),
            violated_invariant_ids: root_violations,
            depth: 0,
        };
        let root_terminal = root.is_goal_reached || !root.is_safe;
        nodes.push(root);
        if root_terminal {
            nodes[0].is_terminal = true;
        } else {
            queue.push_back(WorkItem {
                node_index: 0,
                post_force: false,
            });
        }

        while let Some(work) = queue.pop_front() {
            if nodes[work.node_index].is_terminal {
                continue;
            }

            if !work.post_force {
                let fired = self.node_level_fired(&nodes[work.node_index], &problem.transitions);
                if !fired.is_empty() {
                    if nodes.len() >= self.config.max_policy_nodes {
                        cap_hit = true;
                        nodes[work.node_index].is_terminal = true;
                        continue;
                    }
                    let child_index = self.apply_forced(
                        &mut nodes,
                        &mut edges,
                        work.node_index,
                        &fired,
                        problem,
                        horizon,
                        start_tick,
                    );
                    if !nodes[child_index].is_terminal {
                        queue.push_back(WorkItem {
                            node_index: child_index,
                            post_force: true,
                        });
                    }
                    // No chosen-action edges may originate from a pre-force
                    // node.
                    continue;
                }
            }

            self.expand_actions(
                &mut nodes,
                &mut edges,
                &mut queue,
                &mut cap_hit,
                work.node_index,
                problem,
                horizon,
                start_tick,
            );
        }

        Self::finish(nodes, edges, cap_hit, horizon)
    }

    /// Node-level trigger evaluation, excluding transitions already applied
    /// at this node's tick during the simulation that produced it. Forced
    /// transitions apply at most once per (node, tick).
    fn node_level_fired(&self, node: &PolicyNode, transitions: &[ForcedTransition]) -> Vec<String> {
        let fired = evaluate_triggers(&node.state, transitions);
        if fired.is_empty() {
            return fired;
        }
        let tick = node.state.tick;
        fired
            .into_iter()
            .filter(|id| {
                !node
                    .forced_applied_at_tick
                    .iter()
                    .any(|f| f.tick == tick && f.transition_ids.iter().any(|t| t == id))
            })
            .collect()
    }

    /// Apply all fired transitions in trigger-id order, producing the single
    /// post-force child.
    #[allow(clippy::too_many_arguments)]
    fn apply_forced(
        &self,
        nodes: &mut Vec<PolicyNode>,
        edges: &mut Vec<PolicyEdge>,
        parent_index: usize,
        fired: &[String],
        problem: &PlanningProblem,
        horizon: u64,
        start_tick: u64,
    ) -> usize {
        let mut state = nodes[parent_index].state.clone();
        for id in fired {
            if let Some(transition) = problem.transitions.iter().find(|t| &t.id == id) {
                state.apply_effects(&transition.effects);
            }
        }

        let mut applied = nodes[parent_index].forced_applied_at_tick.clone();
        applied.push(ForcedApplication {
            tick: state.tick,
            transition_ids: fired.to_vec(),
        });

        let violations = check_all_safety(&state, &problem.invariants);
        let depth = state.tick.saturating_sub(start_tick);
        let is_goal = problem.goal.reached(&state);
        let is_safe = violations.is_empty();
        let child_id = PolicyNodeId(nodes.len() as u64);
        let child = PolicyNode {
            node_id: child_id,
            state,
            prescribed_action_id: None,
            is_terminal: is_goal || !is_safe || depth >= horizon,
            is_goal_reached: is_goal,
            is_safe,
            forced_applied_at_tick: applied,
            violated_invariant_ids: violations,
            depth,
        };
        edges.push(PolicyEdge::ForcedTransition {
            from: nodes[parent_index].node_id,
            to: child_id,
            transition_ids: fired.to_vec(),
        });
        nodes.push(child);
        nodes.len() - 1
    }

    /// Expand chosen actions from a node, simulating each tick-by-tick so
    /// forced transitions scheduled inside the action window still apply.
    #[allow(clippy::too_many_arguments)]
    fn expand_actions(
        &self,
        nodes: &mut Vec<PolicyNode>,
        edges: &mut Vec<PolicyEdge>,
        queue: &mut VecDeque<WorkItem>,
        cap_hit: &mut bool,
        parent_index: usize,
        problem: &PlanningProblem,
        horizon: u64,
        start_tick: u64,
    ) {
        let parent_state = nodes[parent_index].state.clone();
        let parent_id = nodes[parent_index].node_id;
        let parent_depth = nodes[parent_index].depth;

        // Only actions that finish inside the horizon expand; nodes where
        // nothing fits become the horizon frontier.
        let mut candidates: Vec<&ActionSpec> = problem
            .actions
            .iter()
            .filter(|a| a.applicable(&parent_state))
            .filter(|a| parent_depth + a.duration_ticks <= horizon)
            .collect();
        candidates.sort_by(|a, b| a.cost.cmp(&b.cost).then_with(|| a.id.cmp(&b.id)));
        candidates.truncate(self.config.max_branch_factor);

        if candidates.is_empty() {
            nodes[parent_index].is_terminal = true;
            return;
        }

        let mut prescribed: Option<String> = None;
        for action in candidates {
            if nodes.len() >= self.config.max_policy_nodes {
                *cap_hit = true;
                nodes[parent_index].is_terminal = true;
                break;
            }

            let (child, edge) = self.simulate_action(
                parent_id,
                &parent_state,
                action,
                problem,
                horizon,
                start_tick,
                PolicyNodeId(nodes.len() as u64),
            );
            let child_index = nodes.len();
            let child_safe = child.is_safe;
            let child_terminal = child.is_terminal;
            edges.push(edge);
            nodes.push(child);

            if child_safe && prescribed.is_none() {
                prescribed = Some(action.id.clone());
            }
            if !child_terminal {
                queue.push_back(WorkItem {
                    node_index: child_index,
                    post_force: false,
                });
            }
        }
        nodes[parent_index].prescribed_action_id = prescribed;
    }

    /// Tick-by-tick simulation of one chosen action, collecting intermediate
    /// forced applications and safety violations; the action's own effects
    /// land at the end tick.
    #[allow(clippy::too_many_arguments)]
    fn simulate_action(
        &self,
        parent_id: PolicyNodeId,
        parent_state: &WorldState,
        action: &ActionSpec,
        problem: &PlanningProblem,
        horizon: u64,
        start_tick: u64,
        child_id: PolicyNodeId,
    ) -> (PolicyNode, PolicyEdge) {
        let mut sim = parent_state.clone();
        let mut applied: Vec<ForcedApplication> = Vec::new();
        let mut violations: BTreeSet<String> = BTreeSet::new();

        for _ in 0..action.duration_ticks {
            sim.tick += 1;
            let fired = evaluate_triggers(&sim, &problem.transitions);
            if !fired.is_empty() {
                for id in &fired {
                    if let Some(transition) = problem.transitions.iter().find(|t| &t.id == id) {
                        sim.apply_effects(&transition.effects);
                    }
                }
                applied.push(ForcedApplication {
                    tick: sim.tick,
                    transition_ids: fired,
                });
            }
            for violated in check_all_safety(&sim, &problem.invariants) {
                violations.insert(violated);
            }
        }

        sim.apply_effects(&action.effects);
        for violated in check_all_safety(&sim, &problem.invariants) {
            violations.insert(violated);
        }

        let depth = sim.tick.saturating_sub(start_tick);
        let is_goal = problem.goal.reached(&sim);
        let is_safe = violations.is_empty();
        let node = PolicyNode {
            node_id: child_id,
            state: sim,
            prescribed_action_id: None,
            is_terminal: is_goal || !is_safe || depth >= horizon,
            is_goal_reached: is_goal,
            is_safe,
            forced_applied_at_tick: applied,
            violated_invariant_ids: violations.into_iter().collect(),
            depth,
        };
        let edge = PolicyEdge::ChosenAction {
            from: parent_id,
            to: child_id,
            action_id: action.id.clone(),
            cost: action.cost,
        };
        (node, edge)
    }

    /// Assemble the final tree and aggregates.
    fn finish(nodes: Vec<PolicyNode>, edges: Vec<PolicyEdge>, cap_hit: bool, _horizon: u64) -> PolicyTree {
        let total_nodes = nodes.len();
        let max_depth = nodes.iter().map(|n| n.depth).max().unwrap_or(0);
        let violated: BTreeSet<String> = nodes
            .iter()
            .flat_map(|n| n.violated_invariant_ids.iter().cloned())
            .collect();
        let all_terminals_safe = nodes.iter().filter(|n| n.is_terminal).all(|n| n.is_safe);
        let any_goal = nodes.iter().any(|n| n.is_goal_reached);
        let any_horizon_terminal = nodes
            .iter()
            .any(|n| n.is_terminal && !n.is_goal_reached && n.is_safe);

        let outcome = if any_goal {
            PolicyOutcome::GoalReached
        } else if cap_hit {
            PolicyOutcome::NodeCapReached
        } else if any_horizon_terminal {
            PolicyOutcome::HorizonExhausted
        } else {
            PolicyOutcome::Exhausted
        };

        tracing::debug!(
            total_nodes,
            max_depth,
            ?outcome,
            violated = violated.len(),
            "contingency plan complete"
        );

        PolicyTree {
            root: PolicyNodeId(0),
            nodes,
            edges,
            total_nodes,
            max_depth,
            violated_invariants: violated.into_iter().collect(),
            all_terminals_safe,
            outcome,
        }
    }
}
