//! Contingency planner scenarios, including the mining-overnight fixture:
//! hunger on an interval, nightfall as a one-shot transition, and mob
//! damage forced onto any branch that is exposed after dark.

use cortex::domain::models::config::PlannerConfig;
use cortex::domain::models::policy::{
    ActionSpec, ForcedTransition, GoalSpec, PolicyEdge, SafetyInvariant, TriggerMode, WorldState,
};
use cortex::services::contingency::{check_all_safety, evaluate_triggers, PlanningProblem};
use cortex::services::ContingencyPlanner;
use proptest::prelude::*;

/// The mining fixture: survive the night while gathering ore.
fn mining_problem() -> PlanningProblem {
    PlanningProblem {
        initial: WorldState::new(0)
            .with_property("health", 20)
            .with_property("food", 20)
            .with_property("ore", 0)
            .with_property("light_level", 15)
            .with_property("has_shelter", 0),
        actions: vec![
            ActionSpec::new("mine_ore", 5, 30).with_effect("ore", 1),
            // A torch-lit shelter keeps the local light level above the
            // mob-damage threshold after nightfall.
            ActionSpec::new("build_shelter", 3, 20)
                .with_effect("has_shelter", 1)
                .with_effect("light_level", 5),
        ],
        transitions: vec![
            ForcedTransition::new(
                "hunger",
                TriggerMode::TickInterval {
                    interval: 80,
                    offset: 80,
                },
            )
            .with_effect("food", -6),
            ForcedTransition::new(
                "nightfall",
                TriggerMode::TickInterval {
                    interval: 10_000,
                    offset: 200,
                },
            )
            .with_effect("light_level", -15),
            ForcedTransition::new(
                "mob_damage",
                TriggerMode::Threshold {
                    watch_property: "light_level".to_string(),
                    threshold: 0,
                },
            )
            .with_effect("health", -4),
        ],
        invariants: vec![
            SafetyInvariant::new("health_floor", "health", 1),
            SafetyInvariant::new("food_floor", "food", 1),
        ],
        goal: GoalSpec::default().require("ore", 8),
        horizon_ticks: 300,
    }
}

#[test]
fn mining_fixture_bounds_hold() {
    let config = PlannerConfig::default();
    let planner = ContingencyPlanner::new(config.clone());
    let tree = planner.plan(&mining_problem());

    assert!(tree.total_nodes <= config.max_policy_nodes);
    assert!(tree.max_depth <= 300);
    assert!(tree.total_nodes > 1, "the fixture must actually expand");
}

#[test]
fn exposed_nodes_suffer_mob_damage() {
    let planner = ContingencyPlanner::new(PlannerConfig::default());
    let tree = planner.plan(&mining_problem());

    // Every reachable node that ends up dark and unsheltered must carry a
    // mob_damage application, either on the way in or on the way out.
    let mut exposed = 0;
    for node in &tree.nodes {
        if node.state.property("light_level") <= 0 && node.state.property("has_shelter") == 0 {
            exposed += 1;
            let on_the_way_in = node.had_forced_transition("mob_damage");
            let on_the_way_out = tree.edges_from(node.node_id).iter().any(|edge| {
                tree.node(edge.to_node())
                    .is_some_and(|child| child.had_forced_transition("mob_damage"))
            });
            assert!(
                on_the_way_in || on_the_way_out,
                "exposed node {:?} escaped mob_damage",
                node.node_id
            );
        }
    }
    assert!(exposed > 0, "some branch must cross nightfall unsheltered");
}

#[test]
fn sheltered_branches_survive_nightfall() {
    let planner = ContingencyPlanner::new(PlannerConfig::default());
    let tree = planner.plan(&mining_problem());

    // A node that built shelter before dark keeps its health intact across
    // the nightfall tick.
    let survivor = tree.nodes.iter().find(|n| {
        n.state.tick > 200
            && n.state.property("has_shelter") == 1
            && n.state.property("health") == 20
    });
    assert!(survivor.is_some(), "shelter must protect some branch");
}

#[test]
fn forced_transition_inescapable_across_action_spans() {
    let planner = ContingencyPlanner::new(PlannerConfig::default());
    let problem = PlanningProblem {
        initial: WorldState::new(0)
            .with_property("health", 20)
            .with_property("food", 20),
        actions: vec![ActionSpec::new("march", 1, 50)],
        transitions: vec![ForcedTransition::new(
            "hunger",
            TriggerMode::TickInterval {
                interval: 40,
                offset: 40,
            },
        )
        .with_effect("food", -3)],
        invariants: vec![SafetyInvariant::new("food_floor", "food", 1)],
        goal: GoalSpec::default().require("unreachable", 1),
        horizon_ticks: 100,
    };
    let tree = planner.plan(&problem);

    // The first march spans tick 40; the hunger transition is recorded at
    // exactly its scheduled tick inside the action window.
    let first_child = tree
        .nodes
        .iter()
        .find(|n| n.state.tick == 50)
        .expect("first march child");
    assert!(first_child
        .forced_applied_at_tick
        .iter()
        .any(|f| f.tick == 40 && f.transition_ids == vec!["hunger".to_string()]));
    assert_eq!(first_child.state.property("food"), 17);

    // The second span covers tick 80.
    let second_child = tree
        .nodes
        .iter()
        .find(|n| n.state.tick == 100)
        .expect("second march child");
    assert!(second_child
        .forced_applied_at_tick
        .iter()
        .any(|f| f.tick == 80));
}

#[test]
fn policy_edges_are_structurally_distinct() {
    let planner = ContingencyPlanner::new(PlannerConfig::default());
    let tree = planner.plan(&mining_problem());
    let wire = serde_json::to_value(&tree.edges).unwrap();
    for edge in wire.as_array().unwrap() {
        let kind = edge["edge_kind"].as_str().unwrap();
        match kind {
            "chosen_action" => assert!(edge["action_id"].is_string()),
            "forced_transition" => assert!(edge["transition_ids"].is_array()),
            other => panic!("unknown edge kind {other}"),
        }
    }
    let forced_applications = tree
        .nodes
        .iter()
        .filter(|n| !n.forced_applied_at_tick.is_empty())
        .count();
    assert!(forced_applications > 0, "the fixture forces transitions");
}

#[test]
fn threshold_crossing_at_node_level_produces_forced_edge() {
    let planner = ContingencyPlanner::new(PlannerConfig::default());
    // The action's own end-of-tick effects cross the threshold, so the
    // forced transition fires at node level and must produce a post-force
    // child before any further chosen actions.
    let problem = PlanningProblem {
        initial: WorldState::new(0)
            .with_property("health", 20)
            .with_property("torch", 5),
        actions: vec![ActionSpec::new("descend", 1, 10).with_effect("torch", -5)],
        transitions: vec![ForcedTransition::new(
            "darkness_panic",
            TriggerMode::Threshold {
                watch_property: "torch".to_string(),
                threshold: 0,
            },
        )
        .with_effect("health", -2)],
        invariants: vec![SafetyInvariant::new("health_floor", "health", 1)],
        goal: GoalSpec::default().require("unreachable", 1),
        horizon_ticks: 40,
    };
    let tree = planner.plan(&problem);
    let forced_edges: Vec<&PolicyEdge> = tree
        .edges
        .iter()
        .filter(|e| matches!(e, PolicyEdge::ForcedTransition { .. }))
        .collect();
    assert!(!forced_edges.is_empty());
    // The pre-force node emits only the forced edge.
    let pre_force = forced_edges[0].from_node();
    assert_eq!(tree.edges_from(pre_force).len(), 1);
}

proptest! {
    /// Trigger evaluation is a pure function of `(tick, properties)`.
    #[test]
    fn prop_trigger_determinism(
        tick in 0u64..500,
        food in -10i64..30,
        light in -5i64..20,
    ) {
        let transitions = vec![
            ForcedTransition::new(
                "hunger",
                TriggerMode::TickInterval { interval: 80, offset: 80 },
            ),
            ForcedTransition::new(
                "mob_damage",
                TriggerMode::Threshold {
                    watch_property: "light_level".to_string(),
                    threshold: 0,
                },
            ),
            ForcedTransition::new(
                "starvation",
                TriggerMode::Threshold {
                    watch_property: "food".to_string(),
                    threshold: 0,
                },
            ),
        ];
        let state = WorldState::new(tick)
            .with_property("food", food)
            .with_property("light_level", light);

        let first = evaluate_triggers(&state, &transitions);
        let second = evaluate_triggers(&state, &transitions);
        prop_assert_eq!(&first, &second);
        let mut sorted = first.clone();
        sorted.sort();
        prop_assert_eq!(first, sorted);
    }

    /// Safety checking returns sorted violation ids and is deterministic.
    #[test]
    fn prop_safety_check_sorted(health in -5i64..25, food in -5i64..25) {
        let invariants = vec![
            SafetyInvariant::new("health_floor", "health", 1),
            SafetyInvariant::new("food_floor", "food", 1),
        ];
        let state = WorldState::new(0)
            .with_property("health", health)
            .with_property("food", food);
        let violated = check_all_safety(&state, &invariants);
        let mut sorted = violated.clone();
        sorted.sort();
        prop_assert_eq!(&violated, &sorted);
        prop_assert_eq!(violated.contains(&"health_floor".to_string()), health < 1);
    }

    /// Node and depth bounds hold for arbitrary small problems.
    #[test]
    fn prop_bounded_tree(
        node_cap in 2usize..40,
        horizon in 10u64..120,
        duration in 1u64..20,
    ) {
        let config = PlannerConfig {
            max_policy_nodes: node_cap,
            max_horizon: 300,
            ..PlannerConfig::default()
        };
        let planner = ContingencyPlanner::new(config);
        let problem = PlanningProblem {
            initial: WorldState::new(0).with_property("health", 20),
            actions: vec![
                ActionSpec::new("a", 1, duration),
                ActionSpec::new("b", 2, duration),
            ],
            transitions: vec![],
            invariants: vec![SafetyInvariant::new("health_floor", "health", 1)],
            goal: GoalSpec::default().require("never", 1),
            horizon_ticks: horizon,
        };
        let tree = planner.plan(&problem);
        prop_assert!(tree.total_nodes <= node_cap);
        prop_assert!(tree.max_depth <= horizon);
    }
}
