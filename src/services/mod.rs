//! Service layer: the control-core subsystems.

pub mod acquisition;
pub mod belief_bus;
pub mod canonical;
pub mod contingency;
pub mod controller;
pub mod gateway;
pub mod goap;
pub mod loop_breaker;
pub mod reflex;
pub mod task_history;

pub use acquisition::AcquisitionSolver;
pub use belief_bus::BeliefBus;
pub use contingency::{ContingencyPlanner, PlanningProblem};
pub use controller::{Controller, ControllerDeps, TickReport};
pub use gateway::ExecutionGateway;
pub use goap::{GoapAction, GoapContext, GoapPlanner, Plan, Subgoal};
pub use loop_breaker::LoopBreaker;
pub use reflex::{assess_reflex_threats, ReflexArbitrator};
pub use task_history::{
    DirectTaskHistoryProvider, NullTaskHistoryProvider, TaskHistoryProvider, TaskHistoryService,
};
