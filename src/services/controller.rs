//! Tick-loop controller.
//!
//! The composition root of the control core: owns one belief bus, one
//! reflex arbitrator, one GOAP planner, one acquisition solver, one
//! contingency planner, one loop breaker, one history service, and one
//! execution gateway. Per tick it runs the phases in a fixed order:
//! ingest, assess, plan (unless blocked), dispatch at most one action,
//! emit the belief envelope.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::models::acquisition::{AcquisitionObservation, AcquisitionSolution};
use crate::domain::models::action::{ActionRequest, Origin};
use crate::domain::models::config::CoreConfig;
use crate::domain::models::envelope::Envelope;
use crate::domain::models::policy::WorldState;
use crate::domain::models::reflex::{RecommendedAction, ReflexSeverity};
use crate::domain::models::signature::{FailureAttribution, FailureCategory, FailureSignature};
use crate::domain::models::track::ThreatLevel;
use crate::domain::ports::{ActionSink, ObservationProvider, ReasoningService};
use crate::services::acquisition::AcquisitionSolver;
use crate::services::belief_bus::BeliefBus;
use crate::services::contingency::{ContingencyPlanner, PlanningProblem};
use crate::services::gateway::ExecutionGateway;
use crate::services::goap::{
    check_safety_reflexes, execute_safety_reflex, GoapAction, GoapContext, GoapPlanner, Subgoal,
};
use crate::services::loop_breaker::LoopBreaker;
use crate::services::reflex::{assess_reflex_threats, ReflexArbitrator};
use crate::services::task_history::TaskHistoryService;

/// Report of what one tick did.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub tick: u64,
    pub planner_blocked: bool,
    pub dispatched_action: Option<String>,
    pub envelope_seq: u64,
    pub track_count: usize,
}

/// Owns the control-core subsystems and drives them at tick cadence.
pub struct Controller {
    config: CoreConfig,
    bus: BeliefBus,
    arbitrator: ReflexArbitrator,
    goap: GoapPlanner,
    solver: AcquisitionSolver,
    contingency: ContingencyPlanner,
    loop_breaker: LoopBreaker,
    history: TaskHistoryService,
    gateway: Arc<ExecutionGateway>,
    observations: Arc<dyn ObservationProvider>,
    envelope_tx: Option<mpsc::Sender<Envelope>>,
    /// Agent body state fed by the embodiment layer.
    agent_state: WorldState,
    current_subgoal: Option<Subgoal>,
    /// Standing acquisition query, solved at the lower solver cadence.
    acquisition_request: Option<(AcquisitionObservation, uuid::Uuid)>,
    last_acquisition: Option<AcquisitionSolution>,
    next_seq: u64,
}

/// Everything the controller needs at construction.
pub struct ControllerDeps {
    pub bot_id: String,
    pub stream_id: String,
    pub observations: Arc<dyn ObservationProvider>,
    pub action_sink: Arc<dyn ActionSink>,
    pub reasoner: Arc<dyn ReasoningService>,
    pub history: TaskHistoryService,
    pub goap_actions: Vec<GoapAction>,
}

impl Controller {
    pub fn new(config: CoreConfig, deps: ControllerDeps) -> Self {
        let bus = BeliefBus::new(&deps.bot_id, &deps.stream_id, config.belief.clone());
        let arbitrator = ReflexArbitrator::new(config.reflex.clone());
        let goap = GoapPlanner::new(config.goap.clone(), deps.goap_actions);
        let solver = AcquisitionSolver::new(config.acquisition.clone(), deps.reasoner);
        let contingency = ContingencyPlanner::new(config.planner.clone());
        let loop_breaker = LoopBreaker::new(config.loop_breaker.clone());
        let gateway = Arc::new(ExecutionGateway::new(deps.action_sink));
        Self {
            config,
            bus,
            arbitrator,
            goap,
            solver,
            contingency,
            loop_breaker,
            history: deps.history,
            gateway,
            observations: deps.observations,
            envelope_tx: None,
            agent_state: WorldState::new(0),
            current_subgoal: None,
            acquisition_request: None,
            last_acquisition: None,
            next_seq: 0,
        }
    }

    /// Attach the external observer stream for belief envelopes.
    pub fn with_envelope_sender(mut self, sender: mpsc::Sender<Envelope>) -> Self {
        self.envelope_tx = Some(sender);
        self
    }

    /// Replace the agent body state (health, food, air, inventory counts).
    pub fn set_agent_state(&mut self, state: WorldState) {
        self.agent_state = state;
    }

    /// Set the reactive subgoal the GOAP planner works toward.
    pub fn set_subgoal(&mut self, subgoal: Option<Subgoal>) {
        self.current_subgoal = subgoal;
    }

    /// Register a standing acquisition query, attributed to a task for
    /// loop-breaker bookkeeping. Solved at the solver cadence.
    pub fn request_acquisition(&mut self, observation: AcquisitionObservation, task_id: uuid::Uuid) {
        self.acquisition_request = Some((observation, task_id));
    }

    /// Most recent acquisition solution, if any.
    pub fn last_acquisition(&self) -> Option<&AcquisitionSolution> {
        self.last_acquisition.as_ref()
    }

    /// Report how an executed strategy worked out, updating the prior for
    /// its `(strategy, context)` pair.
    pub fn record_acquisition_outcome(
        &mut self,
        candidate: &crate::domain::models::StrategyCandidate,
        success: bool,
    ) {
        let context_key = candidate.context_snapshot.context_key();
        self.solver
            .priors_mut()
            .record(candidate.strategy, &context_key, success);
    }

    /// Shared gateway handle.
    pub fn gateway(&self) -> Arc<ExecutionGateway> {
        self.gateway.clone()
    }

    /// The loop breaker, for failure reporting from executors.
    pub fn loop_breaker_mut(&mut self) -> &mut LoopBreaker {
        &mut self.loop_breaker
    }

    /// The history service.
    pub fn history(&self) -> &TaskHistoryService {
        &self.history
    }

    /// Acquisition solver access for goal-level callers.
    pub fn solver(&self) -> &AcquisitionSolver {
        &self.solver
    }

    /// Compute a contingency policy on the current planner bounds.
    pub fn plan_contingency(&self, problem: &PlanningProblem) -> crate::domain::models::PolicyTree {
        self.contingency.plan(problem)
    }

    /// Peak threat level across the assessment.
    fn peak_threat(levels: &[ThreatLevel]) -> ThreatLevel {
        levels.iter().copied().max().unwrap_or(ThreatLevel::None)
    }

    /// Run one tick of the §-fixed phase order.
    pub async fn tick(&mut self, tick: u64) -> TickReport {
        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };

        // Phase 1: ingest + aging.
        match self.observations.observe(tick).await {
            Ok(batch) => self.bus.ingest(&batch),
            Err(err) => {
                tracing::warn!(tick, error = %err, "observation failed; aging only");
                self.bus
                    .ingest(&crate::domain::models::EvidenceBatch::new(tick));
            }
        }
        report.track_count = self.bus.track_count();

        // Phase 2: assess and drive the override lifecycle.
        let snapshot = self.bus.snapshot();
        let assessment = assess_reflex_threats(&snapshot);
        let peak = Self::peak_threat(
            &assessment
                .threats
                .iter()
                .map(|t| t.threat_level)
                .collect::<Vec<_>>(),
        );
        if assessment.has_critical_threat {
            self.arbitrator
                .enter_reflex_mode("critical_threat", tick, ReflexSeverity::Critical);
        } else if peak == ThreatLevel::High {
            self.arbitrator
                .enter_reflex_mode("high_threat", tick, ReflexSeverity::High);
        }
        self.arbitrator.tick_update(tick);
        let blocked = self.arbitrator.is_planner_blocked(tick);
        self.gateway.set_planner_blocked(blocked);
        report.planner_blocked = blocked;

        // Phase 3 + 4: plan and dispatch at most one world mutation. The
        // acquisition solver runs at its lower cadence alongside planning.
        if blocked {
            report.dispatched_action = self.dispatch_reflex(&assessment.recommended_action).await;
        } else {
            report.dispatched_action = self.plan_and_dispatch(tick, peak).await;
            if self.solver_due(tick) {
                self.solve_pending_acquisition().await;
            }
        }

        // Phase 5: emit the belief envelope.
        let envelope = self.bus.build_envelope(self.next_seq);
        report.envelope_seq = envelope.seq;
        self.next_seq += 1;
        if let Some(ref sender) = self.envelope_tx {
            if let Err(err) = sender.try_send(envelope) {
                tracing::warn!(tick, error = %err, "envelope channel full; dropping emission");
            }
        }

        report
    }

    /// Dispatch the reflex response while the override is active.
    async fn dispatch_reflex(&self, recommended: &RecommendedAction) -> Option<String> {
        let action_type = match recommended {
            RecommendedAction::Flee => "flee",
            RecommendedAction::Evade => "move_to",
            RecommendedAction::Shield => "shield",
            RecommendedAction::None => return None,
        };
        let request = ActionRequest::new(
            Origin::Reflex,
            action_type,
            serde_json::json!({"reason": "reflex_override"}),
        );
        let outcome = if action_type == "shield" {
            self.gateway.execute_via_gateway(&request, None).await
        } else {
            let lease = self.gateway.acquire_navigation_lease();
            self.gateway.execute_via_gateway(&request, Some(&lease)).await
        };
        outcome.success.then(|| action_type.to_string())
    }

    /// Unblocked path: safety reflexes, then the reactive plan head.
    async fn plan_and_dispatch(&mut self, tick: u64, peak: ThreatLevel) -> Option<String> {
        let mut state = self.agent_state.clone();
        state.set_property("threat", i64::from(peak as u8));
        let context = GoapContext {
            threat: peak,
            hunger: 20 - state.property("food").clamp(0, 20),
            opportunity: std::collections::BTreeMap::new(),
        };

        if let Some(reflex) = check_safety_reflexes(&state, &context) {
            let outcome = execute_safety_reflex(&reflex, &self.gateway).await;
            if outcome.success {
                return Some(reflex.action_type);
            }
        }

        let subgoal = self.current_subgoal.clone()?;
        let plan = self.goap.plan_to(&subgoal, &state, &context, tick)?;
        let head = plan.action_ids.first()?.clone();
        let request = ActionRequest::new(Origin::Reactive, head.clone(), serde_json::json!({}));
        let outcome = if matches!(head.as_str(), "move_to" | "follow" | "flee" | "swim_to") {
            let lease = self.gateway.acquire_navigation_lease();
            self.gateway.execute_via_gateway(&request, Some(&lease)).await
        } else {
            self.gateway.execute_via_gateway(&request, None).await
        };
        outcome.success.then_some(head)
    }

    /// Whether the solver should run this tick (lower cadence than GOAP).
    pub fn solver_due(&self, tick: u64) -> bool {
        let cadence = self.config.acquisition.solver_cadence_ticks.max(1);
        tick % cadence == 0
    }

    /// Solve the standing acquisition query; failures feed the loop
    /// breaker under an acquisition signature.
    async fn solve_pending_acquisition(&mut self) {
        let Some((observation, task_id)) = self.acquisition_request.clone() else {
            return;
        };
        match self.solver.solve(&observation).await {
            Ok(solution) => {
                tracing::debug!(
                    bundle_id = %solution.bundle_id,
                    fallback = solution.used_fallback,
                    "acquisition solved"
                );
                self.last_acquisition = Some(solution);
            }
            Err(err) => {
                let reason_code = match &err {
                    crate::domain::errors::CoreError::DeadlineExceeded { .. } => "reasoner_timeout",
                    crate::domain::errors::CoreError::TransportFailure(_) => "reasoner_unreachable",
                    crate::domain::errors::CoreError::PreconditionUnmet(_) => "no_candidates",
                    _ => "solve_failed",
                };
                let signature = FailureSignature::new(
                    FailureCategory::Acquisition,
                    "acquire_item",
                    Some(&observation.target_item),
                    reason_code,
                );
                if let Some(episode) = self
                    .loop_breaker
                    .record_failure(&signature, &FailureAttribution::new(task_id))
                {
                    tracing::warn!(
                        signature_id = %episode.signature.signature_id,
                        "acquisition failure loop detected; dropping standing query"
                    );
                    self.acquisition_request = None;
                }
            }
        }
    }
}
