//! Core configuration model.
//!
//! Every tunable of the control core lives here with a serde default, so a
//! bare `CoreConfig::default()` is a working configuration and partial YAML
//! files only override what they name.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the control core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoreConfig {
    /// Tick rate in Hz (the control loop runs at ~5 Hz).
    #[serde(default = "default_tick_rate_hz")]
    pub tick_rate_hz: f64,

    /// Belief bus configuration.
    #[serde(default)]
    pub belief: BeliefConfig,

    /// Reflex arbitrator configuration.
    #[serde(default)]
    pub reflex: ReflexConfig,

    /// Contingency planner bounds.
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Acquisition solver configuration.
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    /// Reactive GOAP planner configuration.
    #[serde(default)]
    pub goap: GoapConfig,

    /// Loop breaker configuration.
    #[serde(default)]
    pub loop_breaker: LoopBreakerConfig,

    /// Task history provider configuration.
    #[serde(default)]
    pub task_history: TaskHistoryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_tick_rate_hz() -> f64 {
    5.0
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate_hz(),
            belief: BeliefConfig::default(),
            reflex: ReflexConfig::default(),
            planner: PlannerConfig::default(),
            acquisition: AcquisitionConfig::default(),
            goap: GoapConfig::default(),
            loop_breaker: LoopBreakerConfig::default(),
            task_history: TaskHistoryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Belief bus knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BeliefConfig {
    /// Cap on deltas per envelope; overflow carries to the next flush.
    #[serde(default = "default_max_saliency_events")]
    pub max_saliency_events_per_emission: usize,

    /// Snapshot cadence in ticks after the last emission.
    #[serde(default = "default_snapshot_interval_ticks")]
    pub snapshot_interval_ticks: u64,

    /// Ticks unseen before a visible track demotes to inferred (K1).
    #[serde(default = "default_aging_inferred_after")]
    pub aging_inferred_after: u64,

    /// Ticks unseen before an inferred track demotes to lost (K2).
    #[serde(default = "default_aging_lost_after")]
    pub aging_lost_after: u64,
}

const fn default_max_saliency_events() -> usize {
    8
}

const fn default_snapshot_interval_ticks() -> u64 {
    20
}

const fn default_aging_inferred_after() -> u64 {
    3
}

const fn default_aging_lost_after() -> u64 {
    10
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            max_saliency_events_per_emission: default_max_saliency_events(),
            snapshot_interval_ticks: default_snapshot_interval_ticks(),
            aging_inferred_after: default_aging_inferred_after(),
            aging_lost_after: default_aging_lost_after(),
        }
    }
}

/// Reflex override durations, in ticks at ~5 Hz.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReflexConfig {
    /// Override duration for default and high severities.
    #[serde(default = "default_override_ticks_default")]
    pub override_ticks_default: u64,

    /// Override duration for critical severity.
    #[serde(default = "default_override_ticks_critical")]
    pub override_ticks_critical: u64,
}

const fn default_override_ticks_default() -> u64 {
    10
}

const fn default_override_ticks_critical() -> u64 {
    15
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            override_ticks_default: default_override_ticks_default(),
            override_ticks_critical: default_override_ticks_critical(),
        }
    }
}

/// Contingency planner bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlannerConfig {
    /// Horizon in ticks.
    #[serde(default = "default_max_horizon")]
    pub max_horizon: u64,

    /// Maximum chosen-action children per node.
    #[serde(default = "default_max_branch_factor")]
    pub max_branch_factor: usize,

    /// Hard cap on policy-tree nodes.
    #[serde(default = "default_max_policy_nodes")]
    pub max_policy_nodes: usize,
}

const fn default_max_horizon() -> u64 {
    300
}

const fn default_max_branch_factor() -> usize {
    4
}

const fn default_max_policy_nodes() -> usize {
    512
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_horizon: default_max_horizon(),
            max_branch_factor: default_max_branch_factor(),
            max_policy_nodes: default_max_policy_nodes(),
        }
    }
}

/// Acquisition solver knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AcquisitionConfig {
    /// Deadline for external reasoner calls.
    #[serde(default = "default_reasoner_timeout_ms")]
    pub reasoner_timeout_ms: u64,

    /// On reasoner failure, fall back to the best `available` candidate.
    #[serde(default = "default_fallback_to_available")]
    pub fallback_to_available: bool,

    /// Solver cadence: invoke at most once every this many ticks.
    #[serde(default = "default_solver_cadence_ticks")]
    pub solver_cadence_ticks: u64,
}

const fn default_reasoner_timeout_ms() -> u64 {
    2_000
}

const fn default_fallback_to_available() -> bool {
    true
}

const fn default_solver_cadence_ticks() -> u64 {
    10
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            reasoner_timeout_ms: default_reasoner_timeout_ms(),
            fallback_to_available: default_fallback_to_available(),
            solver_cadence_ticks: default_solver_cadence_ticks(),
        }
    }
}

/// Reactive GOAP planner knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GoapConfig {
    /// Per-call planning budget in milliseconds.
    #[serde(default = "default_plan_budget_ms")]
    pub plan_budget_ms: u64,

    /// Plan cache entry lifetime in ticks.
    #[serde(default = "default_cache_ttl_ticks")]
    pub cache_ttl_ticks: u64,

    /// Hard cap on A* expansions per call.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

const fn default_plan_budget_ms() -> u64 {
    50
}

const fn default_cache_ttl_ticks() -> u64 {
    40
}

const fn default_max_iterations() -> usize {
    2_000
}

impl Default for GoapConfig {
    fn default() -> Self {
        Self {
            plan_budget_ms: default_plan_budget_ms(),
            cache_ttl_ticks: default_cache_ttl_ticks(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Loop breaker knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoopBreakerConfig {
    /// Distinct-task occurrences before an episode fires.
    #[serde(default = "default_loop_threshold")]
    pub threshold: u64,

    /// Sliding detection window.
    #[serde(default = "default_loop_window_ms")]
    pub window_ms: u64,

    /// How long a signature stays suppressed after detection.
    #[serde(default = "default_suppression_ttl_ms")]
    pub suppression_ttl_ms: u64,

    /// Emit episodes without suppressing.
    #[serde(default)]
    pub shadow_mode: bool,

    /// Capacity bound; least-recently-touched signatures evict first.
    #[serde(default = "default_max_signatures")]
    pub max_signatures: usize,
}

const fn default_loop_threshold() -> u64 {
    3
}

const fn default_loop_window_ms() -> u64 {
    300_000
}

const fn default_suppression_ttl_ms() -> u64 {
    600_000
}

const fn default_max_signatures() -> usize {
    256
}

impl Default for LoopBreakerConfig {
    fn default() -> Self {
        Self {
            threshold: default_loop_threshold(),
            window_ms: default_loop_window_ms(),
            suppression_ttl_ms: default_suppression_ttl_ms(),
            shadow_mode: false,
            max_signatures: default_max_signatures(),
        }
    }
}

/// Task history provider knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TaskHistoryConfig {
    /// Cache lifetime.
    #[serde(default = "default_history_ttl_ms")]
    pub ttl_ms: u64,

    /// Hard cap on returned items. Fixed at 50.
    #[serde(default = "default_history_max_limit")]
    pub max_limit: usize,

    /// Planning service base URL; unset selects the null provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_base: Option<String>,

    /// HTTP request timeout.
    #[serde(default = "default_history_timeout_ms")]
    pub request_timeout_ms: u64,
}

const fn default_history_ttl_ms() -> u64 {
    5_000
}

const fn default_history_max_limit() -> usize {
    50
}

const fn default_history_timeout_ms() -> u64 {
    1_500
}

impl Default for TaskHistoryConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_history_ttl_ms(),
            max_limit: default_history_max_limit(),
            endpoint_base: None,
            request_timeout_ms: default_history_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: json or pretty.
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional log directory; unset logs to stdout only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}
