//! Safety reader and reflex arbitrator.
//!
//! The reader is a pure function over belief snapshots. The arbitrator owns
//! the priority-override lifecycle: while an override is active the planner
//! layers are blocked from dispatching.

use crate::domain::models::config::ReflexConfig;
use crate::domain::models::envelope::Snapshot;
use crate::domain::models::reflex::{
    RecommendedAction, ReflexEvent, ReflexSeverity, ThreatAssessment, ThreatSummary,
};
use crate::domain::models::track::{ThreatLevel, Visibility};

/// Derive the threat assessment for one snapshot.
///
/// Tracks with `lost` visibility or `none` threat are excluded. Decision
/// rule: any critical → flee; else any high → evade; else anything at or
/// above low → shield; else none.
pub fn assess_reflex_threats(snapshot: &Snapshot) -> ThreatAssessment {
    let threats: Vec<ThreatSummary> = snapshot
        .tracks
        .iter()
        .filter(|t| t.visibility != Visibility::Lost && t.threat_level != ThreatLevel::None)
        .map(|t| ThreatSummary {
            track_id: t.track_id,
            class_label: t.class_label.clone(),
            threat_level: t.threat_level,
            dist_bucket: t.dist_bucket,
        })
        .collect();

    if threats.is_empty() {
        return ThreatAssessment::clear();
    }

    let has_critical = threats
        .iter()
        .any(|t| t.threat_level == ThreatLevel::Critical);
    let has_high = threats.iter().any(|t| t.threat_level == ThreatLevel::High);

    let recommended_action = if has_critical {
        RecommendedAction::Flee
    } else if has_high {
        RecommendedAction::Evade
    } else {
        RecommendedAction::Shield
    };

    ThreatAssessment {
        has_critical_threat: has_critical,
        threats,
        recommended_action,
    }
}

/// Handler invoked for each reflex lifecycle event.
///
/// Handler failures are isolated: errors are logged and never abort the
/// tick loop.
pub type ReflexHandler = Box<dyn Fn(&ReflexEvent) -> Result<(), String> + Send + Sync>;

/// Priority-override state machine.
pub struct ReflexArbitrator {
    config: ReflexConfig,
    override_end_tick: Option<u64>,
    active_reason: Option<String>,
    handlers: Vec<ReflexHandler>,
}

impl ReflexArbitrator {
    pub fn new(config: ReflexConfig) -> Self {
        Self {
            config,
            override_end_tick: None,
            active_reason: None,
            handlers: Vec::new(),
        }
    }

    /// Register a lifecycle event handler.
    pub fn on_event(&mut self, handler: ReflexHandler) {
        self.handlers.push(handler);
    }

    fn emit(&self, event: &ReflexEvent) {
        for handler in &self.handlers {
            if let Err(err) = handler(event) {
                tracing::warn!(error = %err, "reflex event handler failed; continuing");
            }
        }
    }

    /// Override duration for a severity.
    fn duration_for(&self, severity: ReflexSeverity) -> u64 {
        match severity {
            ReflexSeverity::Critical => self.config.override_ticks_critical,
            ReflexSeverity::High | ReflexSeverity::Default => self.config.override_ticks_default,
        }
    }

    /// Enter (or extend) reflex mode.
    ///
    /// Emits `reflex_enter` only when the override was not already active;
    /// re-entry while active extends the window silently.
    pub fn enter_reflex_mode(&mut self, reason: &str, current_tick: u64, severity: ReflexSeverity) {
        let duration = self.duration_for(severity);
        let was_active = self.is_planner_blocked(current_tick);
        self.override_end_tick = Some(current_tick + duration);
        self.active_reason = Some(reason.to_string());
        if !was_active {
            tracing::info!(reason, ?severity, remaining = duration, "entering reflex mode");
            self.emit(&ReflexEvent::ReflexEnter {
                reason: reason.to_string(),
                severity,
                remaining_ticks: duration,
            });
        }
    }

    /// Advance the override lifecycle for this tick.
    pub fn tick_update(&mut self, current_tick: u64) {
        let Some(end_tick) = self.override_end_tick else {
            return;
        };
        if current_tick >= end_tick {
            let reason = self.active_reason.take().unwrap_or_default();
            self.override_end_tick = None;
            tracing::info!(reason = %reason, "reflex override expired");
            self.emit(&ReflexEvent::ReflexExit { reason });
        } else {
            self.emit(&ReflexEvent::ReflexTick {
                remaining_ticks: end_tick - current_tick,
            });
        }
    }

    /// End the override immediately, emitting `reflex_exit` if active.
    pub fn exit_reflex_mode_early(&mut self) {
        if self.override_end_tick.take().is_some() {
            let reason = self.active_reason.take().unwrap_or_default();
            tracing::info!(reason = %reason, "reflex override cleared early");
            self.emit(&ReflexEvent::ReflexExit { reason });
        }
    }

    /// Whether planner layers are blocked at `current_tick`.
    pub fn is_planner_blocked(&self, current_tick: u64) -> bool {
        self.override_end_tick
            .is_some_and(|end_tick| current_tick < end_tick)
    }
}
