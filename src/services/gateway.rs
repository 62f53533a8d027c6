//! Execution gateway.
//!
//! The single chokepoint for world-mutating actions. Every dispatch carries
//! an origin tag; while a reflex override is active, planner-side origins
//! are refused. The gateway is the only caller of `ActionSink::submit` —
//! the drift-guard test scans the source tree to keep it that way.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::action::{ActionRequest, DispatchOutcome, NavigationLease, Origin};
use crate::domain::ports::ActionSink;

/// Default per-dispatch timeout when the request does not carry one.
const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Action types that require a navigation lease in scope.
const NAVIGATION_ACTIONS: &[&str] = &["move_to", "follow", "flee", "swim_to"];

/// Per-origin dispatch counters.
#[derive(Debug, Default, Clone)]
pub struct DispatchStats {
    pub submitted: u64,
    pub refused: u64,
    pub failed: u64,
}

/// Single world-mutation chokepoint.
pub struct ExecutionGateway {
    sink: Arc<dyn ActionSink>,
    /// Set by the controller while the reflex override is active.
    planner_blocked: AtomicBool,
    stats: std::sync::Mutex<BTreeMap<Origin, DispatchStats>>,
    lease_acquired_total: Arc<AtomicU64>,
    lease_active: Arc<AtomicU64>,
    /// Cooperative cancellation flag observed at suspension points.
    cancel_pending: AtomicBool,
}

impl ExecutionGateway {
    pub fn new(sink: Arc<dyn ActionSink>) -> Self {
        Self {
            sink,
            planner_blocked: AtomicBool::new(false),
            stats: std::sync::Mutex::new(BTreeMap::new()),
            lease_acquired_total: Arc::new(AtomicU64::new(0)),
            lease_active: Arc::new(AtomicU64::new(0)),
            cancel_pending: AtomicBool::new(false),
        }
    }

    /// Mirror the arbitrator's override state into the gateway.
    pub fn set_planner_blocked(&self, blocked: bool) {
        self.planner_blocked.store(blocked, Ordering::SeqCst);
    }

    /// Request cancellation of the in-flight operation; observed at the
    /// next suspension point.
    pub fn request_cancellation(&self) {
        self.cancel_pending.store(true, Ordering::SeqCst);
    }

    /// Clear a pending cancellation, returning whether one was set.
    pub fn take_cancellation(&self) -> bool {
        self.cancel_pending.swap(false, Ordering::SeqCst)
    }

    /// Acquire a navigation lease scope.
    ///
    /// Navigation primitives must run inside a lease; the count ratchet
    /// never decreases, so tests can assert the pairing.
    pub fn acquire_navigation_lease(&self) -> NavigationLease {
        NavigationLease::acquire(self.lease_acquired_total.clone(), self.lease_active.clone())
    }

    fn record(&self, origin: Origin, update: impl FnOnce(&mut DispatchStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            update(stats.entry(origin).or_default());
        }
    }

    /// Snapshot of per-origin dispatch counters.
    pub fn stats(&self) -> BTreeMap<Origin, DispatchStats> {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Leases ever acquired (monotone).
    pub fn lease_acquired_total(&self) -> u64 {
        self.lease_acquired_total.load(Ordering::SeqCst)
    }

    /// Leases currently in scope.
    pub fn lease_active(&self) -> u64 {
        self.lease_active.load(Ordering::SeqCst)
    }

    fn blocked_reason(&self, origin: Origin) -> Option<String> {
        if self.planner_blocked.load(Ordering::SeqCst)
            && matches!(origin, Origin::Planner | Origin::Reactive)
        {
            Some(format!(
                "reflex override active; {} dispatch refused",
                origin.as_str()
            ))
        } else {
            None
        }
    }

    /// Dispatch one world-mutating action.
    ///
    /// Navigation action types must pass the active lease; calls without
    /// one are refused before reaching the sink.
    pub async fn execute_via_gateway(
        &self,
        request: &ActionRequest,
        lease: Option<&NavigationLease>,
    ) -> DispatchOutcome {
        if let Some(reason) = self.blocked_reason(request.origin) {
            self.record(request.origin, |s| s.refused += 1);
            tracing::debug!(origin = request.origin.as_str(), reason = %reason, "dispatch refused");
            return DispatchOutcome::refused(reason);
        }

        if NAVIGATION_ACTIONS.contains(&request.action_type.as_str()) && lease.is_none() {
            self.record(request.origin, |s| s.refused += 1);
            return DispatchOutcome::refused(format!(
                "navigation action '{}' outside lease scope",
                request.action_type
            ));
        }

        if self.take_cancellation() {
            self.record(request.origin, |s| s.refused += 1);
            return DispatchOutcome::refused("operation cancelled".to_string());
        }

        let timeout = request
            .timeout_ms
            .map_or(DEFAULT_DISPATCH_TIMEOUT, Duration::from_millis);

        match self.submit(request, timeout).await {
            Ok(result) => {
                self.record(request.origin, |s| s.submitted += 1);
                DispatchOutcome::ok(result)
            }
            Err(err) => {
                self.record(request.origin, |s| s.failed += 1);
                tracing::warn!(
                    origin = request.origin.as_str(),
                    action = %request.action_type,
                    error = %err,
                    "dispatch failed"
                );
                DispatchOutcome::refused(err.to_string())
            }
        }
    }

    async fn submit(
        &self,
        request: &ActionRequest,
        timeout: Duration,
    ) -> CoreResult<serde_json::Value> {
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = timeout.as_millis() as u64;
        match tokio::time::timeout(
            timeout,
            self.sink
                .submit(&request.action_type, &request.parameters, timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(CoreError::DeadlineExceeded {
                operation: format!("dispatch {}", request.action_type),
                waited_ms: timeout_ms,
            }),
        }
    }
}
