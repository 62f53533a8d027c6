//! Execution gateway vocabulary.
//!
//! Every world-mutating call flows through the gateway as an
//! [`ActionRequest`] tagged with its origin. Navigation primitives are only
//! reachable through a [`NavigationLease`] scope.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Which layer requested a world mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// The task executor wrapper.
    Executor,
    /// The reactive (GOAP) executor.
    Reactive,
    /// Safety reflexes; always allowed through.
    Reflex,
    /// The contingency planner.
    Planner,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Reactive => "reactive",
            Self::Reflex => "reflex",
            Self::Planner => "planner",
        }
    }

    /// Dispatch order within a tick: reflex before reactive before planner;
    /// executor drains last.
    pub fn phase_rank(&self) -> u8 {
        match self {
            Self::Reflex => 0,
            Self::Reactive => 1,
            Self::Planner => 2,
            Self::Executor => 3,
        }
    }
}

/// A typed action envelope bound for the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub origin: Origin,
    pub action_type: String,
    pub parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ActionRequest {
    pub fn new(origin: Origin, action_type: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            origin,
            action_type: action_type.into(),
            parameters,
            timeout_ms: None,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Result of a gateway dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchOutcome {
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn refused(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// RAII scope for navigation primitives.
///
/// The gateway is the only constructor. The shared counter ratchets up on
/// acquisition and never decrements, so tests can assert that every
/// navigation call sat inside exactly one lease scope. The active-lease
/// count drops on any exit path via `Drop`.
#[derive(Debug)]
pub struct NavigationLease {
    acquired_total: Arc<AtomicU64>,
    active: Arc<AtomicU64>,
}

impl NavigationLease {
    /// Gateway-internal constructor.
    pub(crate) fn acquire(acquired_total: Arc<AtomicU64>, active: Arc<AtomicU64>) -> Self {
        acquired_total.fetch_add(1, Ordering::SeqCst);
        active.fetch_add(1, Ordering::SeqCst);
        Self {
            acquired_total,
            active,
        }
    }

    /// Monotone count of leases ever acquired.
    pub fn acquired_total(&self) -> u64 {
        self.acquired_total.load(Ordering::SeqCst)
    }
}

impl Drop for NavigationLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_rank_ordering() {
        assert!(Origin::Reflex.phase_rank() < Origin::Reactive.phase_rank());
        assert!(Origin::Reactive.phase_rank() < Origin::Planner.phase_rank());
    }

    #[test]
    fn test_lease_ratchet_and_release() {
        let total = Arc::new(AtomicU64::new(0));
        let active = Arc::new(AtomicU64::new(0));
        {
            let lease = NavigationLease::acquire(total.clone(), active.clone());
            assert_eq!(lease.acquired_total(), 1);
            assert_eq!(active.load(Ordering::SeqCst), 1);
        }
        // Dropped on scope exit: active released, ratchet stays.
        assert_eq!(total.load(Ordering::SeqCst), 1);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_dispatch_outcome_helpers() {
        let ok = DispatchOutcome::ok(serde_json::json!({"moved": true}));
        assert!(ok.success);
        let refused = DispatchOutcome::refused("reflex override active");
        assert!(!refused.success);
        assert!(refused.error.unwrap().contains("reflex"));
    }
}
