//! Cortex - Embodied Agent Control Core
//!
//! Bridges low-level world perception to bounded, deterministic
//! decision-making for a tick-driven embodied agent:
//! - Entity belief bus with byte-stable snapshot/delta envelopes
//! - Reflex arbitrator with priority overrides
//! - Bounded contingency planning against forced world transitions
//! - Prior-weighted acquisition strategy selection
//! - Reactive GOAP planning with safety reflexes
//! - Single-chokepoint execution gateway

pub mod adapters;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::CoreConfig;
pub use services::{Controller, ControllerDeps};
