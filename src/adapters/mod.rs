//! Adapters for external collaborators.

pub mod planning_http;
pub mod reasoner;
pub mod stubs;

pub use planning_http::HttpTaskHistoryProvider;
pub use reasoner::{HttpReasoningService, RetryPolicy, ScriptedReasoningService};
pub use stubs::{NullActionSink, ScriptedObservationProvider};
