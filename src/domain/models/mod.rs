//! Domain models for the control core.

pub mod acquisition;
pub mod action;
pub mod config;
pub mod envelope;
pub mod policy;
pub mod reflex;
pub mod signature;
pub mod task;
pub mod track;

pub use acquisition::{
    AcquisitionContext, AcquisitionObservation, AcquisitionSolution, Feasibility, NearbyEntity,
    PriorStore, RankedCandidate, Strategy, StrategyCandidate,
};
pub use action::{ActionRequest, DispatchOutcome, NavigationLease, Origin};
pub use config::{
    AcquisitionConfig, BeliefConfig, CoreConfig, GoapConfig, LoggingConfig, LoopBreakerConfig,
    PlannerConfig, ReflexConfig, TaskHistoryConfig,
};
pub use envelope::{Envelope, SaliencyEvent, Snapshot, TrackSnapshot};
pub use policy::{
    ActionSpec, ForcedTransition, GoalSpec, PolicyEdge, PolicyNode, PolicyNodeId, PolicyTree,
    SafetyInvariant, TriggerMode, WorldState,
};
pub use reflex::{
    RecommendedAction, ReflexEvent, ReflexSeverity, ThreatAssessment, ThreatSummary,
};
pub use signature::{FailureAttribution, FailureCategory, FailureSignature, LoopEpisode};
pub use task::{
    HistorySnapshot, HistorySource, RecentTaskItem, Task, TaskMetadata, TaskStatus, TaskStep,
};
pub use track::{
    distance_to_bucket, EvidenceBatch, EvidenceItem, LineOfSight, PosBucket, ThreatLevel, Track,
    TrackId, Visibility,
};
