//! Adaptive governance: circuit breaking and policy scaling

pub mod breaker;
pub mod policy;

pub use breaker::{
    evaluate, recovery_time, BreakerDecision, BreakerInputs, BreakerState, CircuitBreaker,
};
pub use policy::{
    adjust, allocate, assess_extreme_load, assess_resource_exhaustion, required_actions,
    DegradedService, EvolutionDirection, GovernanceAction, GovernanceAdjustment,
    GovernanceRules, GovernanceState, GovernanceThresholds, LoadAssessment, LoadMetrics,
    LoadTier, QueueHealthInputs, ResourceAllocation, ResourceMetrics, ResourcePriority,
    ResourceRequest, StabilityTier, SystemScores,
};
