//! Adaptive governance policy
//!
//! Scales resource grants, rules and thresholds from aggregate system state,
//! and maps that state to the actions operators or automation should take.

use serde::{Deserialize, Serialize};

/// Queue depth above which load is high
const HIGH_LOAD_DEPTH: usize = 1000;
/// Queue depth above which load is medium
const MEDIUM_LOAD_DEPTH: usize = 100;

/// Alignment below which monitoring is tightened
const MIN_ALIGNMENT: f64 = 0.7;

const EXTREME_RPS: f64 = 5000.0;
const EXTREME_QUEUE_SIZE: usize = 1000;
const EXHAUSTION_RATIO: f64 = 0.9;

/// Reference processing time for the speed score (30s)
const REFERENCE_PROCESSING_MS: f64 = 30_000.0;
/// Reference queue size for the efficiency score
const REFERENCE_QUEUE_SIZE: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourcePriority {
    High,
    Medium,
    Low,
}

impl ResourcePriority {
    pub fn multiplier(self) -> f64 {
        match self {
            ResourcePriority::High => 1.5,
            ResourcePriority::Medium => 1.0,
            ResourcePriority::Low => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: f64,
    pub memory: f64,
    pub connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceAllocation {
    pub cpu: f64,
    pub memory: f64,
    pub connections: u32,
    pub priority: ResourcePriority,
}

/// Scale a request by priority; connection counts round up
pub fn allocate(request: &ResourceRequest, priority: ResourcePriority) -> ResourceAllocation {
    let multiplier = priority.multiplier();
    ResourceAllocation {
        cpu: request.cpu * multiplier,
        memory: request.memory * multiplier,
        connections: (request.connections as f64 * multiplier).ceil() as u32,
        priority,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadTier {
    High,
    Medium,
    Low,
}

impl LoadTier {
    pub fn multiplier(self) -> f64 {
        match self {
            LoadTier::High => 1.2,
            LoadTier::Medium => 1.0,
            LoadTier::Low => 0.8,
        }
    }

    pub fn from_queue_depth(depth: usize) -> Self {
        if depth > HIGH_LOAD_DEPTH {
            LoadTier::High
        } else if depth > MEDIUM_LOAD_DEPTH {
            LoadTier::Medium
        } else {
            LoadTier::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityTier {
    Stable,
    Degraded,
    Unstable,
}

impl StabilityTier {
    pub fn multiplier(self) -> f64 {
        match self {
            StabilityTier::Stable => 1.0,
            StabilityTier::Degraded => 0.8,
            StabilityTier::Unstable => 0.6,
        }
    }

    pub fn from_score(stability: f64) -> Self {
        if stability >= 0.9 {
            StabilityTier::Stable
        } else if stability >= 0.7 {
            StabilityTier::Degraded
        } else {
            StabilityTier::Unstable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionDirection {
    Rapid,
    Gradual,
    Stable,
}

impl EvolutionDirection {
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.5 {
            EvolutionDirection::Rapid
        } else if rate > 0.2 {
            EvolutionDirection::Gradual
        } else {
            EvolutionDirection::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GovernanceRules {
    pub alignment_threshold: f64,
    pub stability_threshold: f64,
    pub evolution_rate_limit: f64,
}

impl GovernanceRules {
    pub const BASE: GovernanceRules = GovernanceRules {
        alignment_threshold: 0.7,
        stability_threshold: 0.8,
        evolution_rate_limit: 0.5,
    };

    pub fn scaled_for(load: LoadTier) -> Self {
        let m = load.multiplier();
        Self {
            alignment_threshold: Self::BASE.alignment_threshold * m,
            stability_threshold: Self::BASE.stability_threshold * m,
            evolution_rate_limit: Self::BASE.evolution_rate_limit * m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GovernanceThresholds {
    pub error_rate: f64,
    pub latency_ms: f64,
    pub resource_usage: f64,
}

impl GovernanceThresholds {
    pub const BASE: GovernanceThresholds = GovernanceThresholds {
        error_rate: 0.1,
        latency_ms: 1000.0,
        resource_usage: 0.8,
    };

    pub fn scaled_for(stability: StabilityTier) -> Self {
        let m = stability.multiplier();
        Self {
            error_rate: Self::BASE.error_rate * m,
            latency_ms: Self::BASE.latency_ms * m,
            resource_usage: Self::BASE.resource_usage * m,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernanceAction {
    IncreaseMonitoring,
    AdjustThresholds,
    ThrottleChanges,
    IncreaseValidation,
    ThrottleRequests,
    ScaleResources,
    ScaleUp,
    CleanupResources,
}

impl GovernanceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            GovernanceAction::IncreaseMonitoring => "increase_monitoring",
            GovernanceAction::AdjustThresholds => "adjust_thresholds",
            GovernanceAction::ThrottleChanges => "throttle_changes",
            GovernanceAction::IncreaseValidation => "increase_validation",
            GovernanceAction::ThrottleRequests => "throttle_requests",
            GovernanceAction::ScaleResources => "scale_resources",
            GovernanceAction::ScaleUp => "scale_up",
            GovernanceAction::CleanupResources => "cleanup_resources",
        }
    }
}

/// Aggregate state the rule and threshold scaling is derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GovernanceState {
    pub alignment: f64,
    pub stability: StabilityTier,
    pub evolution: EvolutionDirection,
    pub load: LoadTier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernanceAdjustment {
    pub rules: GovernanceRules,
    pub thresholds: GovernanceThresholds,
    pub actions: Vec<GovernanceAction>,
}

pub fn required_actions(state: &GovernanceState) -> Vec<GovernanceAction> {
    let mut actions = Vec::new();
    if state.alignment < MIN_ALIGNMENT {
        actions.push(GovernanceAction::IncreaseMonitoring);
        actions.push(GovernanceAction::AdjustThresholds);
    }
    if state.evolution == EvolutionDirection::Rapid {
        actions.push(GovernanceAction::ThrottleChanges);
        actions.push(GovernanceAction::IncreaseValidation);
    }
    actions
}

pub fn adjust(state: &GovernanceState) -> GovernanceAdjustment {
    GovernanceAdjustment {
        rules: GovernanceRules::scaled_for(state.load),
        thresholds: GovernanceThresholds::scaled_for(state.stability),
        actions: required_actions(state),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub requests_per_second: f64,
    pub queue_size: usize,
    pub memory_usage: f64,
    pub cpu_usage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedService {
    ApiGateway,
    MessageQueue,
    MemoryIntensiveService,
    CpuIntensiveService,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadAssessment {
    pub actions: Vec<GovernanceAction>,
    pub degraded_services: Vec<DegradedService>,
}

pub fn assess_extreme_load(metrics: &LoadMetrics) -> LoadAssessment {
    let mut actions = Vec::new();
    if metrics.requests_per_second > EXTREME_RPS {
        actions.push(GovernanceAction::ThrottleRequests);
    }
    if metrics.memory_usage > EXHAUSTION_RATIO || metrics.cpu_usage > EXHAUSTION_RATIO {
        actions.push(GovernanceAction::ScaleResources);
    }

    let mut degraded_services = Vec::new();
    if metrics.requests_per_second > EXTREME_RPS {
        degraded_services.push(DegradedService::ApiGateway);
    }
    if metrics.queue_size > EXTREME_QUEUE_SIZE {
        degraded_services.push(DegradedService::MessageQueue);
    }
    if metrics.memory_usage > EXHAUSTION_RATIO {
        degraded_services.push(DegradedService::MemoryIntensiveService);
    }
    if metrics.cpu_usage > EXHAUSTION_RATIO {
        degraded_services.push(DegradedService::CpuIntensiveService);
    }

    LoadAssessment {
        actions,
        degraded_services,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub memory: f64,
    pub cpu: f64,
    pub disk: f64,
}

pub fn assess_resource_exhaustion(metrics: &ResourceMetrics) -> Vec<GovernanceAction> {
    let mut actions = Vec::new();
    if metrics.memory > EXHAUSTION_RATIO || metrics.cpu > EXHAUSTION_RATIO {
        actions.push(GovernanceAction::ScaleUp);
    }
    if metrics.disk > EXHAUSTION_RATIO {
        actions.push(GovernanceAction::CleanupResources);
    }
    actions
}

/// Queue health signals the system scores are computed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueHealthInputs {
    /// Failed / processed, in [0, 1]
    pub error_rate: f64,
    pub avg_processing_ms: f64,
    /// Retries / processed, in [0, 1]
    pub retry_rate: f64,
    pub queue_size: usize,
    /// Completed / processed, in [0, 1]
    pub processing_rate: f64,
}

/// Derived health scores, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SystemScores {
    pub alignment: f64,
    pub stability: f64,
    pub evolution_rate: f64,
    pub efficiency: f64,
}

impl SystemScores {
    pub fn from_queue(inputs: &QueueHealthInputs) -> Self {
        let error_rate = unit(inputs.error_rate);
        let retry_rate = unit(inputs.retry_rate);
        let speed = if inputs.avg_processing_ms > 0.0 {
            (REFERENCE_PROCESSING_MS / inputs.avg_processing_ms).min(1.0)
        } else {
            1.0
        };
        let backlog = if inputs.queue_size > 0 {
            (REFERENCE_QUEUE_SIZE / inputs.queue_size as f64).min(1.0)
        } else {
            1.0
        };

        Self {
            alignment: 0.4 * (1.0 - error_rate) + 0.3 * speed + 0.3 * (1.0 - retry_rate),
            stability: ((1.0 - error_rate) + speed) / 2.0,
            evolution_rate: (retry_rate * 2.0).min(1.0),
            efficiency: (backlog + unit(inputs.processing_rate)) / 2.0,
        }
    }

    /// Governance state at the given queue depth
    pub fn state(&self, queue_depth: usize) -> GovernanceState {
        GovernanceState {
            alignment: self.alignment,
            stability: StabilityTier::from_score(self.stability),
            evolution: EvolutionDirection::from_rate(self.evolution_rate),
            load: LoadTier::from_queue_depth(queue_depth),
        }
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_rounds_connections_up() {
        let request = ResourceRequest {
            cpu: 2.0,
            memory: 512.0,
            connections: 3,
        };

        let high = allocate(&request, ResourcePriority::High);
        assert_eq!(high.cpu, 3.0);
        assert_eq!(high.memory, 768.0);
        assert_eq!(high.connections, 5);

        let low = allocate(&request, ResourcePriority::Low);
        assert_eq!(low.connections, 2);
        assert_eq!(low.cpu, 1.0);
    }

    #[test]
    fn test_rules_and_thresholds_scale_with_tiers() {
        let rules = GovernanceRules::scaled_for(LoadTier::High);
        assert!((rules.alignment_threshold - 0.84).abs() < 1e-12);
        assert!((rules.evolution_rate_limit - 0.6).abs() < 1e-12);

        let thresholds = GovernanceThresholds::scaled_for(StabilityTier::Unstable);
        assert!((thresholds.error_rate - 0.06).abs() < 1e-12);
        assert!((thresholds.latency_ms - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_required_actions_table() {
        let calm = GovernanceState {
            alignment: 0.9,
            stability: StabilityTier::Stable,
            evolution: EvolutionDirection::Stable,
            load: LoadTier::Low,
        };
        assert!(required_actions(&calm).is_empty());

        let troubled = GovernanceState {
            alignment: 0.5,
            evolution: EvolutionDirection::Rapid,
            ..calm
        };
        assert_eq!(
            required_actions(&troubled),
            vec![
                GovernanceAction::IncreaseMonitoring,
                GovernanceAction::AdjustThresholds,
                GovernanceAction::ThrottleChanges,
                GovernanceAction::IncreaseValidation,
            ]
        );
    }

    #[test]
    fn test_extreme_load_assessment() {
        let assessment = assess_extreme_load(&LoadMetrics {
            requests_per_second: 6000.0,
            queue_size: 1500,
            memory_usage: 0.95,
            cpu_usage: 0.95,
        });

        assert_eq!(
            assessment.actions,
            vec![
                GovernanceAction::ThrottleRequests,
                GovernanceAction::ScaleResources
            ]
        );
        assert_eq!(assessment.degraded_services.len(), 4);

        let quiet = assess_extreme_load(&LoadMetrics::default());
        assert!(quiet.actions.is_empty());
        assert!(quiet.degraded_services.is_empty());
    }

    #[test]
    fn test_resource_exhaustion() {
        let actions = assess_resource_exhaustion(&ResourceMetrics {
            memory: 0.5,
            cpu: 0.95,
            disk: 0.97,
        });
        assert_eq!(
            actions,
            vec![GovernanceAction::ScaleUp, GovernanceAction::CleanupResources]
        );
    }

    #[test]
    fn test_scores_from_healthy_queue() {
        let scores = SystemScores::from_queue(&QueueHealthInputs {
            error_rate: 0.0,
            avg_processing_ms: 1_000.0,
            retry_rate: 0.0,
            queue_size: 10,
            processing_rate: 1.0,
        });

        assert!((scores.alignment - 1.0).abs() < 1e-12);
        assert!((scores.stability - 1.0).abs() < 1e-12);
        assert_eq!(scores.evolution_rate, 0.0);
        assert!((scores.efficiency - 1.0).abs() < 1e-12);

        let state = scores.state(5);
        assert_eq!(state.stability, StabilityTier::Stable);
        assert_eq!(state.load, LoadTier::Low);
    }

    #[test]
    fn test_scores_from_failing_queue() {
        let scores = SystemScores::from_queue(&QueueHealthInputs {
            error_rate: 0.6,
            avg_processing_ms: 60_000.0,
            retry_rate: 0.4,
            queue_size: 2_000,
            processing_rate: 0.4,
        });

        // 0.4·0.4 + 0.3·0.5 + 0.3·0.6
        assert!((scores.alignment - 0.49).abs() < 1e-12);
        assert!((scores.stability - 0.45).abs() < 1e-12);
        assert!((scores.evolution_rate - 0.8).abs() < 1e-12);

        let state = scores.state(2_000);
        assert_eq!(state.evolution, EvolutionDirection::Rapid);
        assert_eq!(state.load, LoadTier::High);
        assert_eq!(required_actions(&state).len(), 4);
    }
}
