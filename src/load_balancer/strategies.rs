use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::debug;

use crate::errors::LlmError;
use crate::providers::ProviderType;

/// What a strategy sees of each enabled provider when ordering the fallback chain
#[derive(Debug, Clone)]
pub struct Candidate {
    pub provider: ProviderType,
    /// Lower values are preferred
    pub priority: u32,
    pub weight: f64,
    pub cost_per_token: f64,
    pub avg_latency: Duration,
}

/// Trait defining the interface for load balancing strategies
///
/// Implementations reorder the candidate list in place. The list arrives
/// sorted by priority, so stable sorts keep priority as the tie-breaker.
/// The manager tries providers in the resulting order.
pub trait LoadBalancingStrategy: Send + Sync {
    /// Short identifier used in logs and configuration
    fn name(&self) -> &'static str;

    /// Reorder `candidates` into the order they should be tried
    ///
    /// # Parameters
    /// * `candidates` - Enabled providers, already sorted by priority
    fn order(&self, candidates: &mut [Candidate]);
}

/// Rotates the starting provider on every request
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    next: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn order(&self, candidates: &mut [Candidate]) {
        if candidates.is_empty() {
            return;
        }
        let start = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.rotate_left(start);
        debug!("RoundRobinStrategy: starting at {}", candidates[0].provider);
    }
}

/// Prefers providers with a higher configured weight
#[derive(Debug, Default)]
pub struct WeightedStrategy;

impl WeightedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for WeightedStrategy {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn order(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    }
}

/// Prefers the provider with the lowest average latency so far
///
/// Providers without any recorded call average zero and are tried first.
#[derive(Debug, Default)]
pub struct LeastLatencyStrategy;

impl LeastLatencyStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for LeastLatencyStrategy {
    fn name(&self) -> &'static str {
        "least_latency"
    }

    fn order(&self, candidates: &mut [Candidate]) {
        candidates.sort_by_key(|c| c.avg_latency);
        if let Some(first) = candidates.first() {
            debug!(
                "LeastLatencyStrategy: {} leads with avg latency {:?}",
                first.provider, first.avg_latency
            );
        }
    }
}

/// Prefers the cheapest provider per token
#[derive(Debug, Default)]
pub struct CostOptimizedStrategy;

impl CostOptimizedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for CostOptimizedStrategy {
    fn name(&self) -> &'static str {
        "cost_optimized"
    }

    fn order(&self, candidates: &mut [Candidate]) {
        candidates.sort_by(|a, b| a.cost_per_token.total_cmp(&b.cost_per_token));
    }
}

/// Built-in strategies, as named in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    Weighted,
    LeastLatency,
    CostOptimized,
}

impl StrategyKind {
    pub const NAMES: [&'static str; 4] = ["round_robin", "weighted", "least_latency", "cost_optimized"];

    pub fn build(self) -> Box<dyn LoadBalancingStrategy> {
        match self {
            StrategyKind::RoundRobin => Box::new(RoundRobinStrategy::new()),
            StrategyKind::Weighted => Box::new(WeightedStrategy::new()),
            StrategyKind::LeastLatency => Box::new(LeastLatencyStrategy::new()),
            StrategyKind::CostOptimized => Box::new(CostOptimizedStrategy::new()),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(StrategyKind::RoundRobin),
            "weighted" => Ok(StrategyKind::Weighted),
            "least_latency" => Ok(StrategyKind::LeastLatency),
            "cost_optimized" => Ok(StrategyKind::CostOptimized),
            _ => Err(LlmError::ConfigError(format!(
                "Unknown strategy '{}'\n  → Valid strategies: {}",
                s,
                StrategyKind::NAMES.join(", ")
            ))),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::RoundRobin => "round_robin",
            StrategyKind::Weighted => "weighted",
            StrategyKind::LeastLatency => "least_latency",
            StrategyKind::CostOptimized => "cost_optimized",
        };
        write!(f, "{}", name)
    }
}
