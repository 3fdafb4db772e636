pub mod builder;
pub mod inflight;
pub mod manager;
pub mod strategies;
pub mod tracker;
pub mod types;

pub use builder::LlmManagerBuilder;
pub use manager::LlmManager;
pub use strategies::{
    Candidate,
    CostOptimizedStrategy,
    LeastLatencyStrategy,
    LoadBalancingStrategy,
    RoundRobinStrategy,
    StrategyKind,
    WeightedStrategy,
};
pub use types::{HealthStatus, ProviderMetrics};
