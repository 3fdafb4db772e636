//! Tests for load balancing strategies.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{request, Behavior, MockAdapter};
use relayllm::load_balancer::strategies::{
    Candidate, CostOptimizedStrategy, LeastLatencyStrategy, LoadBalancingStrategy, RoundRobinStrategy,
    WeightedStrategy,
};
use relayllm::{LlmError, LlmManager, ProviderType, StrategyKind};

fn candidate(provider: ProviderType) -> Candidate {
    Candidate {
        provider,
        priority: 0,
        weight: 1.0,
        cost_per_token: 0.0,
        avg_latency: Duration::ZERO,
    }
}

fn providers(candidates: &[Candidate]) -> Vec<ProviderType> {
    candidates.iter().map(|c| c.provider).collect()
}

// ============================================================================
// Ordering Tests
// ============================================================================

#[test]
fn test_round_robin_rotates_start() {
    let strategy = RoundRobinStrategy::new();
    let base = vec![
        candidate(ProviderType::Anthropic),
        candidate(ProviderType::OpenAI),
        candidate(ProviderType::Google),
    ];

    let mut firsts = Vec::new();
    for _ in 0..4 {
        let mut candidates = base.clone();
        strategy.order(&mut candidates);
        assert_eq!(candidates.len(), 3);
        firsts.push(candidates[0].provider);
    }

    assert_eq!(
        firsts,
        vec![ProviderType::Anthropic, ProviderType::OpenAI, ProviderType::Google, ProviderType::Anthropic]
    );
}

#[test]
fn test_round_robin_keeps_relative_order() {
    let strategy = RoundRobinStrategy::new();
    let mut candidates = vec![
        candidate(ProviderType::Anthropic),
        candidate(ProviderType::OpenAI),
        candidate(ProviderType::Google),
    ];
    strategy.order(&mut candidates);
    strategy.order(&mut candidates);

    // The counter advances once per call, so the second call starts one further along
    assert_eq!(
        providers(&candidates),
        vec![ProviderType::OpenAI, ProviderType::Google, ProviderType::Anthropic]
    );
}

#[test]
fn test_round_robin_empty_is_noop() {
    let mut candidates: Vec<Candidate> = Vec::new();
    RoundRobinStrategy::new().order(&mut candidates);
    assert!(candidates.is_empty());
}

#[test]
fn test_weighted_prefers_heavier() {
    let mut candidates = vec![
        Candidate { weight: 1.0, ..candidate(ProviderType::Anthropic) },
        Candidate { weight: 3.0, ..candidate(ProviderType::OpenAI) },
        Candidate { weight: 2.0, ..candidate(ProviderType::Mistral) },
    ];
    WeightedStrategy::new().order(&mut candidates);

    assert_eq!(
        providers(&candidates),
        vec![ProviderType::OpenAI, ProviderType::Mistral, ProviderType::Anthropic]
    );
}

#[test]
fn test_weighted_ties_keep_priority_order() {
    let mut candidates = vec![candidate(ProviderType::Google), candidate(ProviderType::Anthropic)];
    WeightedStrategy::new().order(&mut candidates);

    assert_eq!(providers(&candidates), vec![ProviderType::Google, ProviderType::Anthropic]);
}

#[test]
fn test_least_latency_prefers_fastest() {
    let mut candidates = vec![
        Candidate { avg_latency: Duration::from_millis(900), ..candidate(ProviderType::Anthropic) },
        Candidate { avg_latency: Duration::from_millis(120), ..candidate(ProviderType::OpenAI) },
        Candidate { avg_latency: Duration::from_millis(400), ..candidate(ProviderType::Google) },
    ];
    LeastLatencyStrategy::new().order(&mut candidates);

    assert_eq!(
        providers(&candidates),
        vec![ProviderType::OpenAI, ProviderType::Google, ProviderType::Anthropic]
    );
}

#[test]
fn test_least_latency_untried_provider_goes_first() {
    let mut candidates = vec![
        Candidate { avg_latency: Duration::from_millis(50), ..candidate(ProviderType::Anthropic) },
        candidate(ProviderType::Mistral),
    ];
    LeastLatencyStrategy::new().order(&mut candidates);

    assert_eq!(candidates[0].provider, ProviderType::Mistral);
}

#[test]
fn test_cost_optimized_prefers_cheapest() {
    let mut candidates = vec![
        Candidate { cost_per_token: 0.00003, ..candidate(ProviderType::Anthropic) },
        Candidate { cost_per_token: 0.000002, ..candidate(ProviderType::Mistral) },
        Candidate { cost_per_token: 0.00001, ..candidate(ProviderType::OpenAI) },
    ];
    CostOptimizedStrategy::new().order(&mut candidates);

    assert_eq!(
        providers(&candidates),
        vec![ProviderType::Mistral, ProviderType::OpenAI, ProviderType::Anthropic]
    );
}

// ============================================================================
// StrategyKind Tests
// ============================================================================

#[test]
fn test_strategy_kind_parse_and_display() {
    for name in StrategyKind::NAMES {
        let kind: StrategyKind = name.parse().unwrap();
        assert_eq!(kind.to_string(), name);
        assert_eq!(kind.build().name(), name);
    }
}

#[test]
fn test_strategy_kind_unknown_name() {
    let err = "fastest".parse::<StrategyKind>().unwrap_err();
    match err {
        LlmError::ConfigError(msg) => {
            assert!(msg.contains("fastest"));
            assert!(msg.contains("cost_optimized"));
        }
        other => panic!("expected ConfigError, got {}", other),
    }
}

#[test]
fn test_strategy_kind_default_is_round_robin() {
    assert_eq!(StrategyKind::default(), StrategyKind::RoundRobin);
}

// ============================================================================
// Routing Through the Manager
// ============================================================================

#[tokio::test]
async fn test_manager_round_robin_spreads_requests() {
    let anthropic = Arc::new(MockAdapter::new(ProviderType::Anthropic, Behavior::Succeed));
    let openai = Arc::new(MockAdapter::new(ProviderType::OpenAI, Behavior::Succeed));
    let manager = LlmManager::builder()
        .strategy(StrategyKind::RoundRobin)
        .add_adapter(anthropic.clone())
        .add_adapter(openai.clone())
        .build()
        .await
        .unwrap();

    for i in 0..4 {
        manager.generate_content(&request(&format!("prompt {}", i))).await.unwrap();
    }

    assert_eq!(anthropic.calls(), 2);
    assert_eq!(openai.calls(), 2);
}

#[tokio::test]
async fn test_manager_cost_optimized_routes_to_cheapest() {
    let anthropic = Arc::new(
        MockAdapter::new(ProviderType::Anthropic, Behavior::Succeed).configure(|s| s.cost_per_token = 0.00002),
    );
    let mistral = Arc::new(
        MockAdapter::new(ProviderType::Mistral, Behavior::Succeed).configure(|s| s.cost_per_token = 0.000001),
    );
    let manager = LlmManager::builder()
        .strategy(StrategyKind::CostOptimized)
        .add_adapter(anthropic.clone())
        .add_adapter(mistral.clone())
        .build()
        .await
        .unwrap();

    for i in 0..3 {
        let response = manager.generate_content(&request(&format!("prompt {}", i))).await.unwrap();
        assert_eq!(response.provider, ProviderType::Mistral);
    }
    assert_eq!(anthropic.calls(), 0);
}

#[tokio::test]
async fn test_manager_priority_breaks_ties() {
    let anthropic =
        Arc::new(MockAdapter::new(ProviderType::Anthropic, Behavior::Succeed).configure(|s| s.priority = 5));
    let google = Arc::new(MockAdapter::new(ProviderType::Google, Behavior::Succeed).configure(|s| s.priority = 1));
    let manager = LlmManager::builder()
        .strategy(StrategyKind::Weighted)
        .add_adapter(anthropic.clone())
        .add_adapter(google.clone())
        .build()
        .await
        .unwrap();

    let response = manager.generate_content(&request("hello")).await.unwrap();

    assert_eq!(response.provider, ProviderType::Google);
    assert_eq!(anthropic.calls(), 0);
}

#[tokio::test]
async fn test_manager_with_custom_strategy() {
    /// Always tries providers in reverse priority order
    struct Reverse;

    impl LoadBalancingStrategy for Reverse {
        fn name(&self) -> &'static str {
            "reverse"
        }

        fn order(&self, candidates: &mut [Candidate]) {
            candidates.reverse();
        }
    }

    let anthropic = Arc::new(MockAdapter::new(ProviderType::Anthropic, Behavior::Succeed));
    let openai = Arc::new(MockAdapter::new(ProviderType::OpenAI, Behavior::Succeed));
    let manager = LlmManager::builder()
        .custom_strategy(Box::new(Reverse))
        .add_adapter(anthropic)
        .add_adapter(openai)
        .build()
        .await
        .unwrap();

    assert_eq!(manager.strategy_name(), "reverse");
    let response = manager.generate_content(&request("hello")).await.unwrap();
    assert_eq!(response.provider, ProviderType::OpenAI);
}
