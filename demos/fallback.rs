//! Example: Fallback routing with circuit breakers, caching and budgets
//!
//! Configures every provider whose API key is present in the environment,
//! sends a few requests through the router, then prints health, metrics
//! and spend.
//!
//! Run with:
//! ```bash
//! OPENAI_API_KEY=... ANTHROPIC_API_KEY=... RUST_LOG=relayllm=debug cargo run --example fallback
//! ```

use std::env;

use relayllm::{BudgetLimits, GenerateRequest, LlmManager, ProviderType, StrategyKind};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    relayllm::use_logging();

    println!("=== relayllm Fallback Example ===\n");

    let mut builder = LlmManager::builder().strategy(StrategyKind::CostOptimized);
    let mut configured = 0;

    if let Ok(key) = env::var("MISTRAL_API_KEY") {
        builder = builder
            .add_provider(ProviderType::Mistral, "mistral-small-latest", key)
            .cost_per_token(0.0000003)
            .budget(ProviderType::Mistral, BudgetLimits::new().daily(1.0));
        configured += 1;
    }
    if let Ok(key) = env::var("OPENAI_API_KEY") {
        builder = builder
            .add_provider(ProviderType::OpenAI, "gpt-4o-mini", key)
            .cost_per_token(0.0000006)
            .requests_per_minute(60)
            .budget(ProviderType::OpenAI, BudgetLimits::new().daily(2.0).monthly(20.0));
        configured += 1;
    }
    if let Ok(key) = env::var("GOOGLE_API_KEY") {
        builder = builder
            .add_provider(ProviderType::Google, "gemini-1.5-flash", key)
            .cost_per_token(0.0000003);
        configured += 1;
    }
    if let Ok(key) = env::var("ANTHROPIC_API_KEY") {
        builder = builder
            .add_provider(ProviderType::Anthropic, "claude-3-5-haiku-latest", key)
            .cost_per_token(0.000004)
            .priority(1);
        configured += 1;
    }

    if configured == 0 {
        println!("No API keys found. Set at least one of:");
        println!("  MISTRAL_API_KEY, OPENAI_API_KEY, GOOGLE_API_KEY, ANTHROPIC_API_KEY");
        return Ok(());
    }

    let manager = builder.build().await?;
    println!("Routing across {} provider(s) with the {} strategy\n", configured, manager.strategy_name());

    let prompts = [
        "What is the capital of Portugal? Answer in one word.",
        "Name one prime number between 10 and 20.",
        // Same as the first one: served from the cache
        "What is the capital of Portugal? Answer in one word.",
    ];

    for prompt in prompts {
        let request = GenerateRequest::new("fast", prompt, 32).temperature(0.2).user("demo");
        match manager.generate_content(&request).await {
            Ok(response) => println!(
                "[{}] {} ({} tokens, ${:.6}, {:?})",
                response.provider,
                response.content.trim(),
                response.usage.total_tokens,
                response.cost,
                response.latency
            ),
            Err(e) => println!("Request failed: {}", e),
        }
    }

    println!("\n--- Health ---");
    for (provider, health) in manager.get_health_status().await {
        println!(
            "{:<10} healthy={} breaker={:?} error_rate={:.1}% avg_latency={:?}",
            provider.to_string(),
            health.healthy,
            health.breaker_state,
            health.error_rate,
            health.avg_latency
        );
    }

    println!("\n--- Cache ---");
    let stats = manager.cache_stats().await;
    println!("hits={} misses={} hit_rate={:.0}%", stats.hits, stats.misses, stats.hit_rate() * 100.0);

    println!("\n--- Spend ---");
    for (provider, summary) in manager.get_cost_summary().await {
        println!(
            "{:<10} ${:.6} over {} request(s), {} tokens",
            provider.to_string(),
            summary.total_cost,
            summary.request_count,
            summary.total_tokens
        );
    }
    for alert in manager.budget_alerts().await {
        println!("ALERT: {}", alert);
    }

    println!("\n--- Metrics (JSON) ---");
    println!("{}", serde_json::to_string_pretty(&manager.get_metrics().await)?);

    Ok(())
}
