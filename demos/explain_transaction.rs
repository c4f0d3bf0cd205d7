//! Example: running the engine end to end against a mocked LLM.
//!
//! Run with: `cargo run --example explain_transaction`

use std::sync::Arc;

use serde_json::json;
use txplain_engine::{Engine, MockLlmClient, NetworkConfig, Request};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A MockLlmClient stands in for a real backend so this example runs
    // without network access; swap in `BackendLlmClient::new(url, model)`
    // to hit a live Ollama/OpenAI-compatible endpoint.
    let llm = Arc::new(MockLlmClient::fixed(json!({
        "summary": "The sender swapped 1.5 ETH for 2,400 USDC on Uniswap.",
        "refined_tags": ["swap", "defi"],
    })));

    let engine = Engine::new(llm)?;

    let request = Request::new(format!("0x{}", "ab".repeat(32)), 1)?;
    let network = NetworkConfig::for_testing(1).expect("network 1 has baked-in testing defaults");

    let explanation = engine.explain(request, network).await?;

    println!("{}", explanation.summary);
    if let Some(tags) = &explanation.tags {
        println!("tags: {}", tags.join(", "));
    }
    for (name, url) in &explanation.links {
        println!("{name}: {url}");
    }

    Ok(())
}
