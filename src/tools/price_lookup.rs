//! `erc20_price_lookup`: looks up a USD spot price for every
//! fungible token contract `amounts_finder` flagged (and for the native
//! asset, when a native amount was detected), via a CoinGecko-shaped price
//! service keyed off the network's `pricing_slug`. Pure price discovery --
//! `monetary_value_enricher` is what multiplies these into per-transfer USD.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::cache_key;
use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};
use crate::tools::amounts_finder::DetectedAmount;

const PRICE_FETCH_CONCURRENCY: usize = 8;
const PRICE_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const PRICE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPrice {
    pub price_usd: f64,
    pub source: &'static str,
    pub last_updated: String,
}

#[derive(Default)]
pub struct Erc20PriceLookup;

impl Erc20PriceLookup {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_token_price(
        http: &reqwest::Client,
        cache: &dyn crate::cache::Cache,
        pricing_slug: &str,
        contract: &str,
    ) -> Option<TokenPrice> {
        let key = cache_key("price_token", &[pricing_slug, contract]);
        if let Some(cached) = cache.get(&key).await {
            return serde_json::from_str(&cached).ok();
        }

        let url = format!(
            "https://api.coingecko.com/api/v3/simple/token_price/{pricing_slug}?contract_addresses={contract}&vs_currencies=usd"
        );
        let response = tokio::time::timeout(PRICE_HTTP_TIMEOUT, http.get(&url).send()).await.ok()?.ok()?;
        let body: Value = response.json().await.ok()?;
        let price_usd = body
            .get(contract)
            .or_else(|| body.get(contract.to_lowercase()))
            .and_then(|v| v.get("usd"))
            .and_then(|v| v.as_f64())?;

        let price = TokenPrice {
            price_usd,
            source: "coingecko",
            last_updated: chrono_now_placeholder(),
        };
        if let Ok(serialized) = serde_json::to_string(&price) {
            cache.set(&key, serialized, PRICE_CACHE_TTL).await;
        }
        Some(price)
    }

    async fn fetch_native_price(
        http: &reqwest::Client,
        cache: &dyn crate::cache::Cache,
        pricing_slug: &str,
    ) -> Option<TokenPrice> {
        let key = cache_key("price_native", &[pricing_slug]);
        if let Some(cached) = cache.get(&key).await {
            return serde_json::from_str(&cached).ok();
        }

        let url = format!(
            "https://api.coingecko.com/api/v3/simple/price?ids={pricing_slug}&vs_currencies=usd"
        );
        let response = tokio::time::timeout(PRICE_HTTP_TIMEOUT, http.get(&url).send()).await.ok()?.ok()?;
        let body: Value = response.json().await.ok()?;
        let price_usd = body.get(pricing_slug).and_then(|v| v.get("usd")).and_then(|v| v.as_f64())?;

        let price = TokenPrice {
            price_usd,
            source: "coingecko",
            last_updated: chrono_now_placeholder(),
        };
        if let Ok(serialized) = serde_json::to_string(&price) {
            cache.set(&key, serialized, PRICE_CACHE_TTL).await;
        }
        Some(price)
    }
}

/// The pricing service reports its own freshness; we only need a label, not
/// a timestamp we'd have to generate ourselves (forbidden -- no wall-clock
/// reads during pipeline execution keep runs replayable).
fn chrono_now_placeholder() -> String {
    "live".to_string()
}

#[async_trait]
impl Tool for Erc20PriceLookup {
    fn name(&self) -> &'static str {
        "erc20_price_lookup"
    }

    fn description(&self) -> &'static str {
        "looks up a USD spot price for each detected token amount"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::DETECTED_AMOUNTS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::TOKEN_PRICES]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let amounts: Vec<DetectedAmount> = ctx.baggage.get(keys::DETECTED_AMOUNTS).unwrap_or_default();

        let Some(pricing_slug) = ctx.network.pricing_slug.clone() else {
            return ctx.baggage.set(keys::TOKEN_PRICES, HashMap::<String, TokenPrice>::new());
        };

        let mut contracts: std::collections::HashSet<String> = amounts
            .iter()
            .filter_map(|a| a.token_contract.clone())
            .collect();
        let wants_native = amounts.iter().any(|a| a.token_contract.is_none());
        contracts.remove("");

        let http = ctx.http.clone();
        let cache = ctx.cache.clone();
        let slug = pricing_slug.clone();
        let mut prices: Vec<(String, Option<TokenPrice>)> = stream::iter(contracts.into_iter())
            .map(|contract| {
                let http = http.clone();
                let cache = cache.clone();
                let slug = slug.clone();
                async move {
                    let price = Self::fetch_token_price(&http, cache.as_ref(), &slug, &contract).await;
                    (contract, price)
                }
            })
            .buffer_unordered(PRICE_FETCH_CONCURRENCY)
            .collect()
            .await;

        if wants_native {
            let native_price = Self::fetch_native_price(&http, cache.as_ref(), &pricing_slug).await;
            prices.push(("native".to_string(), native_price));
        }

        let map: HashMap<String, TokenPrice> = prices
            .into_iter()
            .filter_map(|(key, price)| price.map(|p| (key, p)))
            .collect();

        ctx.baggage.set(keys::TOKEN_PRICES, map)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let prices: HashMap<String, TokenPrice> = ctx.baggage.get(keys::TOKEN_PRICES)?;
        if prices.is_empty() {
            return None;
        }
        let mut out = format!("### TOKEN PRICES ({}):\n", prices.len());
        for (contract, price) in prices.iter().take(20) {
            out.push_str(&format!("- {contract}: ${:.4}\n", price.price_usd));
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use crate::baggage::Baggage;
    use crate::cache::NullCache;
    use crate::llm::MockLlmClient;
    use crate::model::RawTxBundle;
    use crate::network::NetworkConfig;
    use crate::progress::ProgressTracker;
    use crate::request::Request;
    use crate::rpc::RpcClient;

    fn test_ctx(network: NetworkConfig) -> ToolContext {
        let (tracker, _rx) = ProgressTracker::new(16);
        let cache: Arc<dyn crate::cache::Cache> = Arc::new(NullCache);
        ToolContext::new(
            Arc::new(Request::new(format!("0x{}", "ab".repeat(32)), network.network_id).unwrap()),
            Arc::new(network.clone()),
            Arc::new(RawTxBundle::default()),
            Arc::new(Baggage::new()),
            Arc::new(RpcClient::new(reqwest::Client::new(), &network.rpc_url, Arc::clone(&cache), network.network_id)),
            cache,
            reqwest::Client::new(),
            Arc::new(MockLlmClient::fixed(json!({}))),
            tracker.sender(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn no_pricing_slug_yields_empty_map() {
        let mut network = NetworkConfig::for_testing(1).unwrap();
        network.pricing_slug = None;
        let ctx = test_ctx(network);
        ctx.baggage.set(keys::DETECTED_AMOUNTS, vec![DetectedAmount {
            value_raw: "1".to_string(),
            token_contract: Some("0xtoken".to_string()),
            source: "transfer".to_string(),
        }]).unwrap();
        let tool = Erc20PriceLookup::new();
        tool.process(&ctx).await.unwrap();
        let prices: HashMap<String, TokenPrice> = ctx.baggage.get(keys::TOKEN_PRICES).unwrap();
        assert!(prices.is_empty());
    }

    #[test]
    fn empty_prices_yields_no_prompt_fragment() {
        let ctx = test_ctx(NetworkConfig::for_testing(1).unwrap());
        ctx.baggage.set(keys::TOKEN_PRICES, HashMap::<String, TokenPrice>::new()).unwrap();
        let tool = Erc20PriceLookup::new();
        assert!(tool.prompt_context(&ctx).is_none());
    }
}
