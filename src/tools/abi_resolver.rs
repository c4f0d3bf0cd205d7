//! `abi_resolver`: fetches a verified ABI for every contract
//! address touched by the transaction's calls or logs, from a
//! block-explorer-style API. Tolerates per-address failure -- a missing ABI
//! just means downstream decoders fall back to signature resolution.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::cache::cache_key;
use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};

const ABI_FETCH_CONCURRENCY: usize = 8;
const ABI_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const ABI_CACHE_TTL: Duration = Duration::from_secs(24 * 3600);

#[derive(Default)]
pub struct AbiResolver;

impl AbiResolver {
    pub fn new() -> Self {
        Self
    }

    async fn fetch_one(
        http: &reqwest::Client,
        cache: &dyn crate::cache::Cache,
        explorer_api_url: &str,
        address: &str,
    ) -> Option<Value> {
        let key = cache_key("abi", &[address]);
        if let Some(cached) = cache.get(&key).await {
            return serde_json::from_str(&cached).ok();
        }

        let url = format!("{explorer_api_url}?module=contract&action=getabi&address={address}");
        let response = tokio::time::timeout(ABI_HTTP_TIMEOUT, http.get(&url).send()).await.ok()?.ok()?;
        let body: Value = response.json().await.ok()?;
        let raw_abi = body.get("result").and_then(|v| v.as_str())?;
        let abi: Value = serde_json::from_str(raw_abi).ok()?;
        if let Ok(serialized) = serde_json::to_string(&abi) {
            cache.set(&key, serialized, ABI_CACHE_TTL).await;
        }
        Some(abi)
    }
}

#[async_trait]
impl Tool for AbiResolver {
    fn name(&self) -> &'static str {
        "abi_resolver"
    }

    fn description(&self) -> &'static str {
        "fetches verified ABIs for contracts touched by the transaction"
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::ABI_MAP]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let addresses = ctx.bundle.touched_addresses();
        let Some(explorer_api_url) = ctx.network.explorer_api_url.clone() else {
            return ctx.baggage.set(keys::ABI_MAP, HashMap::<String, Value>::new());
        };

        let results: Vec<(String, Option<Value>)> = stream::iter(addresses.into_iter())
            .map(|address| {
                let http = ctx.http.clone();
                let cache = ctx.cache.clone();
                let explorer_api_url = explorer_api_url.clone();
                async move {
                    let abi = Self::fetch_one(&http, cache.as_ref(), &explorer_api_url, &address).await;
                    (address, abi)
                }
            })
            .buffer_unordered(ABI_FETCH_CONCURRENCY)
            .collect()
            .await;

        let abi_map: HashMap<String, Value> = results
            .into_iter()
            .filter_map(|(addr, abi)| abi.map(|a| (addr, a)))
            .collect();

        ctx.baggage.set(keys::ABI_MAP, abi_map)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let abi_map: HashMap<String, Value> = ctx.baggage.get(keys::ABI_MAP)?;
        if abi_map.is_empty() {
            return None;
        }
        Some(format!(
            "### CONTRACT ABIs RESOLVED:\n- {} of the touched contracts have a verified ABI\n",
            abi_map.len()
        ))
    }
}
