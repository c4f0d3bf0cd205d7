//! `token_metadata_enricher`: resolves symbol/name/decimals
//! for every contract address appearing in decoded calls or events. Prefers
//! the curated static knowledge table (no network round trip) and falls
//! back to on-chain introspection via `eth_call`.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys;
use crate::model::{Call, Event};
use crate::tool::{Tool, ToolContext};
use crate::tools::static_context::StaticKnowledge;

const METADATA_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u32>,
    pub is_contract: bool,
    /// Where this entry came from: `"static"` (curated table) or `"chain"`
    /// (live `eth_call` introspection), for debugging/trust display only.
    pub source: &'static str,
}

#[derive(Default)]
pub struct TokenMetadataEnricher;

impl TokenMetadataEnricher {
    pub fn new() -> Self {
        Self
    }
}

fn candidate_addresses(calls: &[Call], events: &[Event]) -> HashSet<String> {
    let mut addresses = HashSet::new();
    for call in calls {
        addresses.insert(call.contract.clone());
    }
    for event in events {
        addresses.insert(event.contract.clone());
    }
    addresses
}

#[async_trait]
impl Tool for TokenMetadataEnricher {
    fn name(&self) -> &'static str {
        "token_metadata_enricher"
    }

    fn description(&self) -> &'static str {
        "resolves symbol/name/decimals for every contract touched by the transaction"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::CALLS, keys::EVENTS, keys::STATIC_KNOWLEDGE]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::TOKEN_METADATA]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS).unwrap_or_default();
        let knowledge: StaticKnowledge = ctx.baggage.get(keys::STATIC_KNOWLEDGE).unwrap_or_default();
        let addresses = candidate_addresses(&calls, &events);

        let mut metadata: HashMap<String, TokenMetadata> = HashMap::new();
        let mut unresolved = Vec::new();
        for address in addresses {
            if let Some(known) = knowledge.tokens.get(&address) {
                metadata.insert(
                    address,
                    TokenMetadata {
                        symbol: Some(known.symbol.clone()),
                        name: Some(known.name.clone()),
                        decimals: Some(known.decimals),
                        is_contract: true,
                        source: "static",
                    },
                );
            } else {
                unresolved.push(address);
            }
        }

        let rpc = &ctx.rpc;
        let fetched: Vec<(String, TokenMetadata)> = stream::iter(unresolved.into_iter())
            .map(|address| async move {
                let info = rpc.get_contract_info(&address).await.unwrap_or_default();
                (
                    address,
                    TokenMetadata {
                        symbol: info.symbol,
                        name: info.name,
                        decimals: info.decimals,
                        is_contract: info.is_contract,
                        source: "chain",
                    },
                )
            })
            .buffer_unordered(METADATA_FETCH_CONCURRENCY)
            .collect()
            .await;

        for (address, meta) in fetched {
            metadata.insert(address, meta);
        }

        ctx.baggage.set(keys::TOKEN_METADATA, metadata)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let metadata: HashMap<String, TokenMetadata> = ctx.baggage.get(keys::TOKEN_METADATA)?;
        if metadata.is_empty() {
            return None;
        }
        let mut out = format!("### TOKEN METADATA ({} contracts):\n", metadata.len());
        for (address, meta) in metadata.iter().take(20) {
            out.push_str(&format!(
                "- {} -> {} ({}), decimals={}\n",
                address,
                meta.symbol.as_deref().unwrap_or("?"),
                meta.name.as_deref().unwrap_or("unknown"),
                meta.decimals.map(|d| d.to_string()).unwrap_or_else(|| "?".to_string())
            ));
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
    use crate::model::{CallType, RawTxBundle};
    use crate::network::NetworkConfig;
    use crate::progress::ProgressTracker;
    use crate::request::Request;
    use crate::rpc::RpcClient;

    fn test_ctx() -> ToolContext {
        let (tracker, _rx) = ProgressTracker::new(16);
        let cache: Arc<dyn crate::cache::Cache> = Arc::new(NullCache);
        let network = NetworkConfig::for_testing(1).unwrap();
        ToolContext::new(
            Arc::new(Request::new(format!("0x{}", "ab".repeat(32)), 1).unwrap()),
            Arc::new(network.clone()),
            Arc::new(RawTxBundle::default()),
            Arc::new(Baggage::new()),
            Arc::new(RpcClient::new(reqwest::Client::new(), &network.rpc_url, Arc::clone(&cache), 1)),
            cache,
            reqwest::Client::new(),
            Arc::new(MockLlmClient::fixed(json!({}))),
            tracker.sender(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn sample_call(contract: &str) -> Call {
        Call {
            contract: contract.to_string(),
            method: "transfer(address,uint256)".to_string(),
            arguments: serde_json::Map::new(),
            gas_used: Some(21000),
            value: "0".to_string(),
            call_type: CallType::Call,
            success: true,
            error_reason: None,
            depth: 0,
            from: "0xfrom".to_string(),
            selector: Some("0xa9059cbb".to_string()),
            call_index: 0,
        }
    }

    #[tokio::test]
    async fn static_table_hit_skips_network() {
        let ctx = test_ctx();
        ctx.baggage
            .set(
                keys::CALLS,
                vec![sample_call("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2")],
            )
            .unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage
            .set(keys::STATIC_KNOWLEDGE, StaticKnowledge::load_embedded())
            .unwrap();

        let tool = TokenMetadataEnricher::new();
        tool.process(&ctx).await.unwrap();
        let metadata: HashMap<String, TokenMetadata> = ctx.baggage.get(keys::TOKEN_METADATA).unwrap();
        let weth = metadata.get("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2").unwrap();
        assert_eq!(weth.source, "static");
        assert_eq!(weth.symbol.as_deref(), Some("WETH"));
    }

    #[test]
    fn empty_metadata_yields_no_prompt_fragment() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::TOKEN_METADATA, HashMap::<String, TokenMetadata>::new()).unwrap();
        let tool = TokenMetadataEnricher::new();
        assert!(tool.prompt_context(&ctx).is_none());
    }
}
