//! `ens_resolver`: collects every address mentioned anywhere
//! in baggage and resolves each in bulk via the RPC adapter's reverse
//! lookup (network id 1 only; elsewhere this is a cheap no-op).

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::keys;
use crate::model::Call;
use crate::tool::{Tool, ToolContext};
use crate::tools::tx_context::TxContext;
use crate::transfer::TokenTransfer;

const ENS_FETCH_CONCURRENCY: usize = 8;

#[derive(Default)]
pub struct EnsResolver;

impl EnsResolver {
    pub fn new() -> Self {
        Self
    }
}

fn collect_addresses(ctx: &ToolContext) -> HashSet<String> {
    let mut addresses: HashSet<String> = ctx.bundle.touched_addresses();

    if let Some(tx_context) = ctx.baggage.get::<TxContext>(keys::TX_CONTEXT) {
        if let Some(from) = tx_context.from {
            addresses.insert(from);
        }
        if let Some(to) = tx_context.to {
            addresses.insert(to);
        }
    }
    if let Some(calls) = ctx.baggage.get::<Vec<Call>>(keys::CALLS) {
        for call in calls {
            addresses.insert(call.contract);
            addresses.insert(call.from);
        }
    }
    if let Some(transfers) = ctx.baggage.get::<Vec<TokenTransfer>>(keys::TRANSFERS) {
        for transfer in transfers {
            addresses.insert(transfer.from);
            addresses.insert(transfer.to);
            if !transfer.contract.is_empty() {
                addresses.insert(transfer.contract);
            }
        }
    }
    addresses.remove("");
    addresses
}

#[async_trait]
impl Tool for EnsResolver {
    fn name(&self) -> &'static str {
        "ens_resolver"
    }

    fn description(&self) -> &'static str {
        "reverse-resolves every address mentioned in the transaction to an ENS name"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::TX_CONTEXT, keys::CALLS, keys::TRANSFERS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::ENS_MAP]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        if !ctx.network.supports_ens() {
            return ctx.baggage.set(keys::ENS_MAP, HashMap::<String, String>::new());
        }

        let addresses = collect_addresses(ctx);
        let rpc = &ctx.rpc;
        let resolved: Vec<(String, Option<String>)> = stream::iter(addresses.into_iter())
            .map(|address| async move {
                let name = rpc.resolve_ens(&address).await.ok().flatten();
                (address, name)
            })
            .buffer_unordered(ENS_FETCH_CONCURRENCY)
            .collect()
            .await;

        let ens_map: HashMap<String, String> = resolved
            .into_iter()
            .filter_map(|(addr, name)| name.map(|n| (addr, n)))
            .collect();

        ctx.baggage.set(keys::ENS_MAP, ens_map)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let ens_map: HashMap<String, String> = ctx.baggage.get(keys::ENS_MAP)?;
        if ens_map.is_empty() {
            return None;
        }
        let mut out = format!("### ENS NAMES ({}):\n", ens_map.len());
        for (address, name) in ens_map.iter().take(20) {
            out.push_str(&format!("- {address} -> {name}\n"));
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
    async fn non_mainnet_yields_empty_map_without_network_calls() {
        let ctx = test_ctx(NetworkConfig::for_testing(10).unwrap());
        let tool = EnsResolver::new();
        tool.process(&ctx).await.unwrap();
        let map: HashMap<String, String> = ctx.baggage.get(keys::ENS_MAP).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn empty_map_yields_no_prompt_fragment() {
        let ctx = test_ctx(NetworkConfig::for_testing(1).unwrap());
        ctx.baggage.set(keys::ENS_MAP, HashMap::<String, String>::new()).unwrap();
        let tool = EnsResolver::new();
        assert!(tool.prompt_context(&ctx).is_none());
    }
}
