//! `nft_decoder`: specializes NFT transfers by resolving
//! each unique `(contract, token_id)`'s `tokenURI`/`uri` metadata pointer.
//! `TransferBatch` splitting already happens in `token_transfer_extractor`
//! (each `(id, value)` pair becomes its own `TokenTransfer`); this tool only
//! adds the URI lookup on top of whatever NFT transfers survived.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use num_bigint::BigUint;

use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};
use crate::transfer::{TokenTransfer, TransferType};

const URI_FETCH_CONCURRENCY: usize = 8;

#[derive(Default)]
pub struct NftDecoder;

impl NftDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn nft_key(contract: &str, token_id: &str) -> String {
    format!("{contract}:{token_id}")
}

#[async_trait]
impl Tool for NftDecoder {
    fn name(&self) -> &'static str {
        "nft_decoder"
    }

    fn description(&self) -> &'static str {
        "resolves tokenURI for each NFT transfer's unique token id"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::TRANSFERS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::NFT_URIS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap_or_default();

        let candidates: Vec<(String, String, BigUint)> = transfers
            .iter()
            .filter(|t| matches!(t.kind, TransferType::NftUnique | TransferType::NftMulti))
            .filter_map(|t| {
                let token_id = t.token_id.as_ref()?;
                let value = BigUint::parse_bytes(token_id.as_bytes(), 10)?;
                Some((t.contract.clone(), token_id.clone(), value))
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        let unique: Vec<(String, String, BigUint)> = candidates
            .into_iter()
            .filter(|(contract, token_id, _)| seen.insert(nft_key(contract, token_id)))
            .collect();

        let rpc = &ctx.rpc;
        let resolved: Vec<(String, Option<String>)> = stream::iter(unique.into_iter())
            .map(|(contract, token_id, value)| async move {
                let uri = rpc.token_uri(&contract, &value).await;
                (nft_key(&contract, &token_id), uri)
            })
            .buffer_unordered(URI_FETCH_CONCURRENCY)
            .collect()
            .await;

        let uris: HashMap<String, String> = resolved
            .into_iter()
            .filter_map(|(key, uri)| uri.map(|u| (key, u)))
            .collect();

        ctx.baggage.set(keys::NFT_URIS, uris)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let uris: HashMap<String, String> = ctx.baggage.get(keys::NFT_URIS)?;
        if uris.is_empty() {
            return None;
        }
        Some(format!(
            "### NFT METADATA: {} token(s) have a resolved tokenURI\n",
            uris.len()
        ))
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

    fn nft_transfer(contract: &str, token_id: &str) -> TokenTransfer {
        TokenTransfer {
            kind: TransferType::NftUnique,
            contract: contract.to_string(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            amount: "1".to_string(),
            token_id: Some(token_id.to_string()),
            symbol: None,
            name: None,
            decimals: None,
            formatted_amount: None,
            amount_usd: None,
            source_index: "0".to_string(),
        }
    }

    #[tokio::test]
    async fn no_network_means_no_uris_resolved_but_no_error() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::TRANSFERS, vec![nft_transfer("0xnft", "7")]).unwrap();
        let tool = NftDecoder::new();
        tool.process(&ctx).await.unwrap();
        let uris: HashMap<String, String> = ctx.baggage.get(keys::NFT_URIS).unwrap();
        assert!(uris.is_empty());
    }

    #[tokio::test]
    async fn fungible_transfers_are_ignored() {
        let ctx = test_ctx();
        let mut fungible = nft_transfer("0xtoken", "1");
        fungible.kind = TransferType::Fungible;
        fungible.token_id = None;
        ctx.baggage.set(keys::TRANSFERS, vec![fungible]).unwrap();
        let tool = NftDecoder::new();
        tool.process(&ctx).await.unwrap();
        let uris: HashMap<String, String> = ctx.baggage.get(keys::NFT_URIS).unwrap();
        assert!(uris.is_empty());
    }

    #[test]
    fn empty_uris_yields_no_prompt_fragment() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::NFT_URIS, HashMap::<String, String>::new()).unwrap();
        let tool = NftDecoder::new();
        assert!(tool.prompt_context(&ctx).is_none());
    }
}
