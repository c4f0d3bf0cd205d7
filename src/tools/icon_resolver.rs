//! `icon_resolver`: attempts a well-known icon CDN URL
//! template for each token contract and keeps it only after a HEAD probe
//! confirms the asset exists.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::keys;
use crate::tools::token_metadata::TokenMetadata;
use crate::tool::{Tool, ToolContext};

const ICON_FETCH_CONCURRENCY: usize = 8;
const ICON_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Trust Wallet's asset repository indexes tokens by checksummed address
/// under a per-chain folder.
fn icon_url_template(icon_slug: &str, address: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/trustwallet/assets/master/blockchains/{icon_slug}/assets/{address}/logo.png"
    )
}

#[derive(Default)]
pub struct IconResolver;

impl IconResolver {
    pub fn new() -> Self {
        Self
    }

    async fn probe(http: &reqwest::Client, url: &str) -> bool {
        let result = tokio::time::timeout(ICON_HTTP_TIMEOUT, http.head(url).send()).await;
        matches!(result, Ok(Ok(response)) if response.status().is_success())
    }
}

#[async_trait]
impl Tool for IconResolver {
    fn name(&self) -> &'static str {
        "icon_resolver"
    }

    fn description(&self) -> &'static str {
        "probes a well-known icon CDN template for each token"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::TOKEN_METADATA]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::ICON_MAP]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let metadata: HashMap<String, TokenMetadata> = ctx.baggage.get(keys::TOKEN_METADATA).unwrap_or_default();
        let Some(icon_slug) = ctx.network.icon_slug.clone() else {
            return ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new());
        };

        let candidates: Vec<(String, String)> = metadata
            .keys()
            .map(|address| (address.clone(), icon_url_template(&icon_slug, address)))
            .collect();

        let http = &ctx.http;
        let resolved: Vec<(String, String)> = stream::iter(candidates.into_iter())
            .map(|(address, url)| async move {
                let ok = Self::probe(http, &url).await;
                (address, url, ok)
            })
            .buffer_unordered(ICON_FETCH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .filter_map(|(address, url, ok)| ok.then_some((address, url)))
            .collect();

        ctx.baggage.set(keys::ICON_MAP, resolved.into_iter().collect::<HashMap<_, _>>())
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let icons: HashMap<String, String> = ctx.baggage.get(keys::ICON_MAP)?;
        if icons.is_empty() {
            return None;
        }
        Some(format!("### ICONS RESOLVED: {} of the touched tokens have an icon\n", icons.len()))
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
    async fn no_icon_slug_yields_empty_map() {
        let mut network = NetworkConfig::for_testing(1).unwrap();
        network.icon_slug = None;
        let ctx = test_ctx(network);
        ctx.baggage.set(keys::TOKEN_METADATA, HashMap::<String, TokenMetadata>::new()).unwrap();
        let tool = IconResolver::new();
        tool.process(&ctx).await.unwrap();
        let icons: HashMap<String, String> = ctx.baggage.get(keys::ICON_MAP).unwrap();
        assert!(icons.is_empty());
    }

    #[test]
    fn url_template_includes_slug_and_address() {
        let url = icon_url_template("ethereum", "0xabc");
        assert!(url.contains("/ethereum/"));
        assert!(url.contains("0xabc"));
    }

    #[test]
    fn empty_icon_map_yields_no_prompt_fragment() {
        let ctx = test_ctx(NetworkConfig::for_testing(1).unwrap());
        ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new()).unwrap();
        let tool = IconResolver::new();
        assert!(tool.prompt_context(&ctx).is_none());
    }
}
