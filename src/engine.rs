//! The public entry point: wires every tool in `crate::tools` into a single
//! [`crate::scheduler::Pipeline`], fetches the raw transaction bundle, runs
//! the pipeline, and assembles the public [`crate::result::ExplanationResult`]
//! from the finished baggage.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::baggage::SharedBaggage;
use crate::cache::{Cache, TtlCache};
use crate::error::{PipelineError, Result};
use crate::keys;
use crate::llm::LlmClient;
use crate::network::NetworkConfig;
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::request::Request;
use crate::result::{AddressParticipant, Annotation, ExplanationResult, TxStatus};
use crate::rpc::RpcClient;
use crate::scheduler::{Pipeline, PipelineBuilder};
use crate::tool::Tool;
use crate::tools;
use crate::tools::explainer::ExplainerOutput;
use crate::tools::protocol_resolver::Protocol;
use crate::tools::tx_context::TxContext;
use crate::transfer::TokenTransfer;

/// Registers every tool in its pipeline order (registration order only
/// matters as a Kahn tie-break; real ordering comes from `dependencies()`).
pub fn build_pipeline() -> Result<Pipeline> {
    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(tools::static_context::StaticContextProvider::new()),
        Arc::new(tools::tx_context::TransactionContextProvider::new()),
        Arc::new(tools::abi_resolver::AbiResolver::new()),
        Arc::new(tools::trace_decoder::TraceDecoder::new()),
        Arc::new(tools::log_decoder::LogDecoder::new()),
        Arc::new(tools::token_metadata::TokenMetadataEnricher::new()),
        Arc::new(tools::icon_resolver::IconResolver::new()),
        Arc::new(tools::transfer_extractor::TokenTransferExtractor::new()),
        Arc::new(tools::nft_decoder::NftDecoder::new()),
        Arc::new(tools::signature_resolver::SignatureResolverTool::new()),
        Arc::new(tools::amounts_finder::AmountsFinder::new()),
        Arc::new(tools::price_lookup::Erc20PriceLookup::new()),
        Arc::new(tools::monetary_enricher::MonetaryValueEnricher::new()),
        Arc::new(tools::protocol_resolver::ProtocolResolver::new()),
        Arc::new(tools::ens_resolver::EnsResolver::new()),
        Arc::new(tools::tag_resolver::TagResolver::new()),
        Arc::new(tools::role_resolver::AddressRoleResolver::new()),
        Arc::new(tools::explainer::TransactionExplainer::new()),
        Arc::new(tools::annotation_generator::AnnotationGenerator::new()),
    ];

    let mut builder = PipelineBuilder::new();
    for tool in tools {
        builder = builder.register(tool);
    }
    builder.build()
}

/// A long-lived, reusable pipeline plus the collaborators every run needs.
/// Build once per process; `explain` is cheap to call repeatedly.
pub struct Engine {
    http: reqwest::Client,
    cache: Arc<dyn Cache>,
    llm: Arc<dyn LlmClient>,
    pipeline: Arc<Pipeline>,
}

impl Engine {
    pub fn new(llm: Arc<dyn LlmClient>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            cache: Arc::new(TtlCache::new()),
            llm,
            pipeline: Arc::new(build_pipeline()?),
        })
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = cache;
        self
    }

    /// Runs one request to completion, without streaming progress. Useful
    /// for tests and simple callers; `explain_with_progress` is what an
    /// SSE/WebSocket collaborator would actually drive.
    pub async fn explain(&self, request: Request, network: NetworkConfig) -> Result<ExplanationResult> {
        let (handle, mut rx, _cancel) = self.explain_with_progress(request, network, 256);
        // Drain progress silently so the bounded channel never backs up
        // while we just want the final result.
        let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
        let result = handle.await.map_err(|e| PipelineError::Other(e.to_string()))?;
        drop(drain);
        result
    }

    /// Spawns the fetch + pipeline run as a background task and returns
    /// immediately with a handle to the final result, the progress stream a
    /// caller can forward to a collaborator transport, and a cancellation
    /// handle. Call `cancel.store(true, Relaxed)` on the returned handle to
    /// cooperatively stop at the next stage boundary.
    pub fn explain_with_progress(
        &self,
        request: Request,
        network: NetworkConfig,
        progress_capacity: usize,
    ) -> (
        tokio::task::JoinHandle<Result<ExplanationResult>>,
        mpsc::Receiver<ProgressEvent>,
        Arc<AtomicBool>,
    ) {
        let (mut tracker, rx) = ProgressTracker::new(progress_capacity);
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancel_handle = Arc::clone(&cancelled);
        let http = self.http.clone();
        let cache = Arc::clone(&self.cache);
        let llm = Arc::clone(&self.llm);
        let pipeline = Arc::clone(&self.pipeline);

        let handle = tokio::spawn(async move {
            if request.network_id() != network.network_id {
                return Err(PipelineError::InvalidRequest(format!(
                    "request network id {} does not match resolved network {}",
                    request.network_id(),
                    network.network_id
                )));
            }

            let request = Arc::new(request);
            let network = Arc::new(network);
            let rpc = Arc::new(RpcClient::new(http.clone(), &network.rpc_url, Arc::clone(&cache), network.network_id));

            let bundle = Arc::new(rpc.fetch_all(request.tx_hash()).await?);

            let baggage = pipeline
                .execute(
                    Arc::clone(&request),
                    Arc::clone(&network),
                    bundle,
                    rpc,
                    cache,
                    http,
                    llm,
                    &mut tracker,
                    Arc::clone(&cancelled),
                )
                .await?;

            let result = assemble_result(&request, &network, &baggage)?;
            tracker.complete(serde_json::to_value(&result).unwrap_or_default());
            Ok(result)
        });

        (handle, rx, cancel_handle)
    }
}

/// Reads every baggage key the final public contract needs and builds the
/// `ExplanationResult`. Invoked only after the pipeline has
/// finished -- a failure here (missing `EXPLANATION`) means the critical
/// `transaction_explainer` somehow finished without writing its key, an
/// internal invariant violation.
fn assemble_result(request: &Request, network: &NetworkConfig, baggage: &SharedBaggage) -> Result<ExplanationResult> {
    let explanation: ExplainerOutput = baggage
        .get(keys::EXPLANATION)
        .ok_or_else(|| PipelineError::Invariant("transaction_explainer finished without writing EXPLANATION".to_string()))?;

    if explanation.summary.trim().is_empty() {
        return Err(PipelineError::Invariant("explanation summary is empty".to_string()));
    }

    let tx_context: Option<TxContext> = baggage.get(keys::TX_CONTEXT);
    let participants: Vec<AddressParticipant> = baggage.get(keys::PARTICIPANTS).unwrap_or_default();
    let transfers: Vec<TokenTransfer> = baggage
        .get(keys::ENRICHED_TRANSFERS)
        .or_else(|| baggage.get(keys::TRANSFERS))
        .unwrap_or_default();
    let annotations: Vec<Annotation> = baggage.get(keys::ANNOTATIONS).unwrap_or_default();
    let provisional_tags: Vec<String> = baggage.get(keys::TAGS).unwrap_or_default();
    let protocols: Vec<Protocol> = baggage.get(keys::PROTOCOLS).unwrap_or_default();

    // The explainer's refined tags supersede the provisional set when present
    // and non-empty; otherwise the provisional set stands.
    let tags = match explanation.refined_tags {
        Some(refined) if !refined.is_empty() => Some(refined),
        _ if !provisional_tags.is_empty() => Some(provisional_tags),
        _ => None,
    };

    let status = match tx_context.as_ref().and_then(|c| c.status_success) {
        Some(true) => TxStatus::Success,
        Some(false) => TxStatus::Reverted,
        None => TxStatus::Failed,
    };

    let mut metadata = serde_json::Map::new();
    if !protocols.is_empty() {
        metadata.insert("protocols".to_string(), serde_json::to_value(&protocols).unwrap_or_default());
    }

    Ok(ExplanationResult {
        tx_hash: request.tx_hash().to_string(),
        network_id: network.network_id,
        summary: explanation.summary,
        participants,
        transfers,
        gas_used: tx_context.as_ref().and_then(|c| c.gas_used).unwrap_or(0),
        gas_price: tx_context.as_ref().and_then(|c| c.gas_price.clone()).unwrap_or_else(|| "0".to_string()),
        status,
        timestamp: tx_context.as_ref().and_then(|c| c.timestamp).unwrap_or(0),
        block_number: tx_context.as_ref().and_then(|c| c.block_number).unwrap_or(0),
        links: explanation.links,
        risks: explanation.risks,
        tags,
        metadata: serde_json::Value::Object(metadata),
        annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_builds_without_cycles_or_missing_deps() {
        build_pipeline().expect("all 19 tools must form a valid DAG");
    }

    #[tokio::test]
    async fn mismatched_network_id_fails_fast() {
        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::MockLlmClient::fixed(serde_json::json!({"summary": "x"})));
        let engine = Engine::new(llm).unwrap();
        let request = Request::new(format!("0x{}", "ab".repeat(32)), 1).unwrap();
        let network = NetworkConfig::for_testing(10).unwrap();
        let (handle, _rx, _cancel) = engine.explain_with_progress(request, network, 16);
        let result = handle.await.unwrap();
        assert!(matches!(result, Err(PipelineError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn cancel_handle_is_independent_per_call() {
        // `explain_with_progress` must hand back a fresh handle each call,
        // not share one across concurrent requests.
        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::MockLlmClient::fixed(serde_json::json!({"summary": "x"})));
        let engine = Engine::new(llm).unwrap();
        let request = Request::new(format!("0x{}", "ab".repeat(32)), 1).unwrap();
        let network = NetworkConfig::for_testing(10).unwrap();
        let (_handle_a, _rx_a, cancel_a) = engine.explain_with_progress(
            request,
            network,
            16,
        );
        let request_b = Request::new(format!("0x{}", "cd".repeat(32)), 10).unwrap();
        let network_b = NetworkConfig::for_testing(10).unwrap();
        let (_handle_b, _rx_b, cancel_b) = engine.explain_with_progress(request_b, network_b, 16);

        cancel_a.store(true, std::sync::atomic::Ordering::Relaxed);
        assert!(cancel_a.load(std::sync::atomic::Ordering::Relaxed));
        assert!(!cancel_b.load(std::sync::atomic::Ordering::Relaxed));
    }
}
