//! `transaction_explainer`: the terminal LLM stage. Gathers
//! every registered tool's `prompt_context` fragment, in the order they ran,
//! concatenates them with the request metadata into a single prompt, and
//! requests a structured narrative. Critical: a failure here aborts the
//! pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::keys;
use crate::tool::{Tool, ToolContext};

/// What `transaction_explainer` writes to `keys::EXPLANATION`. `refined_tags`,
/// when present and non-empty, supersedes `tag_resolver`'s set in the final
/// `ExplanationResult.tags`; otherwise `tag_resolver`'s set stands
/// unmodified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainerOutput {
    pub summary: String,
    pub refined_tags: Option<Vec<String>>,
    pub risks: Option<Vec<String>>,
    pub links: HashMap<String, String>,
}

#[derive(Default)]
pub struct TransactionExplainer;

impl TransactionExplainer {
    pub fn new() -> Self {
        Self
    }
}

fn build_prompt(tx_hash: &str, network_name: &str, explorer_url: &str, fragments: &[(String, String)]) -> String {
    let mut out = format!(
        "Write a natural-language explanation of this blockchain transaction.\n\
         Transaction: {tx_hash} on {network_name}\nExplorer: {explorer_url}\n\n",
    );
    for (tool, fragment) in fragments {
        out.push_str(&format!("<!-- from {tool} -->\n{fragment}\n"));
    }
    out.push_str(
        "\nRespond with a JSON object shaped {\"summary\": string, \"refined_tags\": string[] \
         (optional, omit unless you want to override the provisional tag list), \"risks\": \
         string[] (optional), \"links\": object (optional, entity name -> url)}. The summary \
         must be plain prose a non-technical reader can follow, mentioning token symbols, \
         protocol names, and USD amounts where they appear in the evidence above. If the \
         transaction reverted, state that explicitly along with the reason if one is given.\n",
    );
    out
}

fn parse_explanation(value: &serde_json::Value) -> Option<ExplainerOutput> {
    let summary = value.get("summary")?.as_str()?.to_string();
    let refined_tags = value.get("refined_tags").and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>()
    });
    let risks = value.get("risks").and_then(|v| v.as_array()).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>()
    });
    let links = value
        .get("links")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<HashMap<_, _>>()
        })
        .unwrap_or_default();
    Some(ExplainerOutput {
        summary,
        refined_tags,
        risks,
        links,
    })
}

#[async_trait]
impl Tool for TransactionExplainer {
    fn name(&self) -> &'static str {
        "transaction_explainer"
    }

    fn description(&self) -> &'static str {
        "produces the narrative summary from every prior tool's context fragment"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[
            keys::STATIC_KNOWLEDGE,
            keys::TX_CONTEXT,
            keys::ABI_MAP,
            keys::CALLS,
            keys::EVENTS,
            keys::TOKEN_METADATA,
            keys::ICON_MAP,
            keys::TRANSFERS,
            keys::NFT_URIS,
            keys::RESOLVED_SIGNATURES,
            keys::DETECTED_AMOUNTS,
            keys::TOKEN_PRICES,
            keys::GAS_FEE_USD,
            keys::ENRICHED_TRANSFERS,
            keys::PROTOCOLS,
            keys::ENS_MAP,
            keys::TAGS,
            keys::PARTICIPANTS,
        ]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::EXPLANATION]
    }

    fn critical(&self) -> bool {
        true
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let fragments = ctx.baggage.context_fragments();
        let explorer_url = ctx.network.explorer_tx_url(ctx.request.tx_hash());
        let prompt = build_prompt(ctx.request.tx_hash(), &ctx.network.name, &explorer_url, &fragments);

        let (value, _diag) = ctx
            .llm
            .complete_json("transaction_explainer", None, &prompt, None)
            .await
            .map_err(|err| PipelineError::LlmFailure(format!("transaction_explainer: {err}")))?;

        let mut output = parse_explanation(&value)
            .ok_or_else(|| PipelineError::LlmFailure("transaction_explainer: malformed response".to_string()))?;

        output.links.entry("explorer".to_string()).or_insert(explorer_url);

        ctx.baggage.set(keys::EXPLANATION, output)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let explanation: ExplainerOutput = ctx.baggage.get(keys::EXPLANATION)?;
        Some(format!("### SUMMARY:\n{}\n", explanation.summary))
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

    fn test_ctx(responses: Vec<serde_json::Value>) -> ToolContext {
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
            Arc::new(MockLlmClient::new(responses)),
            tracker.sender(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    #[tokio::test]
    async fn writes_summary_and_falls_back_link_to_explorer() {
        let ctx = test_ctx(vec![json!({"summary": "sent 1 ETH"})]);
        ctx.baggage.push_context_fragment("tx_context", "### TRANSACTION CONTEXT:\n".to_string());

        let tool = TransactionExplainer::new();
        tool.process(&ctx).await.unwrap();
        let output: ExplainerOutput = ctx.baggage.get(keys::EXPLANATION).unwrap();
        assert_eq!(output.summary, "sent 1 ETH");
        assert!(output.links.contains_key("explorer"));
    }

    #[tokio::test]
    async fn malformed_response_is_an_error() {
        let ctx = test_ctx(vec![json!({"not_summary": "oops"})]);
        let tool = TransactionExplainer::new();
        assert!(tool.process(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn refined_tags_are_carried_through_when_present() {
        let ctx = test_ctx(vec![json!({"summary": "swap", "refined_tags": ["swap", "defi"]})]);
        let tool = TransactionExplainer::new();
        tool.process(&ctx).await.unwrap();
        let output: ExplainerOutput = ctx.baggage.get(keys::EXPLANATION).unwrap();
        assert_eq!(output.refined_tags, Some(vec!["swap".to_string(), "defi".to_string()]));
    }
}
