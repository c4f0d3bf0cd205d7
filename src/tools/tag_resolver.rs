//! `tag_resolver`: LLM-assisted. Matches the transaction
//! against the curated tag taxonomy, keeping only matches the model reports
//! at or above 0.6 confidence. This is the provisional tag set --
//! `transaction_explainer`'s optional `refined_tags` may override it later.

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::model::{Call, Event};
use crate::tool::{Tool, ToolContext};
use crate::tools::protocol_resolver::Protocol;
use crate::tools::static_context::StaticKnowledge;
use crate::transfer::TokenTransfer;

const TAG_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Default)]
pub struct TagResolver;

impl TagResolver {
    pub fn new() -> Self {
        Self
    }
}

fn build_prompt(
    static_knowledge: &StaticKnowledge,
    calls: &[Call],
    events: &[Event],
    transfers: &[TokenTransfer],
    protocols: &[Protocol],
) -> String {
    let mut out = String::from(
        "Known tag taxonomy:\n",
    );
    for tag in &static_knowledge.tags {
        out.push_str(&format!("- {}: {}\n", tag.name, tag.description));
    }
    out.push_str(&format!(
        "\nEvidence: {} call(s), {} event(s), {} transfer(s), protocols: {}\n",
        calls.len(),
        events.len(),
        transfers.len(),
        protocols.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "),
    ));
    out.push_str(
        "Respond with a JSON array of objects shaped {\"tag\": string, \"confidence\": number} \
         using only tag names from the taxonomy above. Respond with [] if nothing applies.\n",
    );
    out
}

fn parse_llm_tags(value: &serde_json::Value) -> Vec<(String, f64)> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let tag = item.get("tag")?.as_str()?.to_string();
                    let confidence = item.get("confidence")?.as_f64()?;
                    Some((tag, confidence))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for TagResolver {
    fn name(&self) -> &'static str {
        "tag_resolver"
    }

    fn description(&self) -> &'static str {
        "matches the transaction against the curated tag taxonomy"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::STATIC_KNOWLEDGE, keys::CALLS, keys::EVENTS, keys::TRANSFERS, keys::PROTOCOLS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::TAGS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let static_knowledge: StaticKnowledge = ctx
            .baggage
            .get(keys::STATIC_KNOWLEDGE)
            .unwrap_or_else(StaticKnowledge::load_embedded);
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS).unwrap_or_default();
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap_or_default();
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS).unwrap_or_default();

        if static_knowledge.tags.is_empty() {
            return ctx.baggage.set(keys::TAGS, Vec::<String>::new());
        }

        let prompt = build_prompt(&static_knowledge, &calls, &events, &transfers, &protocols);
        let known_names: std::collections::HashSet<&str> =
            static_knowledge.tags.iter().map(|t| t.name.as_str()).collect();

        let tags = match ctx.llm.complete_json("tag_resolver", None, &prompt, None).await {
            Ok((value, _diag)) => parse_llm_tags(&value)
                .into_iter()
                .filter(|(tag, confidence)| *confidence >= TAG_CONFIDENCE_THRESHOLD && known_names.contains(tag.as_str()))
                .map(|(tag, _)| tag)
                .collect(),
            Err(_) => Vec::new(),
        };

        ctx.baggage.set(keys::TAGS, tags)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let tags: Vec<String> = ctx.baggage.get(keys::TAGS)?;
        if tags.is_empty() {
            return None;
        }
        Some(format!("### TAGS: {}\n", tags.join(", ")))
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
    use crate::tools::static_context::TagDefinition;

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

    fn knowledge_with_tag(name: &str) -> StaticKnowledge {
        let mut knowledge = StaticKnowledge::default();
        knowledge.tags.push(TagDefinition { name: name.to_string(), description: "desc".to_string() });
        knowledge
    }

    #[tokio::test]
    async fn low_confidence_tags_are_dropped() {
        let ctx = test_ctx(vec![json!([{"tag": "dex_swap", "confidence": 0.4}])]);
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, knowledge_with_tag("dex_swap")).unwrap();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage.set(keys::TRANSFERS, Vec::<TokenTransfer>::new()).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();

        let tool = TagResolver::new();
        tool.process(&ctx).await.unwrap();
        let tags: Vec<String> = ctx.baggage.get(keys::TAGS).unwrap();
        assert!(tags.is_empty());
    }

    #[tokio::test]
    async fn high_confidence_known_tag_is_kept() {
        let ctx = test_ctx(vec![json!([{"tag": "dex_swap", "confidence": 0.9}])]);
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, knowledge_with_tag("dex_swap")).unwrap();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage.set(keys::TRANSFERS, Vec::<TokenTransfer>::new()).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();

        let tool = TagResolver::new();
        tool.process(&ctx).await.unwrap();
        let tags: Vec<String> = ctx.baggage.get(keys::TAGS).unwrap();
        assert_eq!(tags, vec!["dex_swap".to_string()]);
    }

    #[tokio::test]
    async fn empty_taxonomy_skips_llm_call() {
        let ctx = test_ctx(vec![json!([{"tag": "dex_swap", "confidence": 0.9}])]);
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, StaticKnowledge::default()).unwrap();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage.set(keys::TRANSFERS, Vec::<TokenTransfer>::new()).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();

        let tool = TagResolver::new();
        tool.process(&ctx).await.unwrap();
        let tags: Vec<String> = ctx.baggage.get(keys::TAGS).unwrap();
        assert!(tags.is_empty());
    }
}
