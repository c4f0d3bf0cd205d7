//! `protocol_resolver`: names the protocols involved in the
//! transaction. Contracts matching the curated static table are classified
//! for free; everything else is handed to the model together with its
//! decoded calls/events as evidence for an LLM-assisted guess.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::keys;
use crate::model::{Call, Event};
use crate::tool::{Tool, ToolContext};
use crate::tools::static_context::StaticKnowledge;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    pub address: String,
    pub name: String,
    pub kind: String,
    /// `"static"` (curated table) or `"llm"` (model inference).
    pub source: &'static str,
}

#[derive(Default)]
pub struct ProtocolResolver;

impl ProtocolResolver {
    pub fn new() -> Self {
        Self
    }
}

fn candidate_addresses(calls: &[Call], events: &[Event]) -> HashSet<String> {
    let mut addresses = HashSet::new();
    for call in calls {
        addresses.insert(call.contract.to_lowercase());
    }
    for event in events {
        addresses.insert(event.contract.to_lowercase());
    }
    addresses
}

fn build_prompt(addresses: &[String], calls: &[Call], events: &[Event]) -> String {
    let mut out = String::from(
        "For each contract address below, infer the protocol it belongs to from the method \
         and event names it participates in. Respond with a JSON array of objects shaped \
         {\"address\": string, \"name\": string, \"kind\": string} (kind e.g. dex, lending, \
         nft_marketplace, bridge, unknown). Omit any address you cannot classify.\n\n",
    );
    for address in addresses {
        out.push_str(&format!("Address {address}:\n"));
        for call in calls.iter().filter(|c| c.contract.eq_ignore_ascii_case(address)).take(5) {
            out.push_str(&format!("  call: {}\n", call.method));
        }
        for event in events.iter().filter(|e| e.contract.eq_ignore_ascii_case(address)).take(5) {
            out.push_str(&format!("  event: {}\n", event.name));
        }
    }
    out
}

fn parse_llm_protocols(value: &serde_json::Value) -> Vec<Protocol> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    Some(Protocol {
                        address: item.get("address")?.as_str()?.to_lowercase(),
                        name: item.get("name")?.as_str()?.to_string(),
                        kind: item.get("kind").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
                        source: "llm",
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for ProtocolResolver {
    fn name(&self) -> &'static str {
        "protocol_resolver"
    }

    fn description(&self) -> &'static str {
        "identifies the protocols the transaction interacted with"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::CALLS, keys::EVENTS, keys::STATIC_KNOWLEDGE]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::PROTOCOLS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS).unwrap_or_default();
        let static_knowledge: StaticKnowledge = ctx
            .baggage
            .get(keys::STATIC_KNOWLEDGE)
            .unwrap_or_else(StaticKnowledge::load_embedded);

        let addresses = candidate_addresses(&calls, &events);
        let mut protocols = Vec::new();
        let mut unmatched = Vec::new();

        for address in addresses {
            if let Some(known) = static_knowledge.protocols.get(&address) {
                protocols.push(Protocol {
                    address: address.clone(),
                    name: known.name.clone(),
                    kind: known.kind.clone(),
                    source: "static",
                });
            } else {
                unmatched.push(address);
            }
        }

        if !unmatched.is_empty() {
            let prompt = build_prompt(&unmatched, &calls, &events);
            if let Ok((value, _diag)) = ctx
                .llm
                .complete_json("protocol_resolver", None, &prompt, None)
                .await
            {
                protocols.extend(parse_llm_protocols(&value));
            }
        }

        ctx.baggage.set(keys::PROTOCOLS, protocols)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS)?;
        if protocols.is_empty() {
            return None;
        }
        let mut out = format!("### PROTOCOLS INVOLVED ({}):\n", protocols.len());
        for p in protocols.iter().take(20) {
            out.push_str(&format!("- {} ({}) at {}\n", p.name, p.kind, p.address));
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
    use crate::tools::static_context::KnownProtocol;

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
            Arc::new(MockLlmClient::fixed(json!([]))),
            tracker.sender(),
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn call(contract: &str, method: &str) -> Call {
        Call {
            contract: contract.to_string(),
            method: method.to_string(),
            arguments: serde_json::Map::new(),
            gas_used: Some(1),
            value: "0".to_string(),
            call_type: CallType::Call,
            success: true,
            error_reason: None,
            depth: 0,
            from: "0xfrom".to_string(),
            selector: None,
            call_index: 0,
        }
    }

    #[tokio::test]
    async fn static_table_match_skips_llm() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::CALLS, vec![call("0xrouter", "swap")]).unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        let mut knowledge = StaticKnowledge::default();
        knowledge.protocols.insert(
            "0xrouter".to_string(),
            KnownProtocol { name: "Uniswap".to_string(), kind: "dex".to_string() },
        );
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, knowledge).unwrap();

        let tool = ProtocolResolver::new();
        tool.process(&ctx).await.unwrap();
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS).unwrap();
        assert_eq!(protocols.len(), 1);
        assert_eq!(protocols[0].name, "Uniswap");
        assert_eq!(protocols[0].source, "static");
    }

    #[tokio::test]
    async fn no_calls_or_events_yields_empty() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, StaticKnowledge::default()).unwrap();
        let tool = ProtocolResolver::new();
        tool.process(&ctx).await.unwrap();
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS).unwrap();
        assert!(protocols.is_empty());
    }
}
