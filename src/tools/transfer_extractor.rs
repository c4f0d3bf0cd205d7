//! `token_transfer_extractor`: scans decoded events for the
//! canonical Transfer signatures (ERC-20 / ERC-721 / ERC-1155 single and
//! batch) and decoded calls for native-value movements, producing
//! `transfers[]` with raw (never formatted) amounts.
//!
//! Dedup/ordering: log-sourced transfers are ordered first
//! (ascending `log_index`), trace-only native
//! transfers are appended ordered by call index, and a trace entry agreeing
//! with a log entry on `(contract, from, to, amount, token_id)` is dropped
//! in favor of the log entry's richer metadata.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::model::{Call, Event};
use crate::tool::{Tool, ToolContext};
use crate::transfer::{TokenTransfer, TransferType};

#[derive(Default)]
pub struct TokenTransferExtractor;

impl TokenTransferExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn param_str(event: &Event, key: &str) -> String {
    event.parameters.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string()
}

fn param_opt(event: &Event, key: &str) -> Option<String> {
    event.parameters.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn from_events(events: &[Event]) -> Vec<TokenTransfer> {
    let mut out = Vec::new();
    for event in events {
        match event.name.as_str() {
            "Transfer(address,address,uint256)" if event.parameters.contains_key("tokenId") => {
                out.push(TokenTransfer {
                    kind: TransferType::NftUnique,
                    contract: event.contract.clone(),
                    from: param_str(event, "from"),
                    to: param_str(event, "to"),
                    amount: "1".to_string(),
                    token_id: param_opt(event, "tokenId"),
                    symbol: None,
                    name: None,
                    decimals: None,
                    formatted_amount: None,
                    amount_usd: None,
                    source_index: event.log_index.to_string(),
                });
            }
            "Transfer(address,address,uint256)" if event.parameters.contains_key("value") => {
                out.push(TokenTransfer {
                    kind: TransferType::Fungible,
                    contract: event.contract.clone(),
                    from: param_str(event, "from"),
                    to: param_str(event, "to"),
                    amount: param_str(event, "value"),
                    token_id: None,
                    symbol: None,
                    name: None,
                    decimals: None,
                    formatted_amount: None,
                    amount_usd: None,
                    source_index: event.log_index.to_string(),
                });
            }
            "TransferSingle(address,address,address,uint256,uint256)" => {
                out.push(TokenTransfer {
                    kind: TransferType::NftMulti,
                    contract: event.contract.clone(),
                    from: param_str(event, "from"),
                    to: param_str(event, "to"),
                    amount: param_str(event, "value"),
                    token_id: param_opt(event, "id"),
                    symbol: None,
                    name: None,
                    decimals: None,
                    formatted_amount: None,
                    amount_usd: None,
                    source_index: event.log_index.to_string(),
                });
            }
            "TransferBatch(address,address,address,uint256[],uint256[])" => {
                let ids = event.parameters.get("ids").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                let values = event.parameters.get("values").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                for (id, value) in ids.iter().zip(values.iter()) {
                    out.push(TokenTransfer {
                        kind: TransferType::NftMulti,
                        contract: event.contract.clone(),
                        from: param_str(event, "from"),
                        to: param_str(event, "to"),
                        amount: value.as_str().unwrap_or_default().to_string(),
                        token_id: id.as_str().map(str::to_string),
                        symbol: None,
                        name: None,
                        decimals: None,
                        formatted_amount: None,
                        amount_usd: None,
                        source_index: event.log_index.to_string(),
                    });
                }
            }
            _ => {}
        }
    }
    out.sort_by_key(|t| t.source_index.parse::<u64>().unwrap_or(u64::MAX));
    out
}

fn native_from_calls(calls: &[Call]) -> Vec<TokenTransfer> {
    let mut out: Vec<(u32, TokenTransfer)> = calls
        .iter()
        .filter(|c| c.success && c.value != "0" && !c.value.is_empty())
        .map(|c| {
            (
                c.call_index,
                TokenTransfer {
                    kind: TransferType::Native,
                    contract: String::new(),
                    from: c.from.clone(),
                    to: c.contract.clone(),
                    amount: c.value.clone(),
                    token_id: None,
                    symbol: None,
                    name: None,
                    decimals: None,
                    formatted_amount: None,
                    amount_usd: None,
                    source_index: format!("trace:{}", c.call_index),
                },
            )
        })
        .collect();
    out.sort_by_key(|(idx, _)| *idx);
    out.into_iter().map(|(_, t)| t).collect()
}

#[async_trait]
impl Tool for TokenTransferExtractor {
    fn name(&self) -> &'static str {
        "token_transfer_extractor"
    }

    fn description(&self) -> &'static str {
        "scans decoded events and calls for token/native transfers"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::EVENTS, keys::CALLS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::TRANSFERS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS).unwrap_or_default();
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();

        let log_sourced = from_events(&events);
        let trace_sourced = native_from_calls(&calls);

        let mut seen: HashMap<(String, String, String, String, Option<String>), ()> = HashMap::new();
        let mut transfers = Vec::with_capacity(log_sourced.len() + trace_sourced.len());
        for t in log_sourced {
            seen.insert(t.dedup_key(), ());
            transfers.push(t);
        }
        for t in trace_sourced {
            if seen.contains_key(&t.dedup_key()) {
                continue;
            }
            transfers.push(t);
        }

        ctx.baggage.set(keys::TRANSFERS, transfers)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS)?;
        if transfers.is_empty() {
            return None;
        }
        let mut out = format!("### TOKEN TRANSFERS ({}):\n", transfers.len());
        for t in transfers.iter().take(20) {
            out.push_str(&format!("- {:?} {} {} -> {}\n", t.kind, t.amount, t.from, t.to));
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

    fn fungible_event(log_index: u64, from: &str, to: &str, value: &str) -> Event {
        let mut parameters = serde_json::Map::new();
        parameters.insert("from".to_string(), json!(from));
        parameters.insert("to".to_string(), json!(to));
        parameters.insert("value".to_string(), json!(value));
        Event {
            contract: "0xtoken".to_string(),
            name: "Transfer(address,address,uint256)".to_string(),
            parameters,
            topics: vec![],
            data: "0x".to_string(),
            block_number: 1,
            tx_index: 0,
            log_index,
            removed: false,
        }
    }

    #[tokio::test]
    async fn extracts_fungible_transfer_from_events() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::EVENTS, vec![fungible_event(0, "0xfrom", "0xto", "100")]).unwrap();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        let tool = TokenTransferExtractor::new();
        tool.process(&ctx).await.unwrap();
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].kind, TransferType::Fungible);
        assert_eq!(transfers[0].amount, "100");
    }

    fn native_call(call_index: u32, from: &str, to: &str, value: &str) -> Call {
        Call {
            contract: to.to_string(),
            method: "unknown".to_string(),
            arguments: serde_json::Map::new(),
            gas_used: Some(21000),
            value: value.to_string(),
            call_type: CallType::Call,
            success: true,
            error_reason: None,
            depth: 0,
            from: from.to_string(),
            selector: None,
            call_index,
        }
    }

    #[tokio::test]
    async fn native_transfers_are_appended_after_log_sourced_ones() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::EVENTS, vec![fungible_event(0, "0xfrom", "0xto", "100")]).unwrap();
        ctx.baggage.set(keys::CALLS, vec![native_call(0, "0xa", "0xb", "500")]).unwrap();
        let tool = TokenTransferExtractor::new();
        tool.process(&ctx).await.unwrap();
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap();
        assert_eq!(transfers.len(), 2);
        assert_eq!(transfers[0].kind, TransferType::Fungible);
        assert_eq!(transfers[1].kind, TransferType::Native);
    }

    #[tokio::test]
    async fn zero_value_calls_produce_no_native_transfer() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::EVENTS, Vec::<Event>::new()).unwrap();
        ctx.baggage.set(keys::CALLS, vec![native_call(0, "0xa", "0xb", "0")]).unwrap();
        let tool = TokenTransferExtractor::new();
        tool.process(&ctx).await.unwrap();
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap();
        assert!(transfers.is_empty());
    }
}
