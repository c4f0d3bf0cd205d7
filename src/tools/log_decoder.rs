//! `log_decoder`: decodes receipt logs against ABIs where
//! possible, otherwise via resolved topic0. Handles indexed vs non-indexed
//! parameters for the canonical ERC-20/721/1155 transfer/approval events
//! directly, and falls back to best-effort generic decoding for anything
//! else an ABI describes. An unrecognized event is kept with `name =
//! "unknown"` rather than dropped.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::abi;
use crate::error::Result;
use crate::keys;
use crate::model::Event;
use crate::model::{parse_hex_quantity};
use crate::rpc::SignatureResolver;
use crate::tool::{Tool, ToolContext};

#[derive(Default)]
pub struct LogDecoder;

impl LogDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for LogDecoder {
    fn name(&self) -> &'static str {
        "log_decoder"
    }

    fn description(&self) -> &'static str {
        "decodes receipt logs against ABIs or resolved topic0 signatures"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::ABI_MAP]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::EVENTS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let abi_map: HashMap<String, Value> = ctx.baggage.get(keys::ABI_MAP).unwrap_or_default();
        let sig_resolver = SignatureResolver::new(ctx.http.clone(), ctx.cache.clone());

        let mut events = Vec::with_capacity(ctx.bundle.logs.len());
        for (log_index_position, log) in ctx.bundle.logs.iter().enumerate() {
            let contract = log
                .get("address")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_lowercase();
            let topics: Vec<String> = log
                .get("topics")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|t| t.as_str().map(|s| s.to_lowercase())).collect())
                .unwrap_or_default();
            let data_hex = log.get("data").and_then(|v| v.as_str()).unwrap_or("0x").to_string();
            let data_bytes = hex::decode(data_hex.trim_start_matches("0x")).unwrap_or_default();
            let removed = log.get("removed").and_then(|v| v.as_bool()).unwrap_or(false);
            let block_number = log.get("blockNumber").map(parse_hex_quantity).unwrap_or(0);
            let tx_index = log.get("transactionIndex").map(parse_hex_quantity).unwrap_or(0);
            let log_index = log
                .get("logIndex")
                .map(parse_hex_quantity)
                .unwrap_or(log_index_position as u64);

            let topic0 = topics.first().cloned().unwrap_or_default();
            let (name, parameters) = if let Some(canonical) = canonical_signature_for_topic0(&topic0) {
                (canonical.to_string(), decode_canonical_event(canonical, &topics, &data_bytes))
            } else if let Some(sig) = abi_map.get(&contract).and_then(|abi| event_name_from_abi(abi, &topic0)) {
                let params = decode_generic_event(&sig, &topics, &data_bytes);
                (sig, params)
            } else {
                let resolved = sig_resolver.resolve_event(&topic0).await;
                if resolved == "unknown" {
                    ("unknown".to_string(), serde_json::Map::new())
                } else {
                    let params = decode_generic_event(&resolved, &topics, &data_bytes);
                    (resolved, params)
                }
            };

            events.push(Event {
                contract,
                name,
                parameters,
                topics,
                data: data_hex,
                block_number,
                tx_index,
                log_index,
                removed,
            });
        }

        ctx.baggage.set(keys::EVENTS, events)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS)?;
        if events.is_empty() {
            return None;
        }
        let mut out = format!("### DECODED EVENTS ({} logs):\n", events.len());
        for event in events.iter().take(20) {
            out.push_str(&format!("- {} @ {}\n", event.name, event.contract));
        }
        Some(out)
    }
}

const ERC20_TRANSFER: &str = "Transfer(address,address,uint256)";
const ERC20_APPROVAL: &str = "Approval(address,address,uint256)";
const ERC721_TRANSFER: &str = "Transfer(address,address,uint256)";
const ERC1155_TRANSFER_SINGLE: &str = "TransferSingle(address,address,address,uint256,uint256)";
const ERC1155_TRANSFER_BATCH: &str = "TransferBatch(address,address,address,uint256[],uint256[])";

fn canonical_signature_for_topic0(topic0: &str) -> Option<&'static str> {
    if topic0 == abi::event_topic_hex(ERC20_TRANSFER) {
        Some(ERC20_TRANSFER)
    } else if topic0 == abi::event_topic_hex(ERC20_APPROVAL) {
        Some(ERC20_APPROVAL)
    } else if topic0 == abi::event_topic_hex(ERC1155_TRANSFER_SINGLE) {
        Some(ERC1155_TRANSFER_SINGLE)
    } else if topic0 == abi::event_topic_hex(ERC1155_TRANSFER_BATCH) {
        Some(ERC1155_TRANSFER_BATCH)
    } else {
        None
    }
}

/// Decode one of the four canonical transfer/approval shapes (ERC-20
/// Transfer/Approval, ERC-721 Transfer, ERC-1155 TransferSingle),
/// disambiguating ERC-20 Transfer (2 indexed + 1 data word) from ERC-721
/// Transfer (3 indexed, no data) by topic count.
fn decode_canonical_event(signature: &str, topics: &[String], data: &[u8]) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    match signature {
        ERC20_TRANSFER if topics.len() == 4 => {
            // ERC-721 Transfer: all three params indexed.
            insert_address(&mut out, "from", topics.get(1));
            insert_address(&mut out, "to", topics.get(2));
            insert_uint_topic(&mut out, "tokenId", topics.get(3));
        }
        ERC20_TRANSFER => {
            insert_address(&mut out, "from", topics.get(1));
            insert_address(&mut out, "to", topics.get(2));
            insert_uint_data(&mut out, "value", data, 0);
        }
        ERC20_APPROVAL => {
            insert_address(&mut out, "owner", topics.get(1));
            insert_address(&mut out, "spender", topics.get(2));
            insert_uint_data(&mut out, "value", data, 0);
        }
        ERC1155_TRANSFER_SINGLE => {
            insert_address(&mut out, "operator", topics.get(1));
            insert_address(&mut out, "from", topics.get(2));
            insert_address(&mut out, "to", topics.get(3));
            insert_uint_data(&mut out, "id", data, 0);
            insert_uint_data(&mut out, "value", data, 1);
        }
        ERC1155_TRANSFER_BATCH => {
            insert_address(&mut out, "operator", topics.get(1));
            insert_address(&mut out, "from", topics.get(2));
            insert_address(&mut out, "to", topics.get(3));
            let (ids, values) = decode_parallel_dynamic_arrays(data);
            out.insert("ids".to_string(), Value::Array(ids));
            out.insert("values".to_string(), Value::Array(values));
        }
        _ => {}
    }
    out
}

fn insert_address(out: &mut serde_json::Map<String, Value>, key: &str, topic: Option<&String>) {
    if let Some(topic) = topic {
        if let Ok(bytes) = hex::decode(topic.trim_start_matches("0x")) {
            if bytes.len() == abi::WORD {
                if let Ok(addr) = abi::decode_address(&bytes) {
                    out.insert(key.to_string(), Value::String(addr));
                    return;
                }
            }
        }
    }
    out.insert(key.to_string(), Value::Null);
}

fn insert_uint_topic(out: &mut serde_json::Map<String, Value>, key: &str, topic: Option<&String>) {
    if let Some(topic) = topic {
        if let Ok(bytes) = hex::decode(topic.trim_start_matches("0x")) {
            if bytes.len() == abi::WORD {
                if let Ok(n) = abi::decode_uint256(&bytes) {
                    out.insert(key.to_string(), Value::String(n.to_string()));
                    return;
                }
            }
        }
    }
    out.insert(key.to_string(), Value::Null);
}

fn insert_uint_data(out: &mut serde_json::Map<String, Value>, key: &str, data: &[u8], word_index: usize) {
    let start = word_index * abi::WORD;
    let end = start + abi::WORD;
    if data.len() >= end {
        if let Ok(n) = abi::decode_uint256(&data[start..end]) {
            out.insert(key.to_string(), Value::String(n.to_string()));
            return;
        }
    }
    out.insert(key.to_string(), Value::Null);
}

/// `TransferBatch`'s data is two parallel dynamic `uint256[]` arrays: each
/// has an offset word up front, then its own length + elements.
fn decode_parallel_dynamic_arrays(data: &[u8]) -> (Vec<Value>, Vec<Value>) {
    let read_array = |offset_word_index: usize| -> Vec<Value> {
        let offset_start = offset_word_index * abi::WORD;
        let Some(offset_word) = data.get(offset_start..offset_start + abi::WORD) else {
            return Vec::new();
        };
        let Ok(offset) = abi::decode_uint256(offset_word) else {
            return Vec::new();
        };
        let offset: usize = offset.try_into().unwrap_or(0);
        let Some(len_word) = data.get(offset..offset + abi::WORD) else {
            return Vec::new();
        };
        let Ok(len) = abi::decode_uint256(len_word) else {
            return Vec::new();
        };
        let len: usize = len.try_into().unwrap_or(0);
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            let start = offset + abi::WORD + i * abi::WORD;
            if let Some(word) = data.get(start..start + abi::WORD) {
                if let Ok(n) = abi::decode_uint256(word) {
                    items.push(Value::String(n.to_string()));
                    continue;
                }
            }
            items.push(Value::Null);
        }
        items
    };
    (read_array(0), read_array(1))
}

fn event_name_from_abi(abi: &Value, topic0: &str) -> Option<String> {
    let entries = abi.as_array()?;
    for entry in entries {
        if entry.get("type").and_then(|v| v.as_str()) != Some("event") {
            continue;
        }
        let name = entry.get("name").and_then(|v| v.as_str())?;
        let inputs = entry.get("inputs").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let types: Vec<String> = inputs
            .iter()
            .filter_map(|i| i.get("type").and_then(|v| v.as_str()).map(|s| s.to_string()))
            .collect();
        let sig = format!("{name}({})", types.join(","));
        if abi::event_topic_hex(&sig) == topic0 {
            return Some(sig);
        }
    }
    None
}

/// Generic best-effort decode for an ABI/signature-resolved event whose
/// parameter ordering we don't have indexed/non-indexed metadata for --
/// assumes every declared parameter after the signature is non-indexed and
/// walks `data` sequentially. Good enough for static-type events; dynamic
/// types are left undecoded as `null`.
fn decode_generic_event(signature: &str, _topics: &[String], data: &[u8]) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    let Some(open) = signature.find('(') else { return out };
    let Some(close) = signature.rfind(')') else { return out };
    let params = &signature[open + 1..close];
    if params.is_empty() {
        return out;
    }
    for (idx, ty) in params.split(',').enumerate() {
        let ty = ty.trim();
        let start = idx * abi::WORD;
        let end = start + abi::WORD;
        let value = if ty == "address" {
            data.get(start..end).and_then(|w| abi::decode_address(w).ok()).map(Value::String)
        } else if ty.starts_with("uint") || ty.starts_with("int") {
            data.get(start..end).and_then(|w| abi::decode_uint256(w).ok()).map(|n| Value::String(n.to_string()))
        } else if ty == "bool" {
            data.get(start..end).map(|w| Value::Bool(w[abi::WORD - 1] == 1))
        } else {
            None
        };
        out.insert(format!("param{idx}"), value.unwrap_or(Value::Null));
    }
    out
}
