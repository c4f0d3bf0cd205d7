//! `trace_decoder`: walks the call tree, pairs each call with
//! its ABI (if any) and resolved selector, and produces `calls[]` with
//! per-tree-nesting `depth`, preserving call order. Tolerates an absent
//! trace.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::Value;

use crate::abi;
use crate::error::Result;
use crate::keys;
use crate::model::{parse_hex_quantity, parse_hex_to_decimal_string, Call, CallType};
use crate::rpc::SignatureResolver;
use crate::tool::{Tool, ToolContext};

#[derive(Default)]
pub struct TraceDecoder;

impl TraceDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Flatten either tracer shape into `(frame, depth)` pairs in DFS
    /// pre-order, which is also call order for both shapes.
    fn flatten(trace: &Value) -> Vec<(Value, u32)> {
        if trace.is_array() {
            Self::flatten_parity(trace)
        } else {
            let mut out = Vec::new();
            Self::flatten_call_tracer(trace, 0, &mut out);
            out
        }
    }

    fn flatten_call_tracer(node: &Value, depth: u32, out: &mut Vec<(Value, u32)>) {
        out.push((node.clone(), depth));
        if let Some(calls) = node.get("calls").and_then(|v| v.as_array()) {
            for child in calls {
                Self::flatten_call_tracer(child, depth + 1, out);
            }
        }
    }

    /// Parity/Arbitrum-style traces are already flat, ordered, with a
    /// `traceAddress` array whose length is the nesting depth.
    fn flatten_parity(frames: &[Value]) -> Vec<(Value, u32)> {
        frames
            .iter()
            .map(|frame| {
                let depth = frame
                    .get("traceAddress")
                    .and_then(|v| v.as_array())
                    .map(|a| a.len() as u32)
                    .unwrap_or(0);
                (frame.clone(), depth)
            })
            .collect()
    }

    fn frame_to(frame: &Value) -> Option<&str> {
        frame
            .get("to")
            .and_then(|v| v.as_str())
            .or_else(|| frame.get("action").and_then(|a| a.get("to")).and_then(|v| v.as_str()))
    }

    fn frame_from(frame: &Value) -> Option<&str> {
        frame
            .get("from")
            .and_then(|v| v.as_str())
            .or_else(|| frame.get("action").and_then(|a| a.get("from")).and_then(|v| v.as_str()))
    }

    fn frame_input(frame: &Value) -> Option<&str> {
        frame
            .get("input")
            .and_then(|v| v.as_str())
            .or_else(|| frame.get("action").and_then(|a| a.get("input")).and_then(|v| v.as_str()))
    }

    fn frame_value(frame: &Value) -> String {
        frame
            .get("value")
            .and_then(|v| v.as_str())
            .or_else(|| frame.get("action").and_then(|a| a.get("value")).and_then(|v| v.as_str()))
            .map(parse_hex_to_decimal_string)
            .unwrap_or_else(|| "0".to_string())
    }

    fn frame_gas_used(frame: &Value) -> Option<u64> {
        frame
            .get("gasUsed")
            .or_else(|| frame.get("result").and_then(|r| r.get("gasUsed")))
            .map(parse_hex_quantity)
    }

    fn frame_call_type(frame: &Value) -> CallType {
        let raw = frame
            .get("type")
            .and_then(|v| v.as_str())
            .or_else(|| frame.get("action").and_then(|a| a.get("callType")).and_then(|v| v.as_str()))
            .unwrap_or("call");
        CallType::from_trace_str(raw)
    }

    fn frame_error(frame: &Value) -> Option<String> {
        frame
            .get("error")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }
}

#[async_trait]
impl Tool for TraceDecoder {
    fn name(&self) -> &'static str {
        "trace_decoder"
    }

    fn description(&self) -> &'static str {
        "walks the call tree and pairs each call with its ABI/selector"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::ABI_MAP]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::CALLS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let Some(trace) = ctx.bundle.trace.clone() else {
            return ctx.baggage.set(keys::CALLS, Vec::<Call>::new());
        };
        let abi_map: HashMap<String, Value> = ctx.baggage.get(keys::ABI_MAP).unwrap_or_default();
        let sig_resolver = SignatureResolver::new(ctx.http.clone(), ctx.cache.clone());

        let frames = Self::flatten(&trace);
        let mut calls = Vec::with_capacity(frames.len());

        for (index, (frame, depth)) in frames.into_iter().enumerate() {
            let contract = Self::frame_to(&frame).unwrap_or_default().to_lowercase();
            let from = Self::frame_from(&frame).unwrap_or_default().to_lowercase();
            let input = Self::frame_input(&frame).unwrap_or("0x");
            let input_bytes = hex::decode(input.trim_start_matches("0x")).unwrap_or_default();
            let selector = if input_bytes.len() >= 4 {
                Some(format!("0x{}", hex::encode(&input_bytes[..4])))
            } else {
                None
            };

            let (method, arguments) = match &selector {
                Some(sel) => {
                    let abi_name = abi_map
                        .get(&contract)
                        .and_then(|abi| method_name_from_abi(abi, sel));
                    let sig = match abi_name {
                        Some(name) => name,
                        None => sig_resolver.resolve_method(sel).await,
                    };
                    let args = decode_arguments(&sig, &input_bytes[4.min(input_bytes.len())..]);
                    (sig, args)
                }
                None => ("unknown".to_string(), serde_json::Map::new()),
            };

            calls.push(Call {
                contract,
                method,
                arguments,
                gas_used: Self::frame_gas_used(&frame),
                value: Self::frame_value(&frame),
                call_type: Self::frame_call_type(&frame),
                success: Self::frame_error(&frame).is_none(),
                error_reason: Self::frame_error(&frame),
                depth,
                from,
                selector,
                call_index: index as u32,
            });
        }

        ctx.baggage.set(keys::CALLS, calls)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS)?;
        if calls.is_empty() {
            return None;
        }
        let mut out = format!("### CALL TRACE ({} calls):\n", calls.len());
        for call in calls.iter().take(20) {
            out.push_str(&format!(
                "- [depth {}] {} -> {} ({}){}\n",
                call.depth,
                call.method,
                call.contract,
                if call.success { "ok" } else { "reverted" },
                call.error_reason
                    .as_ref()
                    .map(|r| format!(": {r}"))
                    .unwrap_or_default(),
            ));
        }
        Some(out)
    }
}

/// Look up a known selector against an ABI JSON array, returning the
/// canonical `name(type1,type2)` signature when found.
fn method_name_from_abi(abi: &Value, selector: &str) -> Option<String> {
    let entries = abi.as_array()?;
    for entry in entries {
        if entry.get("type").and_then(|v| v.as_str()) != Some("function") {
            continue;
        }
        let name = entry.get("name").and_then(|v| v.as_str())?;
        let inputs = entry.get("inputs").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let types: Vec<String> = inputs
            .iter()
            .filter_map(|i| i.get("type").and_then(|v| v.as_str()).map(|s| s.to_string()))
            .collect();
        let sig = format!("{name}({})", types.join(","));
        if abi::function_selector_hex(&sig) == selector {
            return Some(sig);
        }
    }
    None
}

/// Best-effort decode of a calldata tail against a canonical signature's
/// parameter list. Only static types (address/uintN/bool/bytes32) are
/// supported -- a dynamic type anywhere in the list means we give up and
/// return an empty map rather than guess.
fn decode_arguments(signature: &str, data: &[u8]) -> serde_json::Map<String, Value> {
    let mut out = serde_json::Map::new();
    let Some(open) = signature.find('(') else {
        return out;
    };
    let Some(close) = signature.rfind(')') else {
        return out;
    };
    let params = &signature[open + 1..close];
    if params.is_empty() {
        return out;
    }
    let types: Vec<&str> = params.split(',').collect();
    if types.iter().any(|t| is_dynamic_type(t)) {
        return out;
    }

    let mut queue: VecDeque<&[u8]> = VecDeque::new();
    for chunk in data.chunks(abi::WORD) {
        queue.push_back(chunk);
    }

    for (idx, ty) in types.iter().enumerate() {
        let Some(word) = queue.pop_front() else { break };
        if word.len() != abi::WORD {
            break;
        }
        let value = match *ty {
            "address" => abi::decode_address(word).map(Value::String).unwrap_or(Value::Null),
            "bool" => Value::Bool(word[abi::WORD - 1] == 1),
            t if t.starts_with("uint") || t.starts_with("int") => abi::decode_uint256(word)
                .map(|n: BigUint| Value::String(n.to_string()))
                .unwrap_or(Value::Null),
            "bytes32" => Value::String(format!("0x{}", hex::encode(word))),
            _ => Value::Null,
        };
        out.insert(format!("arg{idx}"), value);
    }
    out
}

fn is_dynamic_type(ty: &str) -> bool {
    let ty = ty.trim();
    ty == "string" || ty == "bytes" || ty.ends_with("[]")
}
