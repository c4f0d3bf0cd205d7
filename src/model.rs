//! Data types shared across tools: the raw transaction bundle and the
//! decoded calls/events every downstream tool reads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The four raw artifacts fetched for a transaction before any tool decodes
/// them into something meaningful. Created once at pipeline entry by the RPC
/// adapter's `fetch_all`, read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct RawTxBundle {
    pub tx: Option<Value>,
    pub receipt: Option<Value>,
    pub trace: Option<Value>,
    pub block: Option<Value>,
    /// The receipt's log array, lifted to a top-level field for convenience
    ///.
    pub logs: Vec<Value>,
}

impl RawTxBundle {
    pub fn status_success(&self) -> Option<bool> {
        self.receipt
            .as_ref()
            .and_then(|r| r.get("status"))
            .map(|v| parse_hex_quantity(v) != 0)
    }

    pub fn block_number(&self) -> Option<u64> {
        self.receipt
            .as_ref()
            .and_then(|r| r.get("blockNumber"))
            .map(parse_hex_quantity)
    }

    pub fn gas_used(&self) -> Option<u64> {
        self.receipt
            .as_ref()
            .and_then(|r| r.get("gasUsed"))
            .map(parse_hex_quantity)
    }

    pub fn gas_price(&self) -> Option<String> {
        self.tx
            .as_ref()
            .and_then(|t| t.get("gasPrice"))
            .and_then(|v| v.as_str())
            .map(parse_hex_to_decimal_string)
    }

    pub fn timestamp(&self) -> Option<u64> {
        self.block
            .as_ref()
            .and_then(|b| b.get("timestamp"))
            .map(parse_hex_quantity)
    }

    pub fn from_address(&self) -> Option<String> {
        self.tx
            .as_ref()
            .and_then(|t| t.get("from"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase())
    }

    pub fn to_address(&self) -> Option<String> {
        self.tx
            .as_ref()
            .and_then(|t| t.get("to"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_lowercase())
    }

    pub fn nonce(&self) -> Option<u64> {
        self.tx.as_ref().and_then(|t| t.get("nonce")).map(parse_hex_quantity)
    }

    /// Every contract address touched by the transaction's calls or logs,
    /// read straight off the raw bundle -- used by `abi_resolver` to decide
    /// what to fetch before anything has been decoded yet.
    ///
    /// Handles both the `callTracer` object shape (`{..., "calls": [...]}`)
    /// and the Parity/Arbitrum-style flat frame list
    /// (`[{"action": {...}, "traceAddress": [...]}, ...]`).
    pub fn touched_addresses(&self) -> std::collections::HashSet<String> {
        let mut addresses = std::collections::HashSet::new();
        if let Some(to) = self.to_address() {
            addresses.insert(to);
        }
        if let Some(trace) = &self.trace {
            collect_trace_addresses(trace, &mut addresses);
        }
        for log in &self.logs {
            if let Some(addr) = log.get("address").and_then(|v| v.as_str()) {
                addresses.insert(addr.to_lowercase());
            }
        }
        addresses
    }
}

fn collect_trace_addresses(node: &Value, out: &mut std::collections::HashSet<String>) {
    match node {
        Value::Object(map) => {
            if let Some(to) = map.get("to").and_then(|v| v.as_str()) {
                out.insert(to.to_lowercase());
            }
            // Parity/Arbitrum-style: address lives under "action".
            if let Some(action) = map.get("action") {
                if let Some(to) = action.get("to").and_then(|v| v.as_str()) {
                    out.insert(to.to_lowercase());
                }
            }
            if let Some(calls) = map.get("calls").and_then(|v| v.as_array()) {
                for call in calls {
                    collect_trace_addresses(call, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_trace_addresses(item, out);
            }
        }
        _ => {}
    }
}

/// Parse a `0x`-prefixed JSON-RPC quantity into a `u64`. Non-hex or missing
/// values parse as 0 -- callers treat absence as "unknown", never a crash.
pub fn parse_hex_quantity(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0)
}

/// Parse a `0x`-prefixed JSON-RPC quantity into a decimal digit string via
/// arbitrary precision, since gas price / value can exceed `u64`.
pub fn parse_hex_to_decimal_string(hex: &str) -> String {
    let trimmed = hex.trim_start_matches("0x");
    if trimmed.is_empty() {
        return "0".to_string();
    }
    num_bigint::BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .map(|n| n.to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// How a decoded call reached the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Call,
    Delegatecall,
    Staticcall,
    Create,
}

impl CallType {
    pub fn from_trace_str(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "DELEGATECALL" => CallType::Delegatecall,
            "STATICCALL" => CallType::Staticcall,
            "CREATE" | "CREATE2" => CallType::Create,
            _ => CallType::Call,
        }
    }
}

/// A decoded contract invocation, whether the top-level
/// call or a nested trace frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub contract: String,
    pub method: String,
    /// Decoded argument name -> value, when an ABI or signature match was
    /// available; empty when the call could not be decoded.
    pub arguments: serde_json::Map<String, Value>,
    pub gas_used: Option<u64>,
    /// Raw wei value transferred with the call, as a decimal-digit string.
    pub value: String,
    pub call_type: CallType,
    pub success: bool,
    pub error_reason: Option<String>,
    pub depth: u32,
    /// Caller, needed for native-value-transfer extraction from traces.
    pub from: String,
    /// 4-byte selector, preserved even when `method` is `"unknown"`.
    pub selector: Option<String>,
    /// Position within the trace, used to key trace-only native transfers.
    pub call_index: u32,
}

/// A decoded log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub contract: String,
    pub name: String,
    pub parameters: serde_json::Map<String, Value>,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: u64,
    pub tx_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_hex_quantity() {
        assert_eq!(parse_hex_quantity(&json!("0x10")), 16);
        assert_eq!(parse_hex_quantity(&json!(null)), 0);
    }

    #[test]
    fn parses_hex_to_decimal_string_for_large_values() {
        assert_eq!(
            parse_hex_to_decimal_string("0xde0b6b3a7640000"),
            "1000000000000000000"
        );
    }

    #[test]
    fn call_type_from_trace_str() {
        assert_eq!(CallType::from_trace_str("DELEGATECALL"), CallType::Delegatecall);
        assert_eq!(CallType::from_trace_str("call"), CallType::Call);
        assert_eq!(CallType::from_trace_str("CREATE2"), CallType::Create);
    }

    #[test]
    fn bundle_reads_status_from_receipt() {
        let bundle = RawTxBundle {
            receipt: Some(json!({"status": "0x1"})),
            ..Default::default()
        };
        assert_eq!(bundle.status_success(), Some(true));
    }

    #[test]
    fn touched_addresses_walks_call_tracer_tree() {
        let bundle = RawTxBundle {
            tx: Some(json!({"to": "0xAAA"})),
            trace: Some(json!({
                "to": "0xAAA",
                "calls": [
                    {"to": "0xBBB", "calls": [{"to": "0xCCC"}]},
                ]
            })),
            ..Default::default()
        };
        let addrs = bundle.touched_addresses();
        assert!(addrs.contains("0xaaa"));
        assert!(addrs.contains("0xbbb"));
        assert!(addrs.contains("0xccc"));
    }

    #[test]
    fn touched_addresses_walks_parity_style_frames_and_logs() {
        let bundle = RawTxBundle {
            trace: Some(json!([
                {"action": {"to": "0xDDD"}, "traceAddress": []},
            ])),
            logs: vec![json!({"address": "0xEEE"})],
            ..Default::default()
        };
        let addrs = bundle.touched_addresses();
        assert!(addrs.contains("0xddd"));
        assert!(addrs.contains("0xeee"));
    }
}
