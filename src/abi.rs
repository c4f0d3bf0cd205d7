//! Hand-rolled ABI codec for the specific shapes the engine needs:
//! left-padded addresses, uint256 words, and the standard
//! dynamic string/bytes layout. Also the keccak-based selector/topic/ENS
//! namehash primitives.
//!
//! This is deliberately not a general ABI library -- only the encode/decode
//! shapes the RPC adapter and log decoder actually touch.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

pub const WORD: usize = 32;

/// keccak256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out);
    bytes
}

/// 4-byte function selector from a canonical signature, e.g.
/// `"transfer(address,uint256)"`.
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `0x`-prefixed hex of a function selector.
pub fn function_selector_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(function_selector(signature)))
}

/// Full 32-byte event topic0 from a canonical signature, e.g.
/// `"Transfer(address,address,uint256)"`.
pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// `0x`-prefixed hex of an event topic.
pub fn event_topic_hex(signature: &str) -> String {
    format!("0x{}", hex::encode(event_topic(signature)))
}

/// Encode an address left-padded into a 32-byte ABI word.
pub fn encode_address(address: &str) -> Result<[u8; WORD], String> {
    let bytes = decode_hex_bytes(address)?;
    if bytes.len() != 20 {
        return Err(format!("address must be 20 bytes, got {}", bytes.len()));
    }
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Decode a left-padded 32-byte ABI word into a lowercase `0x`-prefixed
/// 20-byte address.
pub fn decode_address(word: &[u8]) -> Result<String, String> {
    if word.len() != WORD {
        return Err(format!("expected a 32-byte word, got {}", word.len()));
    }
    Ok(format!("0x{}", hex::encode(&word[12..])))
}

/// Encode a `uint256` into a big-endian 32-byte ABI word.
pub fn encode_uint256(value: &BigUint) -> [u8; WORD] {
    let bytes = value.to_bytes_be();
    let mut word = [0u8; WORD];
    let start = WORD.saturating_sub(bytes.len());
    word[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(WORD)..]);
    word
}

/// Decode a big-endian 32-byte ABI word into a `uint256`.
pub fn decode_uint256(word: &[u8]) -> Result<BigUint, String> {
    if word.len() != WORD {
        return Err(format!("expected a 32-byte word, got {}", word.len()));
    }
    Ok(BigUint::from_bytes_be(word))
}

/// Build calldata for a parameter-less function call: just the selector.
pub fn encode_call_no_args(signature: &str) -> Vec<u8> {
    function_selector(signature).to_vec()
}

/// Build calldata for `supportsInterface(bytes4)`.
pub fn encode_supports_interface(interface_id: [u8; 4]) -> Vec<u8> {
    let mut calldata = function_selector("supportsInterface(bytes4)").to_vec();
    let mut word = [0u8; WORD];
    word[..4].copy_from_slice(&interface_id);
    calldata.extend_from_slice(&word);
    calldata
}

/// Build calldata for `balanceOf(address)` / `ownerOf(uint256)` style
/// single-address-argument calls.
pub fn encode_call_address_arg(signature: &str, address: &str) -> Result<Vec<u8>, String> {
    let mut calldata = function_selector(signature).to_vec();
    calldata.extend_from_slice(&encode_address(address)?);
    Ok(calldata)
}

/// Build calldata for a single-uint256-argument call, e.g. `tokenURI(uint256)`.
pub fn encode_call_uint256_arg(signature: &str, value: &BigUint) -> Vec<u8> {
    let mut calldata = function_selector(signature).to_vec();
    calldata.extend_from_slice(&encode_uint256(value));
    calldata
}

/// Decode a standard dynamic string return: a single 32-byte offset word
/// (always `0x20` for a single dynamic return value) followed by a length
/// word and the UTF-8 payload, padded to a 32-byte boundary.
pub fn decode_dynamic_string(data: &[u8]) -> Result<String, String> {
    if data.len() < WORD * 2 {
        return Err("dynamic string payload too short".to_string());
    }
    let length = decode_uint256(&data[WORD..WORD * 2])?;
    let length: usize = length
        .try_into()
        .map_err(|_| "string length does not fit in usize".to_string())?;
    let start = WORD * 2;
    let end = start
        .checked_add(length)
        .ok_or_else(|| "string length overflow".to_string())?;
    if data.len() < end {
        return Err("dynamic string payload truncated".to_string());
    }
    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| format!("dynamic string is not valid utf-8: {e}"))
}

/// Some tokens (notably early ones like MKR) return `bytes32` fixed-width
/// strings for `name()`/`symbol()` instead of the dynamic ABI encoding.
/// Best-effort decode: trim trailing NUL bytes, keep only valid UTF-8.
pub fn decode_fixed_bytes32_string(word: &[u8]) -> Option<String> {
    let trimmed: Vec<u8> = word.iter().cloned().take_while(|&b| b != 0).collect();
    String::from_utf8(trimmed).ok().filter(|s| !s.is_empty())
}

fn decode_hex_bytes(input: &str) -> Result<Vec<u8>, String> {
    let stripped = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(stripped).map_err(|e| format!("invalid hex: {e}"))
}

/// ENS namehash: start with 32 zero bytes; for each label right-to-left,
/// `node = keccak256(node || keccak256(label))`.
pub fn namehash(name: &str) -> [u8; 32] {
    let mut node = [0u8; 32];
    if name.is_empty() {
        return node;
    }
    let labels: Vec<&str> = name.split('.').collect();
    for label in labels.iter().rev() {
        let label_hash = keccak256(label.as_bytes());
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(&node);
        buf[32..].copy_from_slice(&label_hash);
        node = keccak256(&buf);
    }
    node
}

/// The ENS reverse-registrar name for an address: `<lowercased-40-hex>.addr.reverse`.
pub fn reverse_node_name(address: &str) -> String {
    let hex_part = address.strip_prefix("0x").unwrap_or(address).to_lowercase();
    format!("{hex_part}.addr.reverse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_selector_matches_known_value() {
        assert_eq!(
            function_selector_hex("transfer(address,uint256)"),
            "0xa9059cbb"
        );
    }

    #[test]
    fn erc20_transfer_topic_matches_known_value() {
        assert_eq!(
            event_topic_hex("Transfer(address,address,uint256)"),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn address_round_trips() {
        let addr = "0x000000000000000000000000000000000000aa".to_string();
        let word = encode_address(&addr).unwrap();
        assert_eq!(decode_address(&word).unwrap(), addr);
    }

    #[test]
    fn uint256_round_trips() {
        let value = BigUint::from(123_456_789u64);
        let word = encode_uint256(&value);
        assert_eq!(decode_uint256(&word).unwrap(), value);
    }

    #[test]
    fn dynamic_string_decodes() {
        // offset word (0x20) + length word (5) + "hello" padded to 32 bytes
        let mut data = Vec::new();
        data.extend_from_slice(&encode_uint256(&BigUint::from(32u64)));
        data.extend_from_slice(&encode_uint256(&BigUint::from(5u64)));
        let mut payload = b"hello".to_vec();
        payload.resize(32, 0);
        data.extend_from_slice(&payload);
        assert_eq!(decode_dynamic_string(&data).unwrap(), "hello");
    }

    #[test]
    fn namehash_of_empty_is_zero() {
        assert_eq!(namehash(""), [0u8; 32]);
    }

    #[test]
    fn namehash_of_eth_matches_definition() {
        let eth_label_hash = keccak256(b"eth");
        let mut buf = [0u8; 64];
        buf[32..].copy_from_slice(&eth_label_hash);
        let expected = keccak256(&buf);
        assert_eq!(namehash("eth"), expected);
    }

    #[test]
    fn reverse_node_name_lowercases_and_suffixes() {
        assert_eq!(
            reverse_node_name("0xABCDEF0000000000000000000000000000000A"),
            "abcdef0000000000000000000000000000000a.addr.reverse"
        );
    }
}
