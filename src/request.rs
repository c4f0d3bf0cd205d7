//! The engine's public entry point: a transaction hash plus a network id.

use crate::error::{PipelineError, Result};

/// What the caller wants explained.
///
/// Validation happens once, at construction, so every downstream stage can
/// assume `tx_hash` is a well-formed `0x`-prefixed 32-byte hex string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    tx_hash: String,
    network_id: u64,
}

impl Request {
    /// Build a request, normalizing and validating `tx_hash` up front.
    ///
    /// Fails fast with [`PipelineError::InvalidRequest`] before any I/O is
    /// attempted: a malformed hash or an unresolvable network id is a client
    /// error, not an upstream failure.
    pub fn new(tx_hash: impl Into<String>, network_id: u64) -> Result<Self> {
        let tx_hash = normalize_tx_hash(&tx_hash.into())?;
        Ok(Self {
            tx_hash,
            network_id,
        })
    }

    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    pub fn network_id(&self) -> u64 {
        self.network_id
    }
}

/// Normalize a transaction hash to lowercase `0x` + 64 hex chars.
fn normalize_tx_hash(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"));
    let hex_part = hex_part.ok_or_else(|| {
        PipelineError::InvalidRequest(format!("tx_hash must be 0x-prefixed: {trimmed}"))
    })?;

    if hex_part.len() != 64 {
        return Err(PipelineError::InvalidRequest(format!(
            "tx_hash must encode exactly 32 bytes, got {} hex chars",
            hex_part.len()
        )));
    }
    if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PipelineError::InvalidRequest(format!(
            "tx_hash contains non-hex characters: {trimmed}"
        )));
    }

    Ok(format!("0x{}", hex_part.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        let req = Request::new(hash.clone(), 1).unwrap();
        assert_eq!(req.tx_hash(), hash);
        assert_eq!(req.network_id(), 1);
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let hash = format!(" 0X{} ", "AB".repeat(32));
        let req = Request::new(hash, 1).unwrap();
        assert_eq!(req.tx_hash(), format!("0x{}", "ab".repeat(32)));
    }

    #[test]
    fn rejects_missing_prefix() {
        let hash = "ab".repeat(32);
        assert!(Request::new(hash, 1).is_err());
    }

    #[test]
    fn rejects_wrong_length() {
        let hash = format!("0x{}", "ab".repeat(31));
        assert!(Request::new(hash, 1).is_err());
    }

    #[test]
    fn rejects_non_hex() {
        let hash = format!("0x{}zz", "ab".repeat(31));
        assert!(Request::new(hash, 1).is_err());
    }
}
