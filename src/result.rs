//! The engine's public output contract. These types
//! derive `Serialize` so the out-of-scope HTTP/SSE layer can frame them
//! without this crate knowing how -- baggage itself never derives
//! `Serialize` as a whole, so a result built here can never accidentally
//! carry the baggage's internal state back into the public view).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::transfer::TokenTransfer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantCategory {
    User,
    Protocol,
    Token,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantKind {
    Eoa,
    Contract,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressParticipant {
    pub address: String,
    /// Free-form phrase, e.g. "token owner", "lending pool", "swap router".
    pub role: String,
    pub category: ParticipantCategory,
    pub kind: ParticipantKind,
    pub ens_name: Option<String>,
    pub name: Option<String>,
    pub icon: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// `"N@<substring>"` -- the Nth occurrence of `substring` in the
    /// narrative.
    pub text_anchor: String,
    pub link: Option<String>,
    pub tooltip: Option<String>,
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Success,
    Failed,
    Reverted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationResult {
    pub tx_hash: String,
    pub network_id: u64,
    pub summary: String,
    pub participants: Vec<AddressParticipant>,
    pub transfers: Vec<TokenTransfer>,
    pub gas_used: u64,
    pub gas_price: String,
    pub status: TxStatus,
    pub timestamp: u64,
    pub block_number: u64,
    pub links: HashMap<String, String>,
    pub risks: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
    pub metadata: serde_json::Value,
    pub annotations: Vec<Annotation>,
}

/// Build `Annotation.text_anchor` for the `index`-th occurrence of `needle`
/// in `haystack` (0-based occurrence -> 1-based anchor in `"N@<substring>"`
/// format), and verify that occurrence actually exists.
pub fn anchor_for_occurrence(haystack: &str, needle: &str, occurrence: usize) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let mut start = 0usize;
    for n in 0..=occurrence {
        let found = haystack[start..].find(needle)?;
        let abs = start + found;
        if n == occurrence {
            return Some(format!("{}@{}", occurrence + 1, needle));
        }
        start = abs + needle.len();
    }
    None
}

/// Count occurrences of `needle` in `haystack`, used by the annotation
/// generator to pick a valid occurrence index before anchoring.
pub fn occurrence_count(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack.matches(needle).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_for_first_occurrence() {
        let anchor = anchor_for_occurrence("swap USDC for USDC again", "USDC", 0).unwrap();
        assert_eq!(anchor, "1@USDC");
    }

    #[test]
    fn anchor_for_second_occurrence_requires_it_to_exist() {
        assert!(anchor_for_occurrence("swap USDC for USDC again", "USDC", 1).is_some());
        assert!(anchor_for_occurrence("swap USDC for USDC again", "USDC", 2).is_none());
    }

    #[test]
    fn occurrence_count_matches_matches_iterator() {
        assert_eq!(occurrence_count("aXaXa", "a"), 3);
        assert_eq!(occurrence_count("no match here", "zzz"), 0);
    }
}
