//! `static_context_provider`: curated CSV tables of
//! token/protocol/tag knowledge, loaded once at construction and published
//! to every execution unchanged.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};

const KNOWN_TOKENS_CSV: &str = include_str!("../../data/known_tokens.csv");
const KNOWN_PROTOCOLS_CSV: &str = include_str!("../../data/known_protocols.csv");
const TAG_TAXONOMY_CSV: &str = include_str!("../../data/tag_taxonomy.csv");

#[derive(Debug, Clone)]
pub struct KnownToken {
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
}

#[derive(Debug, Clone)]
pub struct KnownProtocol {
    pub name: String,
    pub kind: String,
}

#[derive(Debug, Clone)]
pub struct TagDefinition {
    pub name: String,
    pub description: String,
}

/// Curated, compile-time-embedded knowledge, identical for every execution.
#[derive(Debug, Clone, Default)]
pub struct StaticKnowledge {
    pub tokens: HashMap<String, KnownToken>,
    pub protocols: HashMap<String, KnownProtocol>,
    pub tags: Vec<TagDefinition>,
}

impl StaticKnowledge {
    pub fn load_embedded() -> Self {
        let mut tokens = HashMap::new();
        let mut reader = csv::Reader::from_reader(KNOWN_TOKENS_CSV.as_bytes());
        for record in reader.records().flatten() {
            if record.len() < 4 {
                continue;
            }
            let address = record[0].to_lowercase();
            let decimals = record[3].parse().unwrap_or(18);
            tokens.insert(
                address,
                KnownToken {
                    symbol: record[1].to_string(),
                    name: record[2].to_string(),
                    decimals,
                },
            );
        }

        let mut protocols = HashMap::new();
        let mut reader = csv::Reader::from_reader(KNOWN_PROTOCOLS_CSV.as_bytes());
        for record in reader.records().flatten() {
            if record.len() < 3 {
                continue;
            }
            let address = record[0].to_lowercase();
            protocols.insert(
                address,
                KnownProtocol {
                    name: record[1].to_string(),
                    kind: record[2].to_string(),
                },
            );
        }

        let mut tags = Vec::new();
        let mut reader = csv::Reader::from_reader(TAG_TAXONOMY_CSV.as_bytes());
        for record in reader.records().flatten() {
            if record.len() < 2 {
                continue;
            }
            tags.push(TagDefinition {
                name: record[0].to_string(),
                description: record[1].to_string(),
            });
        }

        Self { tokens, protocols, tags }
    }

    fn as_prompt_fragment(&self) -> String {
        let mut out = String::from("### KNOWN TAG TAXONOMY:\n");
        for tag in &self.tags {
            out.push_str(&format!("- {}: {}\n", tag.name, tag.description));
        }
        out
    }
}

pub struct StaticContextProvider {
    knowledge: StaticKnowledge,
}

impl StaticContextProvider {
    pub fn new() -> Self {
        Self {
            knowledge: StaticKnowledge::load_embedded(),
        }
    }
}

impl Default for StaticContextProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for StaticContextProvider {
    fn name(&self) -> &'static str {
        "static_context_provider"
    }

    fn description(&self) -> &'static str {
        "loads curated token/protocol/tag knowledge"
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::STATIC_KNOWLEDGE]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        ctx.baggage.set(keys::STATIC_KNOWLEDGE, self.knowledge.clone())
    }

    fn prompt_context(&self, _ctx: &ToolContext) -> Option<String> {
        Some(self.knowledge.as_prompt_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_tables_parse_into_lowercased_keys() {
        let knowledge = StaticKnowledge::load_embedded();
        assert!(knowledge
            .tokens
            .contains_key("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"));
        assert!(!knowledge.protocols.is_empty());
        assert!(!knowledge.tags.is_empty());
    }

    #[test]
    fn prompt_fragment_lists_every_tag() {
        let knowledge = StaticKnowledge::load_embedded();
        let fragment = knowledge.as_prompt_fragment();
        assert!(fragment.starts_with("### KNOWN TAG TAXONOMY:"));
        for tag in &knowledge.tags {
            assert!(fragment.contains(&tag.name));
        }
    }
}
