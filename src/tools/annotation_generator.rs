//! `annotation_generator`: walks the narrative `explainer`
//! produced and, for every knowledge item (token, protocol, address, amount)
//! whose name appears as a substring, emits an [`crate::result::Annotation`]
//! anchored to the matching occurrence so a UI can attach an explorer
//! link/tooltip/icon without re-parsing the prose.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::result::{anchor_for_occurrence, occurrence_count, Annotation, AddressParticipant};
use crate::tool::{Tool, ToolContext};
use crate::tools::explainer::ExplainerOutput;
use crate::tools::protocol_resolver::Protocol;
use crate::transfer::TokenTransfer;

#[derive(Default)]
pub struct AnnotationGenerator;

impl AnnotationGenerator {
    pub fn new() -> Self {
        Self
    }
}

/// A candidate substring to anchor, with the metadata to attach if it is
/// actually found in the narrative.
struct KnowledgeItem {
    needle: String,
    link: Option<String>,
    tooltip: Option<String>,
    icon: Option<String>,
}

fn collect_knowledge_items(
    transfers: &[TokenTransfer],
    protocols: &[Protocol],
    participants: &[AddressParticipant],
    icon_map: &HashMap<String, String>,
    explorer_address_url: impl Fn(&str) -> String,
) -> Vec<KnowledgeItem> {
    let mut seen_needles = HashSet::new();
    let mut items = Vec::new();

    for transfer in transfers {
        let Some(symbol) = &transfer.symbol else { continue };
        if symbol.is_empty() || !seen_needles.insert(symbol.clone()) {
            continue;
        }
        items.push(KnowledgeItem {
            needle: symbol.clone(),
            link: (!transfer.contract.is_empty()).then(|| explorer_address_url(&transfer.contract)),
            tooltip: transfer.name.clone(),
            icon: icon_map.get(&transfer.contract.to_lowercase()).cloned(),
        });
    }

    for protocol in protocols {
        if protocol.name.is_empty() || !seen_needles.insert(protocol.name.clone()) {
            continue;
        }
        items.push(KnowledgeItem {
            needle: protocol.name.clone(),
            link: Some(explorer_address_url(&protocol.address)),
            tooltip: Some(format!("{} ({})", protocol.name, protocol.kind)),
            icon: None,
        });
    }

    for participant in participants {
        if let Some(ens_name) = &participant.ens_name {
            if !ens_name.is_empty() && seen_needles.insert(ens_name.clone()) {
                items.push(KnowledgeItem {
                    needle: ens_name.clone(),
                    link: Some(explorer_address_url(&participant.address)),
                    tooltip: Some(participant.role.clone()),
                    icon: participant.icon.clone(),
                });
            }
        }
        if !participant.address.is_empty() && seen_needles.insert(participant.address.clone()) {
            items.push(KnowledgeItem {
                needle: participant.address.clone(),
                link: Some(explorer_address_url(&participant.address)),
                tooltip: Some(participant.role.clone()),
                icon: participant.icon.clone(),
            });
        }
    }

    for transfer in transfers {
        let Some(formatted) = &transfer.formatted_amount else { continue };
        if formatted.is_empty() || !seen_needles.insert(formatted.clone()) {
            continue;
        }
        items.push(KnowledgeItem {
            needle: formatted.clone(),
            link: None,
            tooltip: transfer.amount_usd.as_ref().map(|usd| format!("${usd}")),
            icon: None,
        });
    }

    items
}

fn anchor_items(summary: &str, items: &[KnowledgeItem]) -> Vec<Annotation> {
    let mut next_occurrence: HashMap<&str, usize> = HashMap::new();
    let mut annotations = Vec::new();

    for item in items {
        let occurrence = *next_occurrence.get(item.needle.as_str()).unwrap_or(&0);
        if occurrence >= occurrence_count(summary, &item.needle) {
            continue;
        }
        let Some(text_anchor) = anchor_for_occurrence(summary, &item.needle, occurrence) else {
            continue;
        };
        next_occurrence.insert(item.needle.as_str(), occurrence + 1);
        annotations.push(Annotation {
            text_anchor,
            link: item.link.clone(),
            tooltip: item.tooltip.clone(),
            icon: item.icon.clone(),
        });
    }

    annotations
}

#[async_trait]
impl Tool for AnnotationGenerator {
    fn name(&self) -> &'static str {
        "annotation_generator"
    }

    fn description(&self) -> &'static str {
        "attaches interactive annotations to the narrative summary"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::EXPLANATION, keys::ENRICHED_TRANSFERS, keys::PROTOCOLS, keys::PARTICIPANTS, keys::ICON_MAP]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::ANNOTATIONS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let explanation: Option<ExplainerOutput> = ctx.baggage.get(keys::EXPLANATION);
        let Some(explanation) = explanation else {
            return ctx.baggage.set(keys::ANNOTATIONS, Vec::<Annotation>::new());
        };

        let transfers: Vec<TokenTransfer> = ctx
            .baggage
            .get(keys::ENRICHED_TRANSFERS)
            .or_else(|| ctx.baggage.get(keys::TRANSFERS))
            .unwrap_or_default();
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS).unwrap_or_default();
        let participants: Vec<AddressParticipant> = ctx.baggage.get(keys::PARTICIPANTS).unwrap_or_default();
        let icon_map: HashMap<String, String> = ctx.baggage.get(keys::ICON_MAP).unwrap_or_default();

        let network = ctx.network.clone();
        let items = collect_knowledge_items(&transfers, &protocols, &participants, &icon_map, |addr| {
            network.explorer_address_url(addr)
        });
        let annotations = anchor_items(&explanation.summary, &items);

        ctx.baggage.set(keys::ANNOTATIONS, annotations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    use crate::transfer::TransferType;
    use serde_json::json;

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

    fn transfer_with_symbol(symbol: &str, contract: &str) -> TokenTransfer {
        TokenTransfer {
            kind: TransferType::Fungible,
            contract: contract.to_string(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            amount: "1".to_string(),
            token_id: None,
            symbol: Some(symbol.to_string()),
            name: Some(format!("{symbol} token")),
            decimals: Some(18),
            formatted_amount: Some("1".to_string()),
            amount_usd: None,
            source_index: "log:0".to_string(),
        }
    }

    #[tokio::test]
    async fn no_explanation_yields_empty_annotations() {
        let ctx = test_ctx();
        let tool = AnnotationGenerator::new();
        tool.process(&ctx).await.unwrap();
        let annotations: Vec<Annotation> = ctx.baggage.get(keys::ANNOTATIONS).unwrap();
        assert!(annotations.is_empty());
    }

    #[tokio::test]
    async fn symbol_mentioned_twice_gets_two_distinct_anchors() {
        let ctx = test_ctx();
        ctx.baggage.set(
            keys::EXPLANATION,
            ExplainerOutput { summary: "swap USDC for USDC".to_string(), ..Default::default() },
        ).unwrap();
        ctx.baggage.set(keys::ENRICHED_TRANSFERS, vec![transfer_with_symbol("USDC", "0xusdc")]).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();
        ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new()).unwrap();

        let tool = AnnotationGenerator::new();
        tool.process(&ctx).await.unwrap();
        let annotations: Vec<Annotation> = ctx.baggage.get(keys::ANNOTATIONS).unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].text_anchor, "1@USDC");
    }

    #[tokio::test]
    async fn known_participant_ens_name_gets_anchored() {
        let ctx = test_ctx();
        ctx.baggage.set(
            keys::EXPLANATION,
            ExplainerOutput { summary: "vitalik.eth sent a transfer".to_string(), ..Default::default() },
        ).unwrap();
        ctx.baggage.set(keys::ENRICHED_TRANSFERS, Vec::<TokenTransfer>::new()).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();
        ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new()).unwrap();
        ctx.baggage.set(
            keys::PARTICIPANTS,
            vec![AddressParticipant {
                address: "0xfrom".to_string(),
                role: "sender".to_string(),
                category: crate::result::ParticipantCategory::User,
                kind: crate::result::ParticipantKind::Eoa,
                ens_name: Some("vitalik.eth".to_string()),
                name: None,
                icon: None,
                link: None,
                description: None,
                metadata: None,
            }],
        ).unwrap();

        let tool = AnnotationGenerator::new();
        tool.process(&ctx).await.unwrap();
        let annotations: Vec<Annotation> = ctx.baggage.get(keys::ANNOTATIONS).unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].text_anchor, "1@vitalik.eth");
    }

    #[tokio::test]
    async fn formatted_amount_gets_anchored() {
        let ctx = test_ctx();
        ctx.baggage.set(
            keys::EXPLANATION,
            ExplainerOutput { summary: "sent 1.5 to a friend".to_string(), ..Default::default() },
        ).unwrap();
        let mut transfer = transfer_with_symbol("ETH", "");
        transfer.symbol = None;
        transfer.formatted_amount = Some("1.5".to_string());
        transfer.amount_usd = Some("3000.00".to_string());
        ctx.baggage.set(keys::ENRICHED_TRANSFERS, vec![transfer]).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();
        ctx.baggage.set(keys::PARTICIPANTS, Vec::<AddressParticipant>::new()).unwrap();
        ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new()).unwrap();

        let tool = AnnotationGenerator::new();
        tool.process(&ctx).await.unwrap();
        let annotations: Vec<Annotation> = ctx.baggage.get(keys::ANNOTATIONS).unwrap();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].tooltip.as_deref(), Some("$3000.00"));
    }

    #[tokio::test]
    async fn symbol_not_mentioned_in_summary_is_skipped() {
        let ctx = test_ctx();
        ctx.baggage.set(
            keys::EXPLANATION,
            ExplainerOutput { summary: "approved a spender".to_string(), ..Default::default() },
        ).unwrap();
        ctx.baggage.set(keys::ENRICHED_TRANSFERS, vec![transfer_with_symbol("USDC", "0xusdc")]).unwrap();
        ctx.baggage.set(keys::PROTOCOLS, Vec::<Protocol>::new()).unwrap();
        ctx.baggage.set(keys::ICON_MAP, HashMap::<String, String>::new()).unwrap();

        let tool = AnnotationGenerator::new();
        tool.process(&ctx).await.unwrap();
        let annotations: Vec<Annotation> = ctx.baggage.get(keys::ANNOTATIONS).unwrap();
        assert!(annotations.is_empty());
    }
}
