//! `amounts_finder`: LLM-assisted. Enumerates every numeric
//! quantity that could represent a monetary amount, seeded from the
//! deterministic transfer/native-value evidence already decoded and
//! enriched with whatever the model additionally spots in call arguments.
//! This is what triggers native-token pricing downstream: a "native"
//! entry here is `erc20_price_lookup`'s signal to also price ETH.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::keys;
use crate::model::Call;
use crate::tool::{Tool, ToolContext};
use crate::transfer::{TokenTransfer, TransferType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedAmount {
    pub value_raw: String,
    /// `None` means the native asset.
    pub token_contract: Option<String>,
    pub source: String,
}

#[derive(Default)]
pub struct AmountsFinder;

impl AmountsFinder {
    pub fn new() -> Self {
        Self
    }
}

/// Deterministic baseline: every transfer is unambiguously a monetary
/// amount already. This runs with or without a usable LLM response.
fn baseline_amounts(transfers: &[TokenTransfer]) -> Vec<DetectedAmount> {
    transfers
        .iter()
        .filter(|t| matches!(t.kind, TransferType::Native | TransferType::Fungible))
        .map(|t| DetectedAmount {
            value_raw: t.amount.clone(),
            token_contract: (!t.contract.is_empty()).then(|| t.contract.clone()),
            source: "transfer".to_string(),
        })
        .collect()
}

fn build_prompt(calls: &[Call], transfers: &[TokenTransfer]) -> String {
    let mut out = String::from(
        "Identify any additional numeric call arguments below that represent a monetary \
         amount (e.g. a swap's minAmountOut, a deposit cap) and are NOT already one of the \
         known transfers. Respond with a JSON array of objects shaped \
         {\"value_raw\": string, \"token_contract\": string|null, \"source\": string}. \
         Respond with [] if there is nothing to add.\n\n",
    );
    out.push_str(&format!("Known transfers: {}\n", transfers.len()));
    out.push_str("Call arguments:\n");
    for call in calls.iter().take(30) {
        for (name, value) in call.arguments.iter() {
            out.push_str(&format!("- {}.{} = {}\n", call.method, name, value));
        }
    }
    out
}

fn parse_llm_amounts(value: &serde_json::Value) -> Vec<DetectedAmount> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let value_raw = item.get("value_raw")?.as_str()?.to_string();
                    let token_contract = item
                        .get("token_contract")
                        .and_then(|v| v.as_str())
                        .map(str::to_string);
                    let source = item
                        .get("source")
                        .and_then(|v| v.as_str())
                        .unwrap_or("llm")
                        .to_string();
                    Some(DetectedAmount {
                        value_raw,
                        token_contract,
                        source,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for AmountsFinder {
    fn name(&self) -> &'static str {
        "amounts_finder"
    }

    fn description(&self) -> &'static str {
        "enumerates numeric quantities that could represent a monetary amount"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::CALLS, keys::TRANSFERS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::DETECTED_AMOUNTS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap_or_default();

        let mut amounts = baseline_amounts(&transfers);

        if !calls.is_empty() {
            let prompt = build_prompt(&calls, &transfers);
            if let Ok((value, _diag)) = ctx
                .llm
                .complete_json("amounts_finder", None, &prompt, None)
                .await
            {
                amounts.extend(parse_llm_amounts(&value));
            }
        }

        ctx.baggage.set(keys::DETECTED_AMOUNTS, amounts)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let amounts: Vec<DetectedAmount> = ctx.baggage.get(keys::DETECTED_AMOUNTS)?;
        if amounts.is_empty() {
            return None;
        }
        let mut out = format!("### DETECTED AMOUNTS ({}):\n", amounts.len());
        for a in amounts.iter().take(20) {
            out.push_str(&format!(
                "- {} {} ({})\n",
                a.value_raw,
                a.token_contract.as_deref().unwrap_or("native"),
                a.source
            ));
        }
        Some(out)
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

    fn native_transfer(amount: &str) -> TokenTransfer {
        TokenTransfer {
            kind: TransferType::Native,
            contract: String::new(),
            from: "0xfrom".to_string(),
            to: "0xto".to_string(),
            amount: amount.to_string(),
            token_id: None,
            symbol: None,
            name: None,
            decimals: None,
            formatted_amount: None,
            amount_usd: None,
            source_index: "trace:0".to_string(),
        }
    }

    #[tokio::test]
    async fn native_transfer_flags_native_pricing() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::TRANSFERS, vec![native_transfer("1000000000000000000")]).unwrap();
        let tool = AmountsFinder::new();
        tool.process(&ctx).await.unwrap();
        let amounts: Vec<DetectedAmount> = ctx.baggage.get(keys::DETECTED_AMOUNTS).unwrap();
        assert_eq!(amounts.len(), 1);
        assert!(amounts[0].token_contract.is_none());
    }

    #[tokio::test]
    async fn no_transfers_or_calls_yields_empty() {
        let ctx = test_ctx();
        ctx.baggage.set(keys::CALLS, Vec::<Call>::new()).unwrap();
        ctx.baggage.set(keys::TRANSFERS, Vec::<TokenTransfer>::new()).unwrap();
        let tool = AmountsFinder::new();
        tool.process(&ctx).await.unwrap();
        let amounts: Vec<DetectedAmount> = ctx.baggage.get(keys::DETECTED_AMOUNTS).unwrap();
        assert!(amounts.is_empty());
    }
}
