//! `monetary_value_enricher`: fills `formatted_amount` and
//! `amount_usd` on every transfer using the decimals `token_metadata_enricher`
//! resolved and the prices `erc20_price_lookup` found, and separately
//! converts the transaction's own gas cost into USD off the native price.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};
use crate::tools::price_lookup::TokenPrice;
use crate::tools::static_context::StaticKnowledge;
use crate::tools::token_metadata::TokenMetadata;
use crate::tools::tx_context::TxContext;
use crate::transfer::{amount_usd, format_amount, TokenTransfer, TransferType};

const NATIVE_DECIMALS: u32 = 18;

#[derive(Default)]
pub struct MonetaryValueEnricher;

impl MonetaryValueEnricher {
    pub fn new() -> Self {
        Self
    }
}

fn decimals_for(
    transfer: &TokenTransfer,
    metadata: &HashMap<String, TokenMetadata>,
    static_knowledge: &StaticKnowledge,
) -> Option<u32> {
    if matches!(transfer.kind, TransferType::Native) {
        return Some(NATIVE_DECIMALS);
    }
    if matches!(transfer.kind, TransferType::NftUnique | TransferType::NftMulti) {
        return None;
    }
    if let Some(known) = static_knowledge.tokens.get(&transfer.contract.to_lowercase()) {
        return Some(known.decimals);
    }
    metadata.get(&transfer.contract).and_then(|m| m.decimals)
}

fn price_for(transfer: &TokenTransfer, prices: &HashMap<String, TokenPrice>) -> Option<f64> {
    if matches!(transfer.kind, TransferType::Native) {
        return prices.get("native").map(|p| p.price_usd);
    }
    prices.get(&transfer.contract).map(|p| p.price_usd)
}

fn symbol_name_for(
    transfer: &TokenTransfer,
    metadata: &HashMap<String, TokenMetadata>,
    static_knowledge: &StaticKnowledge,
) -> (Option<String>, Option<String>) {
    if let Some(known) = static_knowledge.tokens.get(&transfer.contract.to_lowercase()) {
        return (Some(known.symbol.clone()), Some(known.name.clone()));
    }
    match metadata.get(&transfer.contract) {
        Some(m) => (m.symbol.clone(), m.name.clone()),
        None => (None, None),
    }
}

fn enrich_transfer(
    transfer: &TokenTransfer,
    metadata: &HashMap<String, TokenMetadata>,
    static_knowledge: &StaticKnowledge,
    prices: &HashMap<String, TokenPrice>,
) -> TokenTransfer {
    let mut enriched = transfer.clone();
    let (symbol, name) = symbol_name_for(transfer, metadata, static_knowledge);
    enriched.symbol = symbol;
    enriched.name = name;
    if let Some(decimals) = decimals_for(transfer, metadata, static_knowledge) {
        enriched.decimals = Some(decimals);
        if let Some(formatted) = format_amount(&transfer.amount, decimals) {
            if let Some(price) = price_for(transfer, prices) {
                enriched.amount_usd = amount_usd(&formatted, price);
            }
            enriched.formatted_amount = Some(formatted);
        }
    }
    enriched
}

fn gas_fee_usd(tx_context: &TxContext, prices: &HashMap<String, TokenPrice>) -> Option<String> {
    let gas_used = tx_context.gas_used?;
    let gas_price = tx_context.gas_price.as_ref()?;
    let wei = num_bigint::BigUint::parse_bytes(gas_price.as_bytes(), 10)? * gas_used;
    let formatted = format_amount(&wei.to_string(), NATIVE_DECIMALS)?;
    let price = prices.get("native")?.price_usd;
    amount_usd(&formatted, price)
}

#[async_trait]
impl Tool for MonetaryValueEnricher {
    fn name(&self) -> &'static str {
        "monetary_value_enricher"
    }

    fn description(&self) -> &'static str {
        "fills in formatted and USD amounts for transfers and the gas fee"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[
            keys::TRANSFERS,
            keys::TOKEN_METADATA,
            keys::STATIC_KNOWLEDGE,
            keys::TOKEN_PRICES,
            keys::TX_CONTEXT,
        ]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::GAS_FEE_USD, keys::ENRICHED_TRANSFERS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap_or_default();
        let metadata: HashMap<String, TokenMetadata> = ctx.baggage.get(keys::TOKEN_METADATA).unwrap_or_default();
        let static_knowledge: StaticKnowledge = ctx
            .baggage
            .get(keys::STATIC_KNOWLEDGE)
            .unwrap_or_else(StaticKnowledge::load_embedded);
        let prices: HashMap<String, TokenPrice> = ctx.baggage.get(keys::TOKEN_PRICES).unwrap_or_default();

        let enriched: Vec<TokenTransfer> = transfers
            .iter()
            .map(|t| enrich_transfer(t, &metadata, &static_knowledge, &prices))
            .collect();

        let fee_usd = ctx
            .baggage
            .get::<TxContext>(keys::TX_CONTEXT)
            .and_then(|tx_context| gas_fee_usd(&tx_context, &prices));

        ctx.baggage.set(keys::ENRICHED_TRANSFERS, enriched)?;
        ctx.baggage.set(keys::GAS_FEE_USD, fee_usd)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let enriched: Vec<TokenTransfer> = ctx.baggage.get(keys::ENRICHED_TRANSFERS)?;
        let priced = enriched.iter().filter(|t| t.amount_usd.is_some()).count();
        if priced == 0 {
            return None;
        }
        Some(format!(
            "### MONETARY VALUE: {priced}/{} transfer(s) have a USD value\n",
            enriched.len()
        ))
    }
}
