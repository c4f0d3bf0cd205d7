//! `transaction_context_provider`: sender, nonce, status,
//! gas, and block timestamp lifted straight off the raw bundle.

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::tool::{Tool, ToolContext};

#[derive(Debug, Clone)]
pub struct TxContext {
    pub from: Option<String>,
    pub to: Option<String>,
    pub nonce: Option<u64>,
    pub status_success: Option<bool>,
    pub gas_used: Option<u64>,
    pub gas_price: Option<String>,
    pub block_number: Option<u64>,
    pub timestamp: Option<u64>,
}

#[derive(Default)]
pub struct TransactionContextProvider;

impl TransactionContextProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for TransactionContextProvider {
    fn name(&self) -> &'static str {
        "transaction_context_provider"
    }

    fn description(&self) -> &'static str {
        "extracts sender, nonce, status, gas and block timestamp"
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::TX_CONTEXT]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let bundle = &ctx.bundle;
        let tx_context = TxContext {
            from: bundle.from_address(),
            to: bundle.to_address(),
            nonce: bundle.nonce(),
            status_success: bundle.status_success(),
            gas_used: bundle.gas_used(),
            gas_price: bundle.gas_price(),
            block_number: bundle.block_number(),
            timestamp: bundle.timestamp(),
        };
        ctx.baggage.set(keys::TX_CONTEXT, tx_context)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let tx_context: crate::tools::tx_context::TxContext = ctx.baggage.get(keys::TX_CONTEXT)?;
        let status = match tx_context.status_success {
            Some(true) => "success",
            Some(false) => "reverted",
            None => "unknown",
        };
        Some(format!(
            "### TRANSACTION CONTEXT:\n- From: {}\n- To: {}\n- Status: {}\n- Gas used: {}\n- Block: {}\n",
            tx_context.from.as_deref().unwrap_or("unknown"),
            tx_context.to.as_deref().unwrap_or("contract creation"),
            status,
            tx_context.gas_used.map(|g| g.to_string()).unwrap_or_else(|| "unknown".to_string()),
            tx_context.block_number.map(|b| b.to_string()).unwrap_or_else(|| "unknown".to_string()),
        ))
    }
}
