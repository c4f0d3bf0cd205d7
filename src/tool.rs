//! The tool contract: the unit of work the scheduler composes into a pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::baggage::SharedBaggage;
use crate::cache::Cache;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::model::RawTxBundle;
use crate::network::NetworkConfig;
use crate::payload::BoxFut;
use crate::progress::ProgressSender;
use crate::request::Request;
use crate::rpc::RpcClient;

/// Everything a tool needs to do its work, bundled so `process`/`prompt_context`
/// stay single-argument and easy to test with a hand-built context.
#[derive(Clone)]
pub struct ToolContext {
    pub request: Arc<Request>,
    pub network: Arc<NetworkConfig>,
    pub bundle: Arc<RawTxBundle>,
    pub baggage: SharedBaggage,
    pub rpc: Arc<RpcClient>,
    pub cache: Arc<dyn Cache>,
    pub http: reqwest::Client,
    pub llm: Arc<dyn LlmClient>,
    pub progress: ProgressSender,
    cancelled: Arc<AtomicBool>,
}

impl ToolContext {
    pub fn new(
        request: Arc<Request>,
        network: Arc<NetworkConfig>,
        bundle: Arc<RawTxBundle>,
        baggage: SharedBaggage,
        rpc: Arc<RpcClient>,
        cache: Arc<dyn Cache>,
        http: reqwest::Client,
        llm: Arc<dyn LlmClient>,
        progress: ProgressSender,
        cancelled: Arc<AtomicBool>,
    ) -> Self {
        Self {
            request,
            network,
            bundle,
            baggage,
            rpc,
            cache,
            http,
            llm,
            progress,
            cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// One stage of the analysis pipeline.
///
/// Implementations declare which baggage keys they depend on and which they
/// own (`dependencies`/`writes`), then do their work in `process`. A tool may
/// additionally contribute a short text fragment via `prompt_context` for the
/// LLM-driven stages downstream -- that fragment may only be built from the
/// tool's own `process` output and request metadata, never from other tools'
/// baggage, so the isolation invariant
/// holds regardless of what else has run.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Stable identifier, used for scheduling, logging and error messages.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// Baggage keys this tool reads. The scheduler topologically orders
    /// tools so every dependency's owner runs first.
    fn dependencies(&self) -> &'static [&'static str] {
        &[]
    }

    /// Baggage keys this tool owns. Checked for overlap against every other
    /// registered tool at build time.
    fn writes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether a failure in this tool aborts the whole pipeline. Defaults to
    /// `false`: most tools degrade gracefully and simply leave their baggage
    /// keys unset.
    fn critical(&self) -> bool {
        false
    }

    /// Do the tool's work against shared context.
    async fn process(&self, ctx: &ToolContext) -> Result<()>;

    /// A short text fragment for LLM prompts. Default: no contribution.
    fn prompt_context(&self, _ctx: &ToolContext) -> Option<String> {
        None
    }
}

/// Helper used by tools whose `process` body is naturally expressed as a
/// boxed future (kept for symmetry with the rest of the crate's payload
/// layer, which already leans on [`BoxFut`] for object safety).
pub type ToolFut<'a> = BoxFut<'a, Result<()>>;
