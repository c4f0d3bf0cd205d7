//! The pipeline scheduler: builds a dependency-ordered tool list with Kahn's
//! algorithm and runs it sequentially.

use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::Instrument;

use crate::baggage::{Baggage, SharedBaggage};
use crate::cache::Cache;
use crate::error::{PipelineError, Result};
use crate::llm::LlmClient;
use crate::model::RawTxBundle;
use crate::network::NetworkConfig;
use crate::progress::{ComponentGroup, ComponentStatus, ProgressTracker};
use crate::request::Request;
use crate::rpc::RpcClient;
use crate::tool::{Tool, ToolContext};

/// Collects tools in registration order and validates the dependency graph
/// once, at build time.
#[derive(Default)]
pub struct PipelineBuilder {
    tools: Vec<Arc<dyn Tool>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Validates the single-writer invariant and computes a topological
    /// order via Kahn's algorithm, breaking ties by registration order.
    pub fn build(self) -> Result<Pipeline> {
        let tools = self.tools;

        let mut owner_of: HashMap<&'static str, usize> = HashMap::new();
        for (idx, tool) in tools.iter().enumerate() {
            for key in tool.writes() {
                if let Some(existing) = owner_of.insert(key, idx) {
                    return Err(PipelineError::Invariant(format!(
                        "baggage key '{key}' is written by both '{}' and '{}'",
                        tools[existing].name(),
                        tool.name()
                    )));
                }
            }
        }

        // dependents[owner_idx] = tools that depend on a key owner_idx writes.
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tools.len()];
        let mut in_degree: Vec<usize> = vec![0; tools.len()];
        for (idx, tool) in tools.iter().enumerate() {
            for key in tool.dependencies() {
                let owner = owner_of.get(key).copied().ok_or_else(|| {
                    PipelineError::Invariant(format!(
                        "tool '{}' depends on unknown baggage key '{key}'",
                        tool.name()
                    ))
                })?;
                if owner == idx {
                    return Err(PipelineError::Invariant(format!(
                        "tool '{}' depends on a key it also writes",
                        tool.name()
                    )));
                }
                dependents[owner].push(idx);
                in_degree[idx] += 1;
            }
        }

        // Min-heap over registration index gives stable tie-break: among
        // all currently-ready tools, the one registered earliest runs first.
        let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = BinaryHeap::new();
        for (idx, degree) in in_degree.iter().enumerate() {
            if *degree == 0 {
                ready.push(std::cmp::Reverse(idx));
            }
        }

        let mut order = Vec::with_capacity(tools.len());
        let mut remaining_in_degree = in_degree;
        while let Some(std::cmp::Reverse(idx)) = ready.pop() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                remaining_in_degree[dependent] -= 1;
                if remaining_in_degree[dependent] == 0 {
                    ready.push(std::cmp::Reverse(dependent));
                }
            }
        }

        if order.len() != tools.len() {
            return Err(PipelineError::Invariant(
                "dependency cycle detected among registered tools".to_string(),
            ));
        }

        let ordered_tools = order.into_iter().map(|idx| Arc::clone(&tools[idx])).collect();
        Ok(Pipeline { tools: ordered_tools })
    }
}

/// A built, ready-to-run pipeline: tools in a valid execution order.
pub struct Pipeline {
    tools: Vec<Arc<dyn Tool>>,
}

impl Pipeline {
    /// Runs every tool in topological order against a fresh baggage store.
    /// A non-critical tool's error is logged and swallowed; a critical
    /// tool's error aborts the whole run.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute(
        &self,
        request: Arc<Request>,
        network: Arc<NetworkConfig>,
        bundle: Arc<RawTxBundle>,
        rpc: Arc<RpcClient>,
        cache: Arc<dyn Cache>,
        http: reqwest::Client,
        llm: Arc<dyn LlmClient>,
        tracker: &mut ProgressTracker,
        cancelled: Arc<AtomicBool>,
    ) -> Result<SharedBaggage> {
        let span = tracing::info_span!(
            "pipeline",
            tx_hash = request.tx_hash(),
            network_id = network.network_id
        );
        self.run(request, network, bundle, rpc, cache, http, llm, tracker, cancelled)
            .instrument(span)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        &self,
        request: Arc<Request>,
        network: Arc<NetworkConfig>,
        bundle: Arc<RawTxBundle>,
        rpc: Arc<RpcClient>,
        cache: Arc<dyn Cache>,
        http: reqwest::Client,
        llm: Arc<dyn LlmClient>,
        tracker: &mut ProgressTracker,
        cancelled: Arc<AtomicBool>,
    ) -> Result<SharedBaggage> {
        let baggage: SharedBaggage = Arc::new(Baggage::new());

        for tool in &self.tools {
            if cancelled.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(PipelineError::Cancelled);
            }

            let group = component_group_for(tool.name());
            tracker.start(tool.name(), group, tool.name(), tool.description()).await;

            let ctx = ToolContext::new(
                Arc::clone(&request),
                Arc::clone(&network),
                Arc::clone(&bundle),
                Arc::clone(&baggage),
                Arc::clone(&rpc),
                Arc::clone(&cache),
                http.clone(),
                Arc::clone(&llm),
                tracker.sender(),
                Arc::clone(&cancelled),
            );

            match tool.process(&ctx).await {
                Ok(()) => {
                    if let Some(fragment) = tool.prompt_context(&ctx) {
                        baggage.push_context_fragment(tool.name(), fragment);
                    }
                    tracker
                        .finish(tool.name(), group, tool.name(), "done", ComponentStatus::Finished)
                        .await;
                }
                Err(err) => {
                    tracker
                        .finish(
                            tool.name(),
                            group,
                            tool.name(),
                            &err.to_string(),
                            ComponentStatus::Error,
                        )
                        .await;
                    if tool.critical() {
                        tracing::error!(tool = tool.name(), error = %err, "critical tool failed");
                        tracker.error(err.to_string());
                        return Err(err);
                    }
                    tracing::warn!(tool = tool.name(), error = %err, "tool failed, continuing");
                }
            }
        }

        Ok(baggage)
    }
}

/// Maps a tool's stable name to the progress phase it belongs to.
fn component_group_for(tool_name: &str) -> ComponentGroup {
    match tool_name {
        "static_context_provider" | "transaction_context_provider" => ComponentGroup::Data,
        "abi_resolver" | "trace_decoder" | "log_decoder" | "token_metadata_enricher"
        | "icon_resolver" | "token_transfer_extractor" | "nft_decoder" | "signature_resolver" => {
            ComponentGroup::Decoding
        }
        "amounts_finder" | "erc20_price_lookup" | "monetary_value_enricher" | "protocol_resolver"
        | "ens_resolver" | "tag_resolver" | "address_role_resolver" => ComponentGroup::Enrichment,
        "transaction_explainer" => ComponentGroup::Analysis,
        "annotation_generator" => ComponentGroup::Finishing,
        _ => ComponentGroup::Analysis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Writer {
        name: &'static str,
        writes: &'static [&'static str],
        deps: &'static [&'static str],
        critical: bool,
        fail: bool,
    }

    #[async_trait]
    impl Tool for Writer {
        fn name(&self) -> &'static str {
            self.name
        }

        fn dependencies(&self) -> &'static [&'static str] {
            self.deps
        }

        fn writes(&self) -> &'static [&'static str] {
            self.writes
        }

        fn critical(&self) -> bool {
            self.critical
        }

        async fn process(&self, ctx: &ToolContext) -> Result<()> {
            if self.fail {
                return Err(PipelineError::Other(format!("{} failed on purpose", self.name)));
            }
            for key in self.writes {
                ctx.baggage.set(key, true)?;
            }
            Ok(())
        }
    }

    fn harness() -> (Arc<Request>, Arc<NetworkConfig>, Arc<RawTxBundle>) {
        let request = Arc::new(Request::new(format!("0x{}", "ab".repeat(32)), 1).unwrap());
        let network = Arc::new(NetworkConfig::for_testing(1).unwrap());
        let bundle = Arc::new(RawTxBundle::default());
        (request, network, bundle)
    }

    #[test]
    fn detects_cycles() {
        let a = Arc::new(Writer {
            name: "a",
            writes: &["a_out"],
            deps: &["b_out"],
            critical: false,
            fail: false,
        });
        let b = Arc::new(Writer {
            name: "b",
            writes: &["b_out"],
            deps: &["a_out"],
            critical: false,
            fail: false,
        });
        let built = PipelineBuilder::new().register(a).register(b).build();
        assert!(built.is_err());
    }

    #[test]
    fn detects_missing_dependency() {
        let a = Arc::new(Writer {
            name: "a",
            writes: &["a_out"],
            deps: &["does_not_exist"],
            critical: false,
            fail: false,
        });
        let built = PipelineBuilder::new().register(a).build();
        assert!(built.is_err());
    }

    #[test]
    fn detects_double_writer() {
        let a = Arc::new(Writer {
            name: "a",
            writes: &["shared"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let b = Arc::new(Writer {
            name: "b",
            writes: &["shared"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let built = PipelineBuilder::new().register(a).register(b).build();
        assert!(built.is_err());
    }

    #[test]
    fn registration_order_breaks_ties() {
        let a = Arc::new(Writer {
            name: "a",
            writes: &["a_out"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let b = Arc::new(Writer {
            name: "b",
            writes: &["b_out"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let pipeline = PipelineBuilder::new().register(b).register(a).build().unwrap();
        let names: Vec<_> = pipeline.tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn non_critical_failure_does_not_abort() {
        let (request, network, bundle) = harness();
        let failing = Arc::new(Writer {
            name: "failing",
            writes: &["x"],
            deps: &[],
            critical: false,
            fail: true,
        });
        let downstream = Arc::new(Writer {
            name: "downstream",
            writes: &["y"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let pipeline = PipelineBuilder::new()
            .register(failing)
            .register(downstream)
            .build()
            .unwrap();

        let (mut tracker, mut rx) = ProgressTracker::new(64);
        let cache: Arc<dyn Cache> = Arc::new(crate::cache::NullCache);
        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::MockLlmClient::fixed(serde_json::json!({})));
        let rpc = Arc::new(RpcClient::new(reqwest::Client::new(), &network.rpc_url, Arc::clone(&cache), 1));
        let cancelled = Arc::new(AtomicBool::new(false));

        let result = pipeline
            .execute(
                request,
                network,
                bundle,
                rpc,
                cache,
                reqwest::Client::new(),
                llm,
                &mut tracker,
                cancelled,
            )
            .await
            .unwrap();

        assert!(!result.contains("x"));
        assert!(result.contains("y"));
        drop(tracker);
        rx.close();
    }

    #[tokio::test]
    async fn critical_failure_aborts() {
        let (request, network, bundle) = harness();
        let failing = Arc::new(Writer {
            name: "failing",
            writes: &["x"],
            deps: &[],
            critical: true,
            fail: true,
        });
        let pipeline = PipelineBuilder::new().register(failing).build().unwrap();

        let (mut tracker, mut rx) = ProgressTracker::new(64);
        let cache: Arc<dyn Cache> = Arc::new(crate::cache::NullCache);
        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::MockLlmClient::fixed(serde_json::json!({})));
        let rpc = Arc::new(RpcClient::new(reqwest::Client::new(), &network.rpc_url, Arc::clone(&cache), 1));
        let cancelled = Arc::new(AtomicBool::new(false));

        let result = pipeline
            .execute(
                request,
                network,
                bundle,
                rpc,
                cache,
                reqwest::Client::new(),
                llm,
                &mut tracker,
                cancelled,
            )
            .await;

        assert!(result.is_err());
        drop(tracker);
        rx.close();
    }

    #[tokio::test]
    async fn pre_cancelled_flag_stops_before_first_tool_runs() {
        let (request, network, bundle) = harness();
        let writer = Arc::new(Writer {
            name: "writer",
            writes: &["x"],
            deps: &[],
            critical: false,
            fail: false,
        });
        let pipeline = PipelineBuilder::new().register(writer).build().unwrap();

        let (mut tracker, mut rx) = ProgressTracker::new(64);
        let cache: Arc<dyn Cache> = Arc::new(crate::cache::NullCache);
        let llm: Arc<dyn LlmClient> = Arc::new(crate::llm::MockLlmClient::fixed(serde_json::json!({})));
        let rpc = Arc::new(RpcClient::new(reqwest::Client::new(), &network.rpc_url, Arc::clone(&cache), 1));
        let cancelled = Arc::new(AtomicBool::new(true));

        let result = pipeline
            .execute(
                request,
                network,
                bundle,
                rpc,
                cache,
                reqwest::Client::new(),
                llm,
                &mut tracker,
                cancelled,
            )
            .await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        drop(tracker);
        rx.close();
    }
}
