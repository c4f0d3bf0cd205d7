//! `signature_resolver`: fills in unknown method/event names
//! for calls and events that neither an ABI nor the canonical-signature fast
//! path in `trace_decoder`/`log_decoder` could name. Runs after both
//! decoders so it only has to pay for what they left as `"unknown"`.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::keys;
use crate::model::{Call, Event};
use crate::rpc::SignatureResolver as Resolver;
use crate::tool::{Tool, ToolContext};

const RESOLVE_CONCURRENCY: usize = 8;

#[derive(Default)]
pub struct SignatureResolverTool;

impl SignatureResolverTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for SignatureResolverTool {
    fn name(&self) -> &'static str {
        "signature_resolver"
    }

    fn description(&self) -> &'static str {
        "fills in unknown method/event names lacking ABI coverage"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::CALLS, keys::EVENTS]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::RESOLVED_SIGNATURES]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let calls: Vec<Call> = ctx.baggage.get(keys::CALLS).unwrap_or_default();
        let events: Vec<Event> = ctx.baggage.get(keys::EVENTS).unwrap_or_default();

        let unresolved_selectors: Vec<String> = calls
            .iter()
            .filter(|c| c.method == "unknown")
            .filter_map(|c| c.selector.clone())
            .collect();
        let unresolved_topics: Vec<String> = events
            .iter()
            .filter(|e| e.name == "unknown")
            .filter_map(|e| e.topics.first().cloned())
            .collect();

        let resolver = Resolver::new(ctx.http.clone(), ctx.cache.clone());

        let method_results: Vec<(String, String)> = stream::iter(unresolved_selectors.into_iter())
            .map(|selector| {
                let resolver = &resolver;
                async move {
                    let sig = resolver.resolve_method(&selector).await;
                    (selector, sig)
                }
            })
            .buffer_unordered(RESOLVE_CONCURRENCY)
            .collect()
            .await;

        let event_results: Vec<(String, String)> = stream::iter(unresolved_topics.into_iter())
            .map(|topic| {
                let resolver = &resolver;
                async move {
                    let sig = resolver.resolve_event(&topic).await;
                    (topic, sig)
                }
            })
            .buffer_unordered(RESOLVE_CONCURRENCY)
            .collect()
            .await;

        let mut resolved: std::collections::HashMap<String, String> = std::collections::HashMap::new();
        for (selector, sig) in method_results {
            if sig != "unknown" {
                resolved.insert(selector, sig);
            }
        }
        for (topic, sig) in event_results {
            if sig != "unknown" {
                resolved.insert(topic, sig);
            }
        }

        ctx.baggage.set(keys::RESOLVED_SIGNATURES, resolved)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let resolved: std::collections::HashMap<String, String> =
            ctx.baggage.get(keys::RESOLVED_SIGNATURES)?;
        if resolved.is_empty() {
            return None;
        }
        Some(format!(
            "### RESOLVED SIGNATURES: {} previously-unknown selectors/topics named\n",
            resolved.len()
        ))
    }
}
