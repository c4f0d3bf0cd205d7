//! LLM interface: `complete(prompt, schema) -> typed_response`, given a concrete shape by reusing the crate's own
//! `backend::Backend` abstraction plus its `LlmCall`/`RetryConfig`
//! structured-output retry loop.
//!
//! Four LLM-assisted tools (`amounts_finder`, `protocol_resolver`,
//! `tag_resolver`, `address_role_resolver`) and the terminal
//! `transaction_explainer` all go through [`LlmClient::complete_json`].

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{Backend, BackoffConfig, MockBackend, OllamaBackend};
use crate::diagnostics::ParseDiagnostics;
use crate::error::{PipelineError, Result};
use crate::exec_ctx::ExecCtx;
use crate::llm_call::LlmCall;
use crate::payload::Payload;
use crate::retry::RetryConfig;

/// Abstraction over "ask a model for structured JSON". The specification
/// does not mandate a vendor; implementations only need to
/// return a JSON value plus diagnostics describing how it was obtained.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `prompt` (optionally preceded by `system`) and require the
    /// response to parse as JSON, retrying on parse/validation failure.
    /// `cancel` is threaded through so an LLM-backed stage honors the
    /// pipeline's cancellation signal.
    async fn complete_json(
        &self,
        name: &str,
        system: Option<&str>,
        prompt: &str,
        cancel: Option<&AtomicBool>,
    ) -> Result<(Value, ParseDiagnostics)>;
}

/// Production client: Ollama (or OpenAI behind the `openai` feature) via
/// the crate's `Backend` trait, with 2-attempt structured-output retry
/// and cooled-down temperature on each attempt.
pub struct BackendLlmClient {
    backend: Arc<dyn Backend>,
    base_url: String,
    model: String,
    backoff: BackoffConfig,
    cancellation: Option<Arc<AtomicBool>>,
}

impl BackendLlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(OllamaBackend),
            base_url: base_url.into(),
            model: model.into(),
            backoff: BackoffConfig::standard(),
            cancellation: None,
        }
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Wire in the pipeline's cancellation flag so every call this client
    /// makes honors it.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancellation = Some(flag);
        self
    }
}

#[async_trait]
impl LlmClient for BackendLlmClient {
    async fn complete_json(
        &self,
        name: &str,
        system: Option<&str>,
        prompt: &str,
        _cancel: Option<&AtomicBool>,
    ) -> Result<(Value, ParseDiagnostics)> {
        let ctx = ExecCtx::builder(&self.base_url)
            .backend(Arc::clone(&self.backend))
            .backoff(self.backoff.clone())
            .cancellation(self.cancellation.clone())
            .build();

        let mut call = LlmCall::new(name, "{input}")
            .with_model(self.model.clone())
            .expecting_json()
            .with_retry(RetryConfig::new(2));
        if let Some(sys) = system {
            call = call.with_system(sys.to_string());
        }

        let output = call
            .invoke(&ctx, Value::String(prompt.to_string()))
            .await?;
        let diag = output.diagnostics.clone().unwrap_or_default();
        if !diag.ok() {
            return Err(PipelineError::LlmFailure(format!(
                "{name}: {}",
                diag.parse_error.clone().unwrap_or_default()
            )));
        }
        Ok((output.value, diag))
    }
}

/// Test double: returns canned JSON responses in order. Built on the
/// crate's `MockBackend` so pipeline tests never need a live model.
pub struct MockLlmClient {
    responses: Vec<Value>,
    index: std::sync::atomic::AtomicUsize,
}

impl MockLlmClient {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses,
            index: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn fixed(response: Value) -> Self {
        Self::new(vec![response])
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete_json(
        &self,
        _name: &str,
        _system: Option<&str>,
        _prompt: &str,
        _cancel: Option<&AtomicBool>,
    ) -> Result<(Value, ParseDiagnostics)> {
        if self.responses.is_empty() {
            return Err(PipelineError::LlmFailure("MockLlmClient has no canned responses".into()));
        }
        let idx = self
            .index
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            % self.responses.len();
        Ok((self.responses[idx].clone(), ParseDiagnostics::default()))
    }
}

/// Build a `MockLlmClient`-backed `Arc<dyn LlmClient>` from raw text via
/// the crate's `MockBackend`, for tests that want to exercise the real
/// `Backend` plumbing rather than skip straight to a canned `Value`.
pub fn mock_client_from_text(responses: Vec<String>) -> Arc<dyn Backend> {
    Arc::new(MockBackend::new(responses))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_client_cycles_responses() {
        let client = MockLlmClient::new(vec![json!({"a": 1}), json!({"a": 2})]);
        let (v1, _) = client.complete_json("t", None, "p", None).await.unwrap();
        let (v2, _) = client.complete_json("t", None, "p", None).await.unwrap();
        let (v3, _) = client.complete_json("t", None, "p", None).await.unwrap();
        assert_eq!(v1["a"], 1);
        assert_eq!(v2["a"], 2);
        assert_eq!(v3["a"], 1);
    }
}
