//! # txplain-engine
//!
//! Turns a raw on-chain transaction into a structured, human-readable
//! explanation. A [`scheduler::Pipeline`] of independent [`tool::Tool`]
//! stages -- ABI decoding, transfer extraction, protocol/ENS/tag
//! resolution, USD pricing, and finally an LLM narrative -- runs in
//! dependency order over a shared [`baggage::Baggage`] store, and the
//! terminal stages assemble a [`result::ExplanationResult`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use txplain_engine::{Engine, NetworkConfig, Request};
//! use txplain_engine::llm::BackendLlmClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm = Arc::new(BackendLlmClient::new("http://localhost:11434", "llama3"));
//!     let engine = Engine::new(llm)?;
//!
//!     let request = Request::new("0x".to_string() + &"ab".repeat(32), 1)?;
//!     let network = NetworkConfig::for_testing(1).expect("network 1 is known");
//!
//!     let explanation = engine.explain(request, network).await?;
//!     println!("{}", explanation.summary);
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! - **[`engine`]** -- public entry point; wires the tool library into a
//!   pipeline and assembles the final result.
//! - **[`scheduler`]** -- dependency-ordered (Kahn's algorithm) executor.
//! - **[`tool`]** / **[`tools`]** -- the `Tool` contract and its 19
//!   concrete stages.
//! - **[`baggage`]** -- the type-erased, single-writer-per-key store
//!   tools read from and write to.
//! - **[`rpc`]** -- the JSON-RPC adapter (`eth_getTransaction*`,
//!   `debug_traceTransaction`, 4byte-style signature lookup).
//! - **[`llm`]** -- the structured-output LLM interface, backed by the
//!   payload layer below.
//!
//! The payload layer (`backend`, `chain`, `exec_ctx`, `llm_call`,
//! `output_parser`, `output_strategy`, `retry`, `streaming`, `parsing`,
//! `diagnostics`, `events`) supplies the retrying, JSON-repairing,
//! backend-agnostic LLM plumbing that [`llm::BackendLlmClient`] sits on
//! top of; it is reused as-is rather than reimplemented.

// --- Payload layer: structured-output LLM plumbing, reused by `llm` ---
pub mod backend;
pub mod chain;
pub mod diagnostics;
pub mod events;
pub mod exec_ctx;
pub mod llm_call;
pub mod output_parser;
pub mod output_strategy;
pub mod parsing;
pub mod payload;
pub mod retry;
pub mod streaming;

// --- Ambient stack ---
pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

// --- Transaction-explanation engine ---
pub mod abi;
pub mod baggage;
pub mod cache;
pub mod engine;
pub mod keys;
pub mod llm;
pub mod model;
pub mod network;
pub mod progress;
pub mod request;
pub mod result;
pub mod rpc;
pub mod scheduler;
pub mod tool;
pub mod tools;
pub mod transfer;

// --- Payload layer exports ---
pub use backend::{BackoffConfig, MockBackend, OllamaBackend};
#[cfg(feature = "openai")]
pub use backend::OpenAiBackend;
pub use chain::Chain;
pub use diagnostics::ParseDiagnostics;
pub use exec_ctx::{ExecCtx, ExecCtxBuilder};
pub use llm_call::LlmCall;
pub use output_strategy::OutputStrategy;
pub use payload::{BoxFut, Payload, PayloadOutput};
pub use retry::RetryConfig;
pub use streaming::StreamingDecoder;

// --- Ambient stack exports ---
pub use client::LlmConfig;
pub use error::{PipelineError, Result};
pub use types::PipelineContext;

// --- Engine exports ---
pub use baggage::{Baggage, SharedBaggage};
pub use engine::Engine;
pub use llm::{BackendLlmClient, LlmClient, MockLlmClient};
pub use network::{NetworkConfig, NetworkRegistry};
pub use progress::{ComponentGroup, ComponentStatus, ProgressEvent, ProgressTracker};
pub use request::Request;
pub use result::ExplanationResult;
pub use rpc::RpcClient;
pub use scheduler::{Pipeline, PipelineBuilder};
pub use tool::{Tool, ToolContext};
