//! The tool library: concrete analysis stages.
//!
//! Each submodule is one registered [`crate::tool::Tool`]. `engine.rs`
//! wires all of them into a single [`crate::scheduler::PipelineBuilder`].
//! Registration order only matters as a Kahn tie-break -- the real
//! ordering comes from `dependencies()`.

pub mod static_context;
pub mod tx_context;

pub mod abi_resolver;
pub mod trace_decoder;
pub mod log_decoder;
pub mod token_metadata;
pub mod icon_resolver;
pub mod transfer_extractor;
pub mod nft_decoder;
pub mod signature_resolver;
pub mod amounts_finder;
pub mod price_lookup;
pub mod monetary_enricher;
pub mod protocol_resolver;
pub mod ens_resolver;
pub mod tag_resolver;
pub mod role_resolver;
pub mod explainer;
pub mod annotation_generator;
