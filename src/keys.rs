//! Well-known baggage keys and their owning tool.
//!
//! Each constant documents the single writer under the baggage's
//! single-writer-per-key invariant. `scheduler::PipelineBuilder` checks at
//! build time that no two registered tools declare the same key in
//! `Tool::writes()`.

/// Written by `static_context_provider`: curated CSV-derived knowledge
/// (`crate::tools::static_context::StaticKnowledge`).
pub const STATIC_KNOWLEDGE: &str = "static_knowledge";

/// Written by `transaction_context_provider`: `crate::tools::tx_context::TxContext`.
pub const TX_CONTEXT: &str = "tx_context";

/// Written by `abi_resolver`: `HashMap<String, serde_json::Value>` (address -> ABI).
pub const ABI_MAP: &str = "abi_map";

/// Written by `trace_decoder`: `Vec<crate::model::Call>`.
pub const CALLS: &str = "calls";

/// Written by `log_decoder`: `Vec<crate::model::Event>`.
pub const EVENTS: &str = "events";

/// Written by `token_metadata_enricher`: `HashMap<String, crate::tools::token_metadata::TokenMetadata>`.
pub const TOKEN_METADATA: &str = "token_metadata";

/// Written by `icon_resolver`: `HashMap<String, String>` (address -> icon url).
pub const ICON_MAP: &str = "icon_map";

/// Written by `token_transfer_extractor`: `Vec<crate::transfer::TokenTransfer>`.
pub const TRANSFERS: &str = "transfers";

/// Written by `nft_decoder`: `HashMap<String, String>` (contract:token_id -> tokenURI).
pub const NFT_URIS: &str = "nft_uris";

/// Written by `signature_resolver`: `HashMap<String, String>` (selector/topic -> signature).
pub const RESOLVED_SIGNATURES: &str = "resolved_signatures";

/// Written by `amounts_finder`: `Vec<crate::tools::amounts_finder::DetectedAmount>`.
pub const DETECTED_AMOUNTS: &str = "detected_amounts";

/// Written by `erc20_price_lookup`: `HashMap<String, crate::tools::price_lookup::TokenPrice>`.
pub const TOKEN_PRICES: &str = "token_prices";

/// Written by `monetary_value_enricher`: total gas fee in USD, as a decimal string.
pub const GAS_FEE_USD: &str = "gas_fee_usd";

/// Written by `monetary_value_enricher`: `Vec<crate::transfer::TokenTransfer>`, the
/// same transfers `token_transfer_extractor` produced with `formatted_amount`
/// and `amount_usd` filled in. A separate key from `TRANSFERS` because baggage
/// enforces one writer per key; callers wanting the priced view read this one
/// and fall back to `TRANSFERS` if this tool didn't run.
pub const ENRICHED_TRANSFERS: &str = "enriched_transfers";

/// Written by `protocol_resolver`: `Vec<crate::tools::protocol_resolver::Protocol>`.
pub const PROTOCOLS: &str = "protocols";

/// Written by `ens_resolver`: `HashMap<String, String>` (address -> ENS name).
pub const ENS_MAP: &str = "ens_map";

/// Written by `tag_resolver`: `Vec<String>`, confidence-filtered tag taxonomy matches.
pub const TAGS: &str = "tags";

/// Written by `address_role_resolver`: `Vec<crate::result::AddressParticipant>`.
pub const PARTICIPANTS: &str = "participants";

/// Written by `transaction_explainer`: `crate::tools::explainer::ExplainerOutput`.
pub const EXPLANATION: &str = "explanation";

/// Written by `annotation_generator`: `Vec<crate::result::Annotation>`.
pub const ANNOTATIONS: &str = "annotations";
