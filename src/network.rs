//! Resolved network configuration: the engine's only view of "which chain".
//!
//! An environment-variable loader (`RPC_ENDPOINT_CHAIN_<id>`,
//! `NETWORK_NAME_CHAIN_<id>`, `EXPLORER_URL_CHAIN_<id>`, ...) is an external
//! collaborator. This crate never reads environment variables itself -- it
//! consumes the already-resolved [`NetworkConfig`] record that loader would
//! produce.

use std::collections::HashMap;

/// Everything a pipeline execution needs to know about the chain it is
/// explaining a transaction on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub explorer_url_template: String,
    pub explorer_api_url: Option<String>,
    pub pricing_slug: Option<String>,
    pub icon_slug: Option<String>,
}

impl NetworkConfig {
    /// Baked-in defaults for three major chains, for tests and examples.
    /// The real environment-variable loader is out of scope.
    pub fn for_testing(network_id: u64) -> Option<Self> {
        let cfg = match network_id {
            1 => NetworkConfig {
                network_id: 1,
                name: "Ethereum Mainnet".to_string(),
                rpc_url: "https://eth.llamarpc.com".to_string(),
                explorer_url_template: "https://etherscan.io/tx/{tx_hash}".to_string(),
                explorer_api_url: Some("https://api.etherscan.io/api".to_string()),
                pricing_slug: Some("ethereum".to_string()),
                icon_slug: Some("ethereum".to_string()),
            },
            10 => NetworkConfig {
                network_id: 10,
                name: "Optimism".to_string(),
                rpc_url: "https://mainnet.optimism.io".to_string(),
                explorer_url_template: "https://optimistic.etherscan.io/tx/{tx_hash}".to_string(),
                explorer_api_url: Some("https://api-optimistic.etherscan.io/api".to_string()),
                pricing_slug: Some("optimistic-ethereum".to_string()),
                icon_slug: Some("optimism".to_string()),
            },
            42161 => NetworkConfig {
                network_id: 42161,
                name: "Arbitrum One".to_string(),
                rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
                explorer_url_template: "https://arbiscan.io/tx/{tx_hash}".to_string(),
                explorer_api_url: Some("https://api.arbiscan.io/api".to_string()),
                pricing_slug: Some("arbitrum-one".to_string()),
                icon_slug: Some("arbitrum".to_string()),
            },
            _ => return None,
        };
        Some(cfg)
    }

    pub fn explorer_tx_url(&self, tx_hash: &str) -> String {
        self.explorer_url_template.replace("{tx_hash}", tx_hash)
    }

    pub fn explorer_address_url(&self, address: &str) -> String {
        self.explorer_url_template
            .replace("{tx_hash}", "")
            .trim_end_matches("tx/")
            .to_string()
            + "address/"
            + address
    }

    /// Whether ENS reverse-resolution applies.
    pub fn supports_ens(&self) -> bool {
        self.network_id == 1
    }
}

/// Convenience wrapper for callers who want a lookup table rather than
/// resolving one id at a time.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: HashMap<u64, NetworkConfig>,
}

impl NetworkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, config: NetworkConfig) {
        self.networks.insert(config.network_id, config);
    }

    pub fn get(&self, network_id: u64) -> Option<&NetworkConfig> {
        self.networks.get(&network_id)
    }

    /// A registry seeded with [`NetworkConfig::for_testing`]'s three chains.
    pub fn with_testing_defaults() -> Self {
        let mut registry = Self::new();
        for id in [1u64, 10, 42161] {
            if let Some(cfg) = NetworkConfig::for_testing(id) {
                registry.insert(cfg);
            }
        }
        registry
    }
}
