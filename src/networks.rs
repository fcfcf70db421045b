//! # Network Registry
//!
//! Immutable description of every supported chain. The registry is built once
//! at process start and handed to clients by `Arc`; nothing mutates a
//! `Network` after construction, so the whole tree is freely shareable
//! between per-account tasks.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// Stable identifiers for every network the engine can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkName {
    Ethereum,
    Arbitrum,
    Optimism,
    Polygon,
    Bsc,
    Avalanche,
    Fantom,
    Base,
    ZkSyncEra,
    Core,
    Sepolia,
    Starknet,
}

impl NetworkName {
    pub const fn as_str(&self) -> &'static str {
        match self {
            NetworkName::Ethereum => "Ethereum",
            NetworkName::Arbitrum => "Arbitrum",
            NetworkName::Optimism => "Optimism",
            NetworkName::Polygon => "Polygon",
            NetworkName::Bsc => "BSC",
            NetworkName::Avalanche => "Avalanche",
            NetworkName::Fantom => "Fantom",
            NetworkName::Base => "Base",
            NetworkName::ZkSyncEra => "zkSync Era",
            NetworkName::Core => "Core",
            NetworkName::Sepolia => "Sepolia",
            NetworkName::Starknet => "Starknet",
        }
    }

    pub fn is_evm(&self) -> bool {
        !matches!(self, NetworkName::Starknet)
    }
}

impl fmt::Display for NetworkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction envelope used on a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    Legacy = 0,
    Eip1559 = 2,
}

/// One chain, fully described. Chain id, once observed, never changes for the
/// lifetime of the process.
#[derive(Debug, Clone)]
pub struct Network {
    pub name: NetworkName,
    pub chain_id: u64,
    pub rpc_urls: Vec<String>,
    pub coin_symbol: &'static str,
    pub decimals: u8,
    pub tx_type: TxType,
    pub explorer: &'static str,
    /// LayerZero v1 endpoint id, when the chain participates in L0 routing.
    pub l0_id: Option<u16>,
    /// LayerZero v2 endpoint id.
    pub l0_eid: Option<u32>,
}

impl Network {
    pub fn tx_url(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer.trim_end_matches('/'), tx_hash)
    }
}

/// Environment variable carrying the Ankr API key; appended as a path segment
/// to every Ankr RPC URL when set.
const ANKR_API_KEY_ENV: &str = "ANKR_API_KEY";

fn finalize_rpc(url: &str) -> String {
    if url.contains("rpc.ankr.com") {
        if let Ok(key) = std::env::var(ANKR_API_KEY_ENV) {
            if !key.is_empty() {
                return format!("{}/{}", url.trim_end_matches('/'), key);
            }
        }
    }
    url.to_string()
}

fn rpcs_from_env(var: &str, defaults: &[&str]) -> Vec<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|u| finalize_rpc(u.trim()))
            .collect(),
        _ => defaults.iter().map(|u| finalize_rpc(u)).collect(),
    }
}

/// The immutable registry of all networks known to this process.
#[derive(Debug, Clone)]
pub struct Networks {
    by_name: HashMap<NetworkName, Arc<Network>>,
}

impl Networks {
    /// Builds the full registry eagerly. RPC URL lists come from the
    /// environment (`<NAME>_RPC_URLS`, comma-separated) with public defaults.
    pub fn bootstrap() -> Self {
        let mut by_name = HashMap::new();
        let mut add = |n: Network| {
            by_name.insert(n.name, Arc::new(n));
        };

        add(Network {
            name: NetworkName::Ethereum,
            chain_id: 1,
            rpc_urls: rpcs_from_env("ETHEREUM_RPC_URLS", &["https://rpc.ankr.com/eth"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://etherscan.io",
            l0_id: Some(101),
            l0_eid: Some(30101),
        });
        add(Network {
            name: NetworkName::Arbitrum,
            chain_id: 42161,
            rpc_urls: rpcs_from_env("ARBITRUM_RPC_URLS", &["https://rpc.ankr.com/arbitrum"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://arbiscan.io",
            l0_id: Some(110),
            l0_eid: Some(30110),
        });
        add(Network {
            name: NetworkName::Optimism,
            chain_id: 10,
            rpc_urls: rpcs_from_env("OPTIMISM_RPC_URLS", &["https://rpc.ankr.com/optimism"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://optimistic.etherscan.io",
            l0_id: Some(111),
            l0_eid: Some(30111),
        });
        add(Network {
            name: NetworkName::Polygon,
            chain_id: 137,
            rpc_urls: rpcs_from_env("POLYGON_RPC_URLS", &["https://rpc.ankr.com/polygon"]),
            coin_symbol: "POL",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://polygonscan.com",
            l0_id: Some(109),
            l0_eid: Some(30109),
        });
        add(Network {
            name: NetworkName::Bsc,
            chain_id: 56,
            rpc_urls: rpcs_from_env("BSC_RPC_URLS", &["https://rpc.ankr.com/bsc"]),
            coin_symbol: "BNB",
            decimals: 18,
            tx_type: TxType::Legacy,
            explorer: "https://bscscan.com",
            l0_id: Some(102),
            l0_eid: Some(30102),
        });
        add(Network {
            name: NetworkName::Avalanche,
            chain_id: 43114,
            rpc_urls: rpcs_from_env("AVALANCHE_RPC_URLS", &["https://rpc.ankr.com/avalanche"]),
            coin_symbol: "AVAX",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://snowtrace.io",
            l0_id: Some(106),
            l0_eid: Some(30106),
        });
        add(Network {
            name: NetworkName::Fantom,
            chain_id: 250,
            rpc_urls: rpcs_from_env("FANTOM_RPC_URLS", &["https://rpc.ankr.com/fantom"]),
            coin_symbol: "FTM",
            decimals: 18,
            tx_type: TxType::Legacy,
            explorer: "https://ftmscan.com",
            l0_id: Some(112),
            l0_eid: Some(30112),
        });
        add(Network {
            name: NetworkName::Base,
            chain_id: 8453,
            rpc_urls: rpcs_from_env("BASE_RPC_URLS", &["https://rpc.ankr.com/base"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://basescan.org",
            l0_id: Some(184),
            l0_eid: Some(30184),
        });
        add(Network {
            name: NetworkName::ZkSyncEra,
            chain_id: 324,
            rpc_urls: rpcs_from_env("ZKSYNC_RPC_URLS", &["https://mainnet.era.zksync.io"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://explorer.zksync.io",
            l0_id: Some(165),
            l0_eid: Some(30165),
        });
        add(Network {
            name: NetworkName::Core,
            chain_id: 1116,
            rpc_urls: rpcs_from_env("CORE_RPC_URLS", &["https://rpc.coredao.org"]),
            coin_symbol: "CORE",
            decimals: 18,
            tx_type: TxType::Legacy,
            explorer: "https://scan.coredao.org",
            l0_id: Some(153),
            l0_eid: Some(30153),
        });
        add(Network {
            name: NetworkName::Sepolia,
            chain_id: 11155111,
            rpc_urls: rpcs_from_env("SEPOLIA_RPC_URLS", &["https://rpc.ankr.com/eth_sepolia"]),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://sepolia.etherscan.io",
            l0_id: Some(161),
            l0_eid: None,
        });
        add(Network {
            name: NetworkName::Starknet,
            chain_id: 0,
            rpc_urls: rpcs_from_env(
                "STARKNET_RPC_URLS",
                &["https://starknet-mainnet.public.blastapi.io/rpc/v0_7"],
            ),
            coin_symbol: "ETH",
            decimals: 18,
            tx_type: TxType::Eip1559,
            explorer: "https://starkscan.co",
            l0_id: None,
            l0_eid: None,
        });

        Self { by_name }
    }

    pub fn get(&self, name: NetworkName) -> Result<Arc<Network>, ClientError> {
        self.by_name
            .get(&name)
            .cloned()
            .ok_or_else(|| ClientError::NetworkNotAdded(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Network>> {
        self.by_name.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_holds_all_declared_networks() {
        let networks = Networks::bootstrap();
        for name in [
            NetworkName::Ethereum,
            NetworkName::Arbitrum,
            NetworkName::Polygon,
            NetworkName::ZkSyncEra,
            NetworkName::Core,
            NetworkName::Starknet,
        ] {
            assert!(networks.get(name).is_ok(), "missing {name}");
        }
    }

    #[test]
    fn l0_ids_match_endpoint_table() {
        let networks = Networks::bootstrap();
        assert_eq!(networks.get(NetworkName::Arbitrum).unwrap().l0_eid, Some(30110));
        assert_eq!(networks.get(NetworkName::Polygon).unwrap().l0_id, Some(109));
        assert_eq!(networks.get(NetworkName::Core).unwrap().l0_id, Some(153));
    }

    #[test]
    fn explorer_tx_url_is_joined_cleanly() {
        let networks = Networks::bootstrap();
        let net = networks.get(NetworkName::Ethereum).unwrap();
        assert_eq!(
            net.tx_url("0xabc"),
            "https://etherscan.io/tx/0xabc"
        );
    }
}
