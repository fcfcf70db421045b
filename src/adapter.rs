//! # Adapter Contract
//!
//! The uniform interface every protocol integration (bridge or swap)
//! satisfies so the operation engine can drive them identically: a static
//! route table, a `build_tx` that turns a proposal into concrete transaction
//! parameters plus the native fee to attach, and nothing else.

use std::collections::HashMap;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::U256;

use crate::client::ChainClient;
use crate::errors::AdapterError;
use crate::networks::{NetworkName, Networks};
use crate::price_oracle::PriceOracle;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::{TokenRegistry, TokenSymbol};

/// Stargate v2 transport selector: taxi is fast and expensive, bus is
/// batched and cheap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeType {
    Fast,
    Economy,
}

impl BridgeType {
    /// The `oftCmd` byte string selecting the transport.
    pub fn oft_cmd(&self) -> Vec<u8> {
        match self {
            BridgeType::Fast => vec![],
            BridgeType::Economy => vec![0x01],
        }
    }
}

/// Adapter-specific route variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteVariant {
    Bridge(BridgeType),
}

/// One reachable destination from a (source network, source token) pair.
#[derive(Debug, Clone)]
pub struct RouteLeg {
    pub dst_network: NetworkName,
    pub dst_token: TokenSymbol,
    pub variant: Option<RouteVariant>,
}

impl RouteLeg {
    pub fn new(dst_network: NetworkName, dst_token: TokenSymbol) -> Self {
        Self {
            dst_network,
            dst_token,
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: RouteVariant) -> Self {
        self.variant = Some(variant);
        self
    }
}

/// Static `(src_net, src_token) → [legs]` declaration per adapter.
#[derive(Debug, Default)]
pub struct RouteTable {
    entries: HashMap<(NetworkName, TokenSymbol), Vec<RouteLeg>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        mut self,
        src_network: NetworkName,
        src_token: TokenSymbol,
        legs: Vec<RouteLeg>,
    ) -> Self {
        self.entries.insert((src_network, src_token), legs);
        self
    }

    pub fn source_networks(&self) -> Vec<NetworkName> {
        let mut nets: Vec<NetworkName> = self.entries.keys().map(|(n, _)| *n).collect();
        nets.sort_by_key(|n| n.as_str());
        nets.dedup();
        nets
    }

    pub fn source_tokens(&self, network: NetworkName) -> Vec<TokenSymbol> {
        let mut toks: Vec<TokenSymbol> = self
            .entries
            .keys()
            .filter(|(n, _)| *n == network)
            .map(|(_, t)| *t)
            .collect();
        toks.sort_by_key(|t| t.as_str());
        toks
    }

    pub fn destinations(&self, network: NetworkName, token: TokenSymbol) -> &[RouteLeg] {
        self.entries
            .get(&(network, token))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(NetworkName, TokenSymbol), &Vec<RouteLeg>)> {
        self.entries.iter()
    }

    /// Route-table closure: every referenced (network, token) must resolve in
    /// the token registry. Starknet legs are resolved by the Starknet-side
    /// registry and skipped here.
    pub fn verify_closure(&self, tokens: &TokenRegistry) -> Result<(), AdapterError> {
        for ((src_net, src_tok), legs) in &self.entries {
            if src_net.is_evm() && !tokens.contains(*src_net, *src_tok) {
                return Err(AdapterError::NoRoute {
                    network: src_net.to_string(),
                    token: src_tok.to_string(),
                });
            }
            for leg in legs {
                if leg.dst_network.is_evm() && !tokens.contains(leg.dst_network, leg.dst_token) {
                    return Err(AdapterError::NoRoute {
                        network: leg.dst_network.to_string(),
                        token: leg.dst_token.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Concrete transaction parameters an adapter hands back to the engine.
#[derive(Debug, Clone)]
pub struct TxPlan {
    pub tx: TypedTransaction,
    /// Native-currency fee that must ride in `value` (on top of the amount
    /// for native-source operations).
    pub native_fee: U256,
    /// Optional destination-side fee the protocol airdrops.
    pub dst_fee: Option<U256>,
}

/// Everything an adapter may consult while encoding.
pub struct AdapterContext<'a> {
    pub client: &'a ChainClient,
    pub networks: &'a Networks,
    pub tokens: &'a TokenRegistry,
    pub oracle: &'a PriceOracle,
    pub leg: &'a RouteLeg,
}

/// The contract every protocol integration satisfies.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn route_table(&self) -> &RouteTable;

    /// Translates a proposal into transaction parameters plus the quoted
    /// native fee. Zero-amount proposals are rejected with `ZeroAmount`.
    async fn build_tx(
        &self,
        proposal: &OperationProposal,
        info: &OperationInfo,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_table_lookups_work() {
        let table = RouteTable::new().insert(
            NetworkName::Polygon,
            TokenSymbol::Usdc,
            vec![
                RouteLeg::new(NetworkName::Arbitrum, TokenSymbol::Usdc)
                    .with_variant(RouteVariant::Bridge(BridgeType::Fast)),
                RouteLeg::new(NetworkName::Optimism, TokenSymbol::UsdcE),
            ],
        );
        assert_eq!(table.source_networks(), vec![NetworkName::Polygon]);
        assert_eq!(
            table.source_tokens(NetworkName::Polygon),
            vec![TokenSymbol::Usdc]
        );
        assert_eq!(
            table
                .destinations(NetworkName::Polygon, TokenSymbol::Usdc)
                .len(),
            2
        );
        assert!(table
            .destinations(NetworkName::Polygon, TokenSymbol::Usdt)
            .is_empty());
    }

    #[test]
    fn closure_detects_unregistered_tokens() {
        let tokens = TokenRegistry::bootstrap();
        let good = RouteTable::new().insert(
            NetworkName::Polygon,
            TokenSymbol::Usdc,
            vec![RouteLeg::new(NetworkName::Arbitrum, TokenSymbol::Usdc)],
        );
        assert!(good.verify_closure(&tokens).is_ok());

        let bad = RouteTable::new().insert(
            NetworkName::Fantom,
            TokenSymbol::Wbtc, // not registered on Fantom
            vec![RouteLeg::new(NetworkName::Arbitrum, TokenSymbol::Usdc)],
        );
        assert!(bad.verify_closure(&tokens).is_err());
    }

    #[test]
    fn bridge_type_maps_to_oft_cmd_bytes() {
        assert!(BridgeType::Fast.oft_cmd().is_empty());
        assert_eq!(BridgeType::Economy.oft_cmd(), vec![0x01]);
    }
}
