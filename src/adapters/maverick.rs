//! # Maverick
//!
//! Concentrated-liquidity AMM on zkSync Era. `exactInput` takes a packed
//! byte path of token and pool addresses interleaved
//! (`token ‖ pool ‖ token ‖ pool ‖ …`); the curated table carries the pool
//! addresses alongside the token path.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};

use crate::abi;
use crate::adapter::{Adapter, AdapterContext, RouteLeg, RouteTable, TxPlan};
use crate::adapters::swap_deadline;
use crate::adapters::zkera::{weth, PathTable, TxPayloadDetails};
use crate::errors::AdapterError;
use crate::networks::NetworkName;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::TokenSymbol;

fn addr(s: &str) -> Address {
    s.parse().expect("static adapter address")
}

fn router() -> Address {
    addr("0x39E098A153Ad69834a9Dac32f0FCa92066aD03f4")
}

fn usdc() -> Address {
    addr("0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4")
}

fn eth_usdc_pool() -> Address {
    addr("0x41C8cf74c27554A8972d3bf3D2BD4a14D8B604AB")
}

/// Packs `token ‖ pool ‖ token ‖ …` into the byte path `exactInput` expects.
fn pack_path(tokens: &[Address], pools: &[Address]) -> Bytes {
    let mut out = Vec::with_capacity(tokens.len() * 20 + pools.len() * 20);
    for (i, token) in tokens.iter().enumerate() {
        out.extend_from_slice(token.as_bytes());
        if let Some(pool) = pools.get(i) {
            out.extend_from_slice(pool.as_bytes());
        }
    }
    Bytes::from(out)
}

pub struct Maverick {
    routes: RouteTable,
    paths: PathTable,
}

impl Default for Maverick {
    fn default() -> Self {
        Self::new()
    }
}

impl Maverick {
    pub fn new() -> Self {
        use NetworkName::ZkSyncEra;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(ZkSyncEra, Eth, vec![RouteLeg::new(ZkSyncEra, Usdc)])
            .insert(ZkSyncEra, Usdc, vec![RouteLeg::new(ZkSyncEra, Eth)]);

        let paths = PathTable::new()
            .insert(
                Eth,
                Usdc,
                TxPayloadDetails::new("exactInput", vec![weth(), usdc()])
                    .with_pools(vec![eth_usdc_pool()]),
            )
            .insert(
                Usdc,
                Eth,
                TxPayloadDetails::new("exactInput", vec![usdc(), weth()])
                    .with_pools(vec![eth_usdc_pool()]),
            );

        Self { routes, paths }
    }
}

#[async_trait]
impl Adapter for Maverick {
    fn name(&self) -> &'static str {
        "Maverick"
    }

    fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    async fn build_tx(
        &self,
        proposal: &OperationProposal,
        _info: &OperationInfo,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        if proposal.amount_from.is_zero() {
            return Err(AdapterError::ZeroAmount);
        }
        let details = self
            .paths
            .get(proposal.from_token.title, ctx.leg.dst_token)?;
        let path = pack_path(&details.path, &details.pools);

        let params = Token::Tuple(vec![
            Token::Bytes(path.to_vec()),
            Token::Address(ctx.client.address()),
            Token::Uint(swap_deadline()),
            Token::Uint(proposal.amount_from.wei()),
            Token::Uint(proposal.min_amount_to.wei()),
        ]);
        let data = abi::MAVERICK_ROUTER
            .encode("exactInput", (params,))
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(router(), data, U256::zero()),
            native_fee: U256::zero(),
            dst_fee: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenRegistry;

    #[test]
    fn route_table_closes_over_registry() {
        let tokens = TokenRegistry::bootstrap();
        Maverick::new().route_table().verify_closure(&tokens).unwrap();
    }

    #[test]
    fn packed_path_interleaves_tokens_and_pools() {
        let path = pack_path(&[weth(), usdc()], &[eth_usdc_pool()]);
        assert_eq!(path.len(), 60);
        assert_eq!(&path[..20], weth().as_bytes());
        assert_eq!(&path[20..40], eth_usdc_pool().as_bytes());
        assert_eq!(&path[40..], usdc().as_bytes());
    }
}
