//! # Mute
//!
//! Era AMM with a V2-shaped router plus a parallel `stable` flag per hop.
//! Every curated pair carries its `bool_list`; a mismatch between path and
//! flag lengths is a table bug caught by the unit tests.

use async_trait::async_trait;
use ethers::types::{Address, U256};

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
    addr("0x8B791913eB07C32779a16750e3868aA8495F5964")
}

fn usdc() -> Address {
    addr("0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4")
}

fn wbtc() -> Address {
    addr("0xBBeB516fb02a01611cBBE0453Fe3c580D7281011")
}

pub struct Mute {
    routes: RouteTable,
    paths: PathTable,
}

impl Default for Mute {
    fn default() -> Self {
        Self::new()
    }
}

impl Mute {
    pub fn new() -> Self {
        use NetworkName::ZkSyncEra;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(
                ZkSyncEra,
                Eth,
                vec![RouteLeg::new(ZkSyncEra, Usdc), RouteLeg::new(ZkSyncEra, Wbtc)],
            )
            .insert(
                ZkSyncEra,
                Usdc,
                vec![RouteLeg::new(ZkSyncEra, Eth), RouteLeg::new(ZkSyncEra, Wbtc)],
            )
            .insert(ZkSyncEra, Wbtc, vec![RouteLeg::new(ZkSyncEra, Eth)]);

        let paths = PathTable::new()
            .insert(
                Eth,
                Usdc,
                TxPayloadDetails::new("swapExactETHForTokens", vec![weth(), usdc()])
                    .with_bools(vec![false, false]),
            )
            .insert(
                Eth,
                Wbtc,
                TxPayloadDetails::new("swapExactETHForTokens", vec![weth(), wbtc()])
                    .with_bools(vec![false, false]),
            )
            .insert(
                Usdc,
                Eth,
                TxPayloadDetails::new("swapExactTokensForETH", vec![usdc(), weth()])
                    .with_bools(vec![false, false]),
            )
            .insert(
                Usdc,
                Wbtc,
                TxPayloadDetails::new(
                    "swapExactTokensForTokens",
                    vec![usdc(), weth(), wbtc()],
                )
                .with_bools(vec![false, false, false]),
            )
            .insert(
                Wbtc,
                Eth,
                TxPayloadDetails::new("swapExactTokensForETH", vec![wbtc(), weth()])
                    .with_bools(vec![false, false]),
            );

        Self { routes, paths }
    }
}

#[async_trait]
impl Adapter for Mute {
    fn name(&self) -> &'static str {
        "Mute"
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
        let stable = details.bool_list.clone().unwrap_or_default();
        let deadline = swap_deadline();
        let recipient = ctx.client.address();

        let data = if proposal.from_token.is_native {
            abi::MUTE_ROUTER.encode(
                details.method,
                (
                    proposal.min_amount_to.wei(),
                    details.path.clone(),
                    recipient,
                    deadline,
                    stable,
                ),
            )
        } else {
            abi::MUTE_ROUTER.encode(
                details.method,
                (
                    proposal.amount_from.wei(),
                    proposal.min_amount_to.wei(),
                    details.path.clone(),
                    recipient,
                    deadline,
                    stable,
                ),
            )
        }
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
        Mute::new().route_table().verify_closure(&tokens).unwrap();
    }

    #[test]
    fn bool_list_length_matches_path() {
        let adapter = Mute::new();
        for pair in adapter.paths.pairs() {
            let details = adapter.paths.get(pair.0, pair.1).unwrap();
            let bools = details.bool_list.as_ref().expect("Mute pairs carry bools");
            assert_eq!(bools.len(), details.path.len(), "pair {pair:?}");
        }
    }

    #[test]
    fn usdc_to_wbtc_hops_through_weth() {
        let adapter = Mute::new();
        let details = adapter
            .paths
            .get(TokenSymbol::Usdc, TokenSymbol::Wbtc)
            .unwrap();
        assert_eq!(details.method, "swapExactTokensForTokens");
        assert_eq!(details.path, vec![usdc(), weth(), wbtc()]);
        assert_eq!(details.bool_list, Some(vec![false, false, false]));
    }
}
