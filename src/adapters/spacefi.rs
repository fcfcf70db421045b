//! # SpaceFi
//!
//! V2-shaped AMM on zkSync Era. Plain `swapExact*` calls over a curated path
//! table; deadline is always now + 20 minutes; the minimum out comes from the
//! price feed via the proposal, never from an on-chain quote.

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
    addr("0xbE7D1FD1f6748bbDefC4fbaCafBb11C6Fc506d1d")
}

fn usdc() -> Address {
    addr("0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4")
}

fn usdt() -> Address {
    addr("0x493257fD37EDB34451f62EDf8D2a0C418852bA4C")
}

pub struct SpaceFi {
    routes: RouteTable,
    paths: PathTable,
}

impl Default for SpaceFi {
    fn default() -> Self {
        Self::new()
    }
}

impl SpaceFi {
    pub fn new() -> Self {
        use NetworkName::ZkSyncEra;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(
                ZkSyncEra,
                Eth,
                vec![RouteLeg::new(ZkSyncEra, Usdc), RouteLeg::new(ZkSyncEra, Usdt)],
            )
            .insert(ZkSyncEra, Usdc, vec![RouteLeg::new(ZkSyncEra, Eth)])
            .insert(ZkSyncEra, Usdt, vec![RouteLeg::new(ZkSyncEra, Eth)]);

        let paths = PathTable::new()
            .insert(
                Eth,
                Usdc,
                TxPayloadDetails::new("swapExactETHForTokens", vec![weth(), usdc()]),
            )
            .insert(
                Eth,
                Usdt,
                TxPayloadDetails::new("swapExactETHForTokens", vec![weth(), usdt()]),
            )
            .insert(
                Usdc,
                Eth,
                TxPayloadDetails::new("swapExactTokensForETH", vec![usdc(), weth()]),
            )
            .insert(
                Usdt,
                Eth,
                TxPayloadDetails::new("swapExactTokensForETH", vec![usdt(), weth()]),
            );

        Self { routes, paths }
    }
}

#[async_trait]
impl Adapter for SpaceFi {
    fn name(&self) -> &'static str {
        "SpaceFi"
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
        let deadline = swap_deadline();
        let recipient = ctx.client.address();

        let data = if proposal.from_token.is_native {
            abi::V2_ROUTER.encode(
                details.method,
                (
                    proposal.min_amount_to.wei(),
                    details.path.clone(),
                    recipient,
                    deadline,
                ),
            )
        } else {
            abi::V2_ROUTER.encode(
                details.method,
                (
                    proposal.amount_from.wei(),
                    proposal.min_amount_to.wei(),
                    details.path.clone(),
                    recipient,
                    deadline,
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
        SpaceFi::new().route_table().verify_closure(&tokens).unwrap();
    }

    #[test]
    fn every_route_leg_has_payload_details() {
        let adapter = SpaceFi::new();
        for ((_, from), legs) in adapter.route_table().iter() {
            for leg in legs {
                adapter.paths.get(*from, leg.dst_token).unwrap();
            }
        }
    }

    #[test]
    fn native_paths_start_at_weth() {
        let adapter = SpaceFi::new();
        let details = adapter.paths.get(TokenSymbol::Eth, TokenSymbol::Usdc).unwrap();
        assert_eq!(details.path[0], weth());
        assert_eq!(details.method, "swapExactETHForTokens");
    }
}
