//! # TestnetBridge
//!
//! Wraps the L0 OFT `swapAndBridge`: mainnet ETH in, testnet GETH out on
//! Sepolia. The fee comes from `estimateSendFee` on the OFT contract the
//! router reports.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, U256};

use crate::abi;
use crate::adapter::{Adapter, AdapterContext, RouteLeg, RouteTable, TxPlan};
use crate::adapters::view;
use crate::errors::AdapterError;
use crate::networks::NetworkName;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::TokenSymbol;

fn addr(s: &str) -> Address {
    s.parse().expect("static adapter address")
}

fn router(network: NetworkName) -> Option<Address> {
    use NetworkName::*;
    let a = match network {
        Arbitrum => addr("0xfcA99F4B5186D4bfBDbd2C542dcA2ecA4906BA45"),
        Optimism => addr("0x8352C746839699B1fc631fddc0C3a00d4AC71A17"),
        _ => return None,
    };
    Some(a)
}

pub struct TestnetBridge {
    routes: RouteTable,
}

impl Default for TestnetBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TestnetBridge {
    pub fn new() -> Self {
        use NetworkName::*;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(Arbitrum, Eth, vec![RouteLeg::new(Sepolia, GethLz)])
            .insert(Optimism, Eth, vec![RouteLeg::new(Sepolia, GethLz)]);

        Self { routes }
    }
}

#[async_trait]
impl Adapter for TestnetBridge {
    fn name(&self) -> &'static str {
        "TestnetBridge"
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
        let src = ctx.client.network.name;
        let router = router(src).ok_or(AdapterError::NoRoute {
            network: src.to_string(),
            token: proposal.from_token.title.to_string(),
        })?;
        let dst_chain_id = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_id
            .ok_or_else(|| {
                AdapterError::QuoteFailed(format!("{} has no L0 id", ctx.leg.dst_network))
            })?;

        let oft: Address = view(ctx.client, &abi::TESTNET_BRIDGE, router, "oft", ()).await?;
        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::OFT,
            oft,
            "estimateSendFee",
            (
                dst_chain_id,
                Token::Bytes(ctx.client.address().as_bytes().to_vec()),
                Token::Uint(proposal.amount_from.wei()),
                Token::Bool(false),
                Token::Bytes(vec![]),
            ),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let data = abi::TESTNET_BRIDGE
            .encode(
                "swapAndBridge",
                (
                    Token::Uint(proposal.amount_from.wei()),
                    Token::Uint(proposal.min_amount_to.wei()),
                    Token::Uint(U256::from(dst_chain_id)),
                    Token::Address(ctx.client.address()),
                    Token::Address(ctx.client.address()),
                    Token::Address(Address::zero()),
                    Token::Bytes(vec![]),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(router, data, U256::zero()),
            native_fee,
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
        TestnetBridge::new()
            .route_table()
            .verify_closure(&tokens)
            .unwrap();
    }

    #[test]
    fn only_native_eth_sources_exist() {
        let adapter = TestnetBridge::new();
        for ((_, token), _) in adapter.route_table().iter() {
            assert_eq!(*token, TokenSymbol::Eth);
        }
    }
}
