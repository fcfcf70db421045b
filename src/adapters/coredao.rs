//! # CoreDAO Bridge
//!
//! Token-only (USDT/USDC) bridge between Core and the L0 chains. Two contract
//! flavours: the source-chain bridge into Core, and the Core-side bridge out
//! (which additionally takes the remote chain id and an unwrap flag). The
//! Optimism→Core direction requires an adapter-params blob; the quoted fee is
//! attached with a 3% buffer, rounded up.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};

use crate::abi;
use crate::adapter::{Adapter, AdapterContext, RouteLeg, RouteTable, TxPlan};
use crate::adapters::{buffer_fee, view};
use crate::errors::AdapterError;
use crate::networks::NetworkName;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::TokenSymbol;

const FEE_BUFFER_PERCENT: u64 = 3;

/// Gas limit packed into the Optimism→Core adapter params.
const OPTIMISM_BRIDGE_GAS: u64 = 100_000;

fn addr(s: &str) -> Address {
    s.parse().expect("static adapter address")
}

fn to_core_bridge(network: NetworkName) -> Option<Address> {
    use NetworkName::*;
    let a = match network {
        Polygon => addr("0x52e75D318cFB31f9A2EdFa2DFee26B161255B233"),
        Optimism => addr("0x29d096cD18C0dA7500295f082da73316d704c891"),
        Bsc => addr("0x52e75D318cFB31f9A2EdFa2DFee26B161255B233"),
        _ => return None,
    };
    Some(a)
}

fn from_core_bridge() -> Address {
    addr("0xA4218e1F39DA4AaDaC971066458Db56e901bcbdE")
}

/// `(uint8 1, uint64 gasLimit)` ABI-encoded, with the 30-byte prefix
/// stripped: two bytes of the version word survive, then the full gas word.
fn optimism_adapter_params(gas_limit: u64) -> Bytes {
    let encoded = ethers::abi::encode(&[
        Token::Uint(U256::from(1u8)),
        Token::Uint(U256::from(gas_limit)),
    ]);
    Bytes::from(encoded[30..].to_vec())
}

pub struct CoreDaoBridge {
    routes: RouteTable,
}

impl Default for CoreDaoBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreDaoBridge {
    pub fn new() -> Self {
        use NetworkName::*;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(Polygon, Usdt, vec![RouteLeg::new(NetworkName::Core, Usdt)])
            .insert(Polygon, Usdc, vec![RouteLeg::new(NetworkName::Core, Usdc)])
            .insert(Optimism, Usdt, vec![RouteLeg::new(NetworkName::Core, Usdt)])
            .insert(Bsc, Usdt, vec![RouteLeg::new(NetworkName::Core, Usdt)])
            .insert(
                NetworkName::Core,
                Usdt,
                vec![RouteLeg::new(Polygon, Usdt), RouteLeg::new(Bsc, Usdt)],
            )
            .insert(NetworkName::Core, Usdc, vec![RouteLeg::new(Polygon, Usdc)]);

        Self { routes }
    }

    async fn build_into_core(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let src = ctx.client.network.name;
        let bridge = to_core_bridge(src).ok_or(AdapterError::NoRoute {
            network: src.to_string(),
            token: proposal.from_token.title.to_string(),
        })?;

        let adapter_params = if src == NetworkName::Optimism {
            optimism_adapter_params(OPTIMISM_BRIDGE_GAS)
        } else {
            Bytes::new()
        };

        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::CORE_BRIDGE_TO,
            bridge,
            "estimateBridgeFee",
            (false, Token::Bytes(adapter_params.to_vec())),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let call_params = Token::Tuple(vec![
            Token::Address(ctx.client.address()),
            Token::Address(Address::zero()),
        ]);
        let data = abi::CORE_BRIDGE_TO
            .encode(
                "bridge",
                (
                    Token::Address(proposal.from_token.address),
                    Token::Uint(proposal.amount_from.wei()),
                    Token::Address(ctx.client.address()),
                    call_params,
                    Token::Bytes(adapter_params.to_vec()),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(bridge, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }

    async fn build_out_of_core(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let bridge = from_core_bridge();
        let remote_chain_id = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_id
            .ok_or_else(|| {
                AdapterError::QuoteFailed(format!("{} has no L0 id", ctx.leg.dst_network))
            })?;

        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::CORE_BRIDGE_FROM,
            bridge,
            "estimateBridgeFee",
            (remote_chain_id, false, Token::Bytes(vec![])),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let call_params = Token::Tuple(vec![
            Token::Address(ctx.client.address()),
            Token::Address(Address::zero()),
        ]);
        let data = abi::CORE_BRIDGE_FROM
            .encode(
                "bridge",
                (
                    Token::Address(proposal.from_token.address),
                    Token::Uint(U256::from(remote_chain_id)),
                    Token::Uint(proposal.amount_from.wei()),
                    Token::Address(ctx.client.address()),
                    Token::Bool(false),
                    call_params,
                    Token::Bytes(vec![]),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(bridge, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }
}

#[async_trait]
impl Adapter for CoreDaoBridge {
    fn name(&self) -> &'static str {
        "CoreDAO"
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
        if ctx.client.network.name == NetworkName::Core {
            self.build_out_of_core(proposal, ctx).await
        } else {
            self.build_into_core(proposal, ctx).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenRegistry;

    #[test]
    fn route_table_closes_over_registry() {
        let tokens = TokenRegistry::bootstrap();
        CoreDaoBridge::new()
            .route_table()
            .verify_closure(&tokens)
            .unwrap();
    }

    #[test]
    fn optimism_blob_is_version_then_gas() {
        let blob = optimism_adapter_params(100_000);
        assert_eq!(blob.len(), 34);
        assert_eq!(&blob[..2], &[0x00, 0x01]);
        assert_eq!(U256::from_big_endian(&blob[2..]), U256::from(100_000u64));
    }

    #[test]
    fn only_stables_have_routes() {
        let adapter = CoreDaoBridge::new();
        for (_, legs) in adapter.route_table().iter() {
            for leg in legs {
                assert!(matches!(
                    leg.dst_token,
                    TokenSymbol::Usdt | TokenSymbol::Usdc
                ));
            }
        }
    }
}
