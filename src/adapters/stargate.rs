//! # Stargate (v1 and v2)
//!
//! LayerZero token transfer in five code paths: native ETH through the
//! RouterETH wrapper, USDV→USDV over the USDV OFT, token→USDV recolor,
//! STG over its own `sendTokens`, and the default v1 pool `swap`. Routes
//! carrying a `BridgeType` variant go through the v2 endpoint instead
//! (`send` with taxi/bus `oftCmd`). All paths buffer the quoted LayerZero
//! fee by 6%.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};

use crate::abi;
use crate::adapter::{
    Adapter, AdapterContext, BridgeType, RouteLeg, RouteTable, RouteVariant, TxPlan,
};
use crate::adapters::{buffer_fee, view};
use crate::client::address_to_bytes32;
use crate::errors::AdapterError;
use crate::networks::NetworkName;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::TokenSymbol;

/// Percent buffer over every quoted LayerZero fee.
const FEE_BUFFER_PERCENT: u64 = 6;

/// Gas limit encoded into STG `sendTokens` adapter params.
const STG_SEND_GAS: u64 = 85_000;

fn addr(s: &str) -> Address {
    s.parse().expect("static adapter address")
}

/// v1 pool ids per (network, token).
fn pool_id(network: NetworkName, token: TokenSymbol) -> Option<u8> {
    use NetworkName::*;
    use TokenSymbol::*;
    let id = match (network, token) {
        (_, Usdc) | (_, UsdcE) => 1,
        (Polygon | Avalanche | Bsc | Ethereum, Usdt) => 2,
        (Ethereum | Arbitrum | Optimism | Base, Eth) => 13,
        _ => return None,
    };
    Some(id)
}

fn v1_router(network: NetworkName) -> Option<Address> {
    use NetworkName::*;
    let a = match network {
        Ethereum => addr("0x8731d54E9D02c286767d56ac03e8037C07e01e98"),
        Polygon => addr("0x45A01E4e04F14f7A4a6702c74187c5F6222033cd"),
        Arbitrum => addr("0x53Bf833A5d6c4ddA888F69c22C88C9f356a41614"),
        Optimism => addr("0xB0D502E938ed5f4df2E681fE6E419ff29631d62b"),
        Bsc => addr("0x4a364f8c717cAAD9A442737Eb7b8A55cc6cf18D8"),
        Avalanche => addr("0x45A01E4e04F14f7A4a6702c74187c5F6222033cd"),
        _ => return None,
    };
    Some(a)
}

fn router_eth(network: NetworkName) -> Option<Address> {
    use NetworkName::*;
    let a = match network {
        Ethereum => addr("0x150f94B44927F078737562f0fcF3C95c01Cc2376"),
        Arbitrum => addr("0xbf22f0d84c80512eF2b88D7F4F0A67F2cB0e9cbb"),
        Optimism => addr("0xB49c4e680174E331CB0A7fF3Ab58afC9738d5F8b"),
        Base => addr("0x50B6EbC2103BFEc165949CC946d739d5650d7ae4"),
        _ => return None,
    };
    Some(a)
}

/// v2 token pools (`send`/`quoteSend` endpoints).
fn v2_pool(network: NetworkName, token: TokenSymbol) -> Option<Address> {
    use NetworkName::*;
    use TokenSymbol::*;
    let a = match (network, token) {
        (Polygon, Usdc) => addr("0x9Aa02D4Fae7F58b8E8f34c66E756cC734DAc7fe4"),
        (Arbitrum, Usdc) => addr("0xe8CDF27AcD73a434D661C84887215F7598e7d0d3"),
        (Optimism, Usdc) | (Optimism, UsdcE) => {
            addr("0xcE8CcA271Ebc0533920C83d39F417ED6A0abB7D0")
        }
        _ => return None,
    };
    Some(a)
}

/// LayerZero v1 adapter-params blob: `(uint16 version, uint256 gasLimit)`
/// solidity-packed.
fn l0_adapter_params_v1(gas_limit: u64) -> Bytes {
    let mut out = Vec::with_capacity(34);
    out.extend_from_slice(&1u16.to_be_bytes());
    let mut gas = [0u8; 32];
    U256::from(gas_limit).to_big_endian(&mut gas);
    out.extend_from_slice(&gas);
    Bytes::from(out)
}

pub struct Stargate {
    routes: RouteTable,
}

impl Default for Stargate {
    fn default() -> Self {
        Self::new()
    }
}

impl Stargate {
    pub fn new() -> Self {
        use NetworkName::*;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(
                Polygon,
                Usdc,
                vec![
                    RouteLeg::new(Arbitrum, Usdc)
                        .with_variant(RouteVariant::Bridge(BridgeType::Fast)),
                    RouteLeg::new(Arbitrum, Usdc)
                        .with_variant(RouteVariant::Bridge(BridgeType::Economy)),
                    RouteLeg::new(Optimism, UsdcE),
                ],
            )
            .insert(
                Arbitrum,
                Usdc,
                vec![
                    RouteLeg::new(Polygon, Usdc)
                        .with_variant(RouteVariant::Bridge(BridgeType::Fast)),
                    RouteLeg::new(Optimism, UsdcE),
                    RouteLeg::new(Ethereum, Usdv),
                ],
            )
            .insert(
                Polygon,
                Usdt,
                vec![RouteLeg::new(Avalanche, Usdt), RouteLeg::new(Bsc, Usdt)],
            )
            .insert(Avalanche, Usdt, vec![RouteLeg::new(Polygon, Usdt)])
            .insert(
                Arbitrum,
                Eth,
                vec![RouteLeg::new(Optimism, Eth), RouteLeg::new(Base, Eth)],
            )
            .insert(
                Optimism,
                Eth,
                vec![RouteLeg::new(Arbitrum, Eth), RouteLeg::new(Base, Eth)],
            )
            .insert(
                Bsc,
                Stg,
                vec![RouteLeg::new(Arbitrum, Stg), RouteLeg::new(Polygon, Stg)],
            )
            .insert(Ethereum, Usdv, vec![RouteLeg::new(Arbitrum, Usdv)])
            .insert(Arbitrum, Usdv, vec![RouteLeg::new(Ethereum, Usdv)]);

        Self { routes }
    }

    /// v2 `send` over the token pool. `bridge_type` picks taxi vs bus.
    async fn build_v2(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
        bridge_type: BridgeType,
    ) -> Result<TxPlan, AdapterError> {
        let src = ctx.client.network.name;
        let pool =
            v2_pool(src, proposal.from_token.title).ok_or(AdapterError::PoolIdMissing {
                from: src.to_string(),
                to: proposal.from_token.title.to_string(),
            })?;
        let dst_eid = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_eid
            .ok_or_else(|| AdapterError::QuoteFailed(format!(
                "{} has no v2 endpoint id",
                ctx.leg.dst_network
            )))?;

        let send_param = Token::Tuple(vec![
            Token::Uint(U256::from(dst_eid)),
            Token::FixedBytes(address_to_bytes32(ctx.client.address()).to_vec()),
            Token::Uint(proposal.amount_from.wei()),
            Token::Uint(proposal.min_amount_to.wei()),
            Token::Bytes(vec![]),
            Token::Bytes(vec![]),
            Token::Bytes(bridge_type.oft_cmd()),
        ]);

        let (native_fee, _lz_fee): (U256, U256) = view(
            ctx.client,
            &abi::STARGATE_V2,
            pool,
            "quoteSend",
            (send_param.clone(), false),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let fee = Token::Tuple(vec![Token::Uint(native_fee), Token::Uint(U256::zero())]);
        let data = abi::STARGATE_V2
            .encode(
                "send",
                (send_param, fee, Token::Address(ctx.client.address())),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let value = buffer_fee(native_fee, FEE_BUFFER_PERCENT);
        Ok(TxPlan {
            tx: ctx.client.new_tx(pool, data, U256::zero()),
            native_fee: value,
            dst_fee: None,
        })
    }

    /// Native ETH over RouterETH, which resolves its backing router for the
    /// fee quote.
    async fn build_eth(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let src = ctx.client.network.name;
        let wrapper = router_eth(src).ok_or(AdapterError::NoRoute {
            network: src.to_string(),
            token: TokenSymbol::Eth.to_string(),
        })?;
        let dst_chain_id = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_id
            .ok_or_else(|| AdapterError::QuoteFailed(format!(
                "{} has no L0 id",
                ctx.leg.dst_network
            )))?;

        let backing: Address = view(
            ctx.client,
            &abi::STARGATE_ROUTER_ETH,
            wrapper,
            "stargateRouter",
            (),
        )
        .await?;

        let to_bytes = Bytes::from(ctx.client.address().as_bytes().to_vec());
        let lz_params = Token::Tuple(vec![
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Bytes(vec![]),
        ]);
        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::STARGATE_ROUTER,
            backing,
            "quoteLayerZeroFee",
            (
                Token::Uint(U256::from(dst_chain_id)),
                Token::Uint(U256::from(1u8)),
                Token::Bytes(to_bytes.to_vec()),
                Token::Bytes(vec![]),
                lz_params,
            ),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let data = abi::STARGATE_ROUTER_ETH
            .encode(
                "swapETH",
                (
                    dst_chain_id,
                    ctx.client.address(),
                    to_bytes,
                    proposal.amount_from.wei(),
                    proposal.min_amount_to.wei(),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(wrapper, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }

    /// USDV `send`, and the recolor variant when the source token is not
    /// already USDV.
    async fn build_usdv(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let src = ctx.client.network.name;
        let oft = ctx
            .tokens
            .get(src, TokenSymbol::Usdv)
            .map_err(AdapterError::Contract)?
            .address;
        let dst_eid = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_eid
            .ok_or_else(|| AdapterError::QuoteFailed(format!(
                "{} has no v2 endpoint id",
                ctx.leg.dst_network
            )))?;

        let param = Token::Tuple(vec![
            Token::Uint(U256::from(dst_eid)),
            Token::FixedBytes(address_to_bytes32(ctx.client.address()).to_vec()),
            Token::Uint(proposal.amount_from.wei()),
            Token::Uint(proposal.min_amount_to.wei()),
            Token::Uint(U256::zero()),
        ]);

        let (native_fee, _lz): (U256, U256) = view(
            ctx.client,
            &abi::USDV,
            oft,
            "quoteSendFee",
            (
                param.clone(),
                Token::Bytes(vec![]),
                Token::Bool(false),
                Token::Bytes(vec![]),
            ),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let fee = Token::Tuple(vec![Token::Uint(native_fee), Token::Uint(U256::zero())]);
        let refund = Token::Address(ctx.client.address());

        let data = if proposal.from_token.title == TokenSymbol::Usdv {
            abi::USDV
                .encode("send", (param, fee, refund))
                .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?
        } else {
            let swap_param = Token::Tuple(vec![
                Token::Address(proposal.from_token.address),
                Token::Uint(proposal.amount_from.wei()),
                Token::Uint(U256::zero()),
            ]);
            abi::USDV
                .encode(
                    "swapRecolorSend",
                    (swap_param, Token::Uint(U256::zero()), param, fee, refund),
                )
                .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?
        };

        Ok(TxPlan {
            tx: ctx.client.new_tx(oft, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }

    /// STG utility token over its own `sendTokens`.
    async fn build_stg(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let dst_chain_id = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_id
            .ok_or_else(|| AdapterError::QuoteFailed(format!(
                "{} has no L0 id",
                ctx.leg.dst_network
            )))?;
        let stg = proposal.from_token.address;
        let adapter_params = l0_adapter_params_v1(STG_SEND_GAS);

        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::STG_TOKEN,
            stg,
            "estimateSendTokensFee",
            (dst_chain_id, false, Token::Bytes(adapter_params.to_vec())),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let data = abi::STG_TOKEN
            .encode(
                "sendTokens",
                (
                    dst_chain_id,
                    Token::Bytes(ctx.client.address().as_bytes().to_vec()),
                    Token::Uint(proposal.amount_from.wei()),
                    Token::Address(Address::zero()),
                    Token::Bytes(adapter_params.to_vec()),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(stg, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }

    /// Default v1 pool swap.
    async fn build_v1(
        &self,
        proposal: &OperationProposal,
        ctx: &AdapterContext<'_>,
    ) -> Result<TxPlan, AdapterError> {
        let src = ctx.client.network.name;
        let router = v1_router(src).ok_or(AdapterError::NoRoute {
            network: src.to_string(),
            token: proposal.from_token.title.to_string(),
        })?;
        let dst_chain_id = ctx
            .networks
            .get(ctx.leg.dst_network)?
            .l0_id
            .ok_or_else(|| AdapterError::QuoteFailed(format!(
                "{} has no L0 id",
                ctx.leg.dst_network
            )))?;
        let src_pool =
            pool_id(src, proposal.from_token.title).ok_or(AdapterError::PoolIdMissing {
                from: src.to_string(),
                to: proposal.from_token.title.to_string(),
            })?;
        let dst_pool = pool_id(ctx.leg.dst_network, ctx.leg.dst_token).ok_or(
            AdapterError::PoolIdMissing {
                from: ctx.leg.dst_network.to_string(),
                to: ctx.leg.dst_token.to_string(),
            },
        )?;

        let to_bytes = Token::Bytes(ctx.client.address().as_bytes().to_vec());
        let lz_params = Token::Tuple(vec![
            Token::Uint(U256::zero()),
            Token::Uint(U256::zero()),
            Token::Bytes(vec![]),
        ]);

        let (native_fee, _zro): (U256, U256) = view(
            ctx.client,
            &abi::STARGATE_ROUTER,
            router,
            "quoteLayerZeroFee",
            (
                Token::Uint(U256::from(dst_chain_id)),
                Token::Uint(U256::from(1u8)),
                to_bytes.clone(),
                Token::Bytes(vec![]),
                lz_params.clone(),
            ),
        )
        .await
        .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        let data = abi::STARGATE_ROUTER
            .encode(
                "swap",
                (
                    Token::Uint(U256::from(dst_chain_id)),
                    Token::Uint(U256::from(src_pool)),
                    Token::Uint(U256::from(dst_pool)),
                    Token::Address(ctx.client.address()),
                    Token::Uint(proposal.amount_from.wei()),
                    Token::Uint(proposal.min_amount_to.wei()),
                    lz_params,
                    to_bytes,
                    Token::Bytes(vec![]),
                ),
            )
            .map_err(|e| AdapterError::QuoteFailed(e.to_string()))?;

        Ok(TxPlan {
            tx: ctx.client.new_tx(router, data, U256::zero()),
            native_fee: buffer_fee(native_fee, FEE_BUFFER_PERCENT),
            dst_fee: None,
        })
    }
}

#[async_trait]
impl Adapter for Stargate {
    fn name(&self) -> &'static str {
        "Stargate"
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
        if let Some(RouteVariant::Bridge(bt)) = ctx.leg.variant {
            return self.build_v2(proposal, ctx, bt).await;
        }
        if proposal.from_token.is_native {
            return self.build_eth(proposal, ctx).await;
        }
        if ctx.leg.dst_token == TokenSymbol::Usdv {
            return self.build_usdv(proposal, ctx).await;
        }
        if proposal.from_token.title == TokenSymbol::Stg {
            return self.build_stg(proposal, ctx).await;
        }
        self.build_v1(proposal, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokens::TokenRegistry;

    #[test]
    fn route_table_closes_over_registry() {
        let tokens = TokenRegistry::bootstrap();
        Stargate::new().route_table().verify_closure(&tokens).unwrap();
    }

    #[test]
    fn adapter_params_pack_version_and_gas() {
        let blob = l0_adapter_params_v1(85_000);
        assert_eq!(blob.len(), 34);
        assert_eq!(&blob[..2], &[0x00, 0x01]);
        assert_eq!(
            U256::from_big_endian(&blob[2..]),
            U256::from(85_000u64)
        );
    }

    #[test]
    fn pool_ids_cover_route_table_tokens() {
        assert_eq!(pool_id(NetworkName::Polygon, TokenSymbol::Usdc), Some(1));
        assert_eq!(pool_id(NetworkName::Polygon, TokenSymbol::Usdt), Some(2));
        assert_eq!(pool_id(NetworkName::Arbitrum, TokenSymbol::Eth), Some(13));
        assert_eq!(pool_id(NetworkName::Core, TokenSymbol::Wbtc), None);
    }

    #[test]
    fn v2_pool_known_for_spec_route() {
        let pool = v2_pool(NetworkName::Polygon, TokenSymbol::Usdc).unwrap();
        assert_eq!(
            format!("{pool:?}").to_lowercase(),
            "0x9aa02d4fae7f58b8e8f34c66e756cc734dac7fe4"
        );
    }
}
