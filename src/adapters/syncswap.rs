//! # SyncSwap
//!
//! Era AMM with a path-of-steps calldata format: each step names a pool and
//! an opaque data blob of `(tokenIn ‖ recipient ‖ withdrawMode)`. Withdraw
//! mode 2 unwraps to ETH on the way out, 1 keeps the ERC-20. Native input is
//! signalled with the zero address at path level.

use async_trait::async_trait;
use ethers::abi::Token;
use ethers::types::{Address, U256};

use crate::abi;
use crate::adapter::{Adapter, AdapterContext, RouteLeg, RouteTable, TxPlan};
use crate::adapters::swap_deadline;
use crate::adapters::zkera::weth;
use crate::errors::AdapterError;
use crate::networks::NetworkName;
use crate::proposal::{OperationInfo, OperationProposal};
use crate::tokens::TokenSymbol;

fn addr(s: &str) -> Address {
    s.parse().expect("static adapter address")
}

fn router() -> Address {
    addr("0x2da10A1e27bF85cEdD8FFb1AbBe97e53391C0295")
}

fn usdc() -> Address {
    addr("0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4")
}

fn weth_usdc_pool() -> Address {
    addr("0x80115c708E12eDd42E504c1cD52Aea96C547c05c")
}

/// ETH-out unwraps; everything else stays wrapped.
fn withdraw_mode(to_native: bool) -> u8 {
    if to_native {
        2
    } else {
        1
    }
}

/// `(tokenIn, recipient, withdrawMode)` ABI-encoded step blob.
fn step_data(token_in: Address, recipient: Address, mode: u8) -> Vec<u8> {
    ethers::abi::encode(&[
        Token::Address(token_in),
        Token::Address(recipient),
        Token::Uint(U256::from(mode)),
    ])
}

pub struct SyncSwap {
    routes: RouteTable,
}

impl Default for SyncSwap {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncSwap {
    pub fn new() -> Self {
        use NetworkName::ZkSyncEra;
        use TokenSymbol::*;

        let routes = RouteTable::new()
            .insert(ZkSyncEra, Eth, vec![RouteLeg::new(ZkSyncEra, Usdc)])
            .insert(ZkSyncEra, Usdc, vec![RouteLeg::new(ZkSyncEra, Eth)]);

        Self { routes }
    }

    fn pool_and_hop_token(
        &self,
        from: TokenSymbol,
        to: TokenSymbol,
    ) -> Result<(Address, Address), AdapterError> {
        match (from, to) {
            (TokenSymbol::Eth, TokenSymbol::Usdc) => Ok((weth_usdc_pool(), weth())),
            (TokenSymbol::Usdc, TokenSymbol::Eth) => Ok((weth_usdc_pool(), usdc())),
            _ => Err(AdapterError::TxPayloadDetailsNotAdded {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Adapter for SyncSwap {
    fn name(&self) -> &'static str {
        "SyncSwap"
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
        let (pool, hop_token) =
            self.pool_and_hop_token(proposal.from_token.title, ctx.leg.dst_token)?;
        let to_native = ctx.leg.dst_token == TokenSymbol::Eth;
        let mode = withdraw_mode(to_native);

        let step = Token::Tuple(vec![
            Token::Address(pool),
            Token::Bytes(step_data(hop_token, ctx.client.address(), mode)),
            Token::Address(Address::zero()),
            Token::Bytes(vec![]),
        ]);
        // Native in is signalled with the zero address at path level.
        let token_in = if proposal.from_token.is_native {
            Address::zero()
        } else {
            proposal.from_token.address
        };
        let path = Token::Tuple(vec![
            Token::Array(vec![step]),
            Token::Address(token_in),
            Token::Uint(proposal.amount_from.wei()),
        ]);

        let data = abi::SYNCSWAP_ROUTER
            .encode(
                "swap",
                (
                    Token::Array(vec![path]),
                    Token::Uint(proposal.min_amount_to.wei()),
                    Token::Uint(swap_deadline()),
                ),
            )
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
        SyncSwap::new().route_table().verify_closure(&tokens).unwrap();
    }

    #[test]
    fn withdraw_mode_distinguishes_native_out() {
        assert_eq!(withdraw_mode(true), 2);
        assert_eq!(withdraw_mode(false), 1);
    }

    #[test]
    fn step_data_packs_three_words() {
        let blob = step_data(usdc(), Address::zero(), 1);
        assert_eq!(blob.len(), 96);
        assert_eq!(&blob[12..32], usdc().as_bytes());
        assert_eq!(blob[95], 1);
    }
}
