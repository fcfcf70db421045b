//! # Starknet AMMs
//!
//! JediSwap, MySwap and 10kSwap. All three execute as the same two-call
//! sequence `[approve(router), swap]` through a single `execute_v1` invoke,
//! so the adapter surface here is just "build the swap call for this pair".
//! MySwap routes by pool id instead of a token path.

use ethers::types::U256;
use ::starknet::accounts::Call;
use ::starknet::core::types::Felt;
use ::starknet::core::utils::get_selector_from_name;

use crate::adapters::swap_deadline;
use crate::errors::AdapterError;
use crate::starknet::{approve_call, split_u256, stark_token, StarkToken};
use crate::tokens::TokenSymbol;

fn felt(hex: &str) -> Felt {
    Felt::from_hex(hex).expect("static felt")
}

fn selector(name: &str) -> Felt {
    get_selector_from_name(name).expect("static selector")
}

/// Everything needed to assemble one swap invoke.
pub struct StarkSwapRequest {
    pub from: StarkToken,
    pub to: StarkToken,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub recipient: Felt,
}

pub trait StarknetAmm: Send + Sync {
    fn name(&self) -> &'static str;

    fn router(&self) -> Felt;

    /// Directed pairs this AMM trades.
    fn pairs(&self) -> Vec<(TokenSymbol, TokenSymbol)>;

    fn swap_call(&self, request: &StarkSwapRequest) -> Result<Call, AdapterError>;

    /// The full `[approve, swap]` sequence.
    fn calls(&self, request: &StarkSwapRequest) -> Result<Vec<Call>, AdapterError> {
        if request.amount_in.is_zero() {
            return Err(AdapterError::ZeroAmount);
        }
        let approve = approve_call(&request.from, self.router(), request.amount_in);
        let swap = self.swap_call(request)?;
        Ok(vec![approve, swap])
    }

    fn supports(&self, from: TokenSymbol, to: TokenSymbol) -> bool {
        self.pairs().contains(&(from, to))
    }
}

pub fn request_for(
    from: TokenSymbol,
    to: TokenSymbol,
    amount_in: U256,
    min_amount_out: U256,
    recipient: Felt,
) -> Result<StarkSwapRequest, AdapterError> {
    let resolve = |symbol: TokenSymbol| {
        stark_token(symbol).ok_or_else(|| AdapterError::TxPayloadDetailsNotAdded {
            from: from.to_string(),
            to: to.to_string(),
        })
    };
    Ok(StarkSwapRequest {
        from: resolve(from)?,
        to: resolve(to)?,
        amount_in,
        min_amount_out,
        recipient,
    })
}

pub struct JediSwap;

impl StarknetAmm for JediSwap {
    fn name(&self) -> &'static str {
        "JediSwap"
    }

    fn router(&self) -> Felt {
        felt("0x041fd22b238fa21cfcf5dd45a8548974d8263b3a531a60388411c5e230f97023")
    }

    fn pairs(&self) -> Vec<(TokenSymbol, TokenSymbol)> {
        use TokenSymbol::*;
        vec![(Eth, Usdc), (Usdc, Eth), (Eth, Usdt), (Usdt, Eth), (Usdc, Usdt), (Usdt, Usdc)]
    }

    fn swap_call(&self, request: &StarkSwapRequest) -> Result<Call, AdapterError> {
        let (amount_low, amount_high) = split_u256(request.amount_in);
        let (min_low, min_high) = split_u256(request.min_amount_out);
        let calldata = vec![
            amount_low,
            amount_high,
            min_low,
            min_high,
            Felt::TWO,
            request.from.address,
            request.to.address,
            request.recipient,
            Felt::from(swap_deadline().as_u64()),
        ];
        Ok(Call {
            to: self.router(),
            selector: selector("swap_exact_tokens_for_tokens"),
            calldata,
        })
    }
}

pub struct MySwap;

impl MySwap {
    /// MySwap addresses pools by id, not by path.
    fn pool_id(from: TokenSymbol, to: TokenSymbol) -> Result<u64, AdapterError> {
        use TokenSymbol::*;
        match (from, to) {
            (Eth, Usdc) | (Usdc, Eth) => Ok(1),
            (Eth, Usdt) | (Usdt, Eth) => Ok(4),
            (Usdc, Usdt) | (Usdt, Usdc) => Ok(5),
            _ => Err(AdapterError::PoolIdMissing {
                from: from.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

impl StarknetAmm for MySwap {
    fn name(&self) -> &'static str {
        "MySwap"
    }

    fn router(&self) -> Felt {
        felt("0x010884171baf1914edc28d7afb619b40a4051cfae78a094a55d230f19e944a28")
    }

    fn pairs(&self) -> Vec<(TokenSymbol, TokenSymbol)> {
        use TokenSymbol::*;
        vec![(Eth, Usdc), (Usdc, Eth), (Eth, Usdt), (Usdt, Eth), (Usdc, Usdt), (Usdt, Usdc)]
    }

    fn swap_call(&self, request: &StarkSwapRequest) -> Result<Call, AdapterError> {
        let pool_id = Self::pool_id(request.from.title, request.to.title)?;
        let (amount_low, amount_high) = split_u256(request.amount_in);
        let (min_low, min_high) = split_u256(request.min_amount_out);
        let calldata = vec![
            Felt::from(pool_id),
            request.from.address,
            amount_low,
            amount_high,
            min_low,
            min_high,
        ];
        Ok(Call {
            to: self.router(),
            selector: selector("swap"),
            calldata,
        })
    }
}

pub struct TenKSwap;

impl StarknetAmm for TenKSwap {
    fn name(&self) -> &'static str {
        "10kSwap"
    }

    fn router(&self) -> Felt {
        felt("0x07a6f98c03379b9513ca84cca1373ff452a7462a3b61598f0af5bb27ad7f76d1")
    }

    fn pairs(&self) -> Vec<(TokenSymbol, TokenSymbol)> {
        use TokenSymbol::*;
        vec![(Eth, Usdc), (Usdc, Eth), (Eth, Usdt), (Usdt, Eth)]
    }

    fn swap_call(&self, request: &StarkSwapRequest) -> Result<Call, AdapterError> {
        let (amount_low, amount_high) = split_u256(request.amount_in);
        let (min_low, min_high) = split_u256(request.min_amount_out);
        let calldata = vec![
            amount_low,
            amount_high,
            min_low,
            min_high,
            Felt::TWO,
            request.from.address,
            request.to.address,
            request.recipient,
            Felt::from(swap_deadline().as_u64()),
        ];
        Ok(Call {
            to: self.router(),
            selector: selector("swapExactTokensForTokens"),
            calldata,
        })
    }
}

/// The Starknet module roster keyed by config module name.
pub fn amm_by_module(module: &str) -> Option<Box<dyn StarknetAmm>> {
    match module {
        "jediswap" => Some(Box::new(JediSwap)),
        "myswap" => Some(Box::new(MySwap)),
        "10kswap" => Some(Box::new(TenKSwap)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth_usdc_request() -> StarkSwapRequest {
        request_for(
            TokenSymbol::Eth,
            TokenSymbol::Usdc,
            U256::from(10u64).pow(U256::from(16u64)),
            U256::from(29_000_000u64),
            Felt::from(0xabcu64),
        )
        .unwrap()
    }

    #[test]
    fn sequence_is_approve_then_swap() {
        let request = eth_usdc_request();
        for amm in [
            amm_by_module("jediswap").unwrap(),
            amm_by_module("myswap").unwrap(),
            amm_by_module("10kswap").unwrap(),
        ] {
            let calls = amm.calls(&request).unwrap();
            assert_eq!(calls.len(), 2, "{}", amm.name());
            assert_eq!(calls[0].to, request.from.address);
            assert_eq!(calls[0].calldata[0], amm.router());
            assert_eq!(calls[1].to, amm.router());
        }
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut request = eth_usdc_request();
        request.amount_in = U256::zero();
        assert!(matches!(
            JediSwap.calls(&request),
            Err(AdapterError::ZeroAmount)
        ));
    }

    #[test]
    fn myswap_requires_known_pool() {
        assert!(MySwap::pool_id(TokenSymbol::Eth, TokenSymbol::Usdc).is_ok());
        assert!(matches!(
            MySwap::pool_id(TokenSymbol::Eth, TokenSymbol::Wbtc),
            Err(AdapterError::PoolIdMissing { .. })
        ));
    }

    #[test]
    fn path_swaps_carry_two_token_path() {
        let request = eth_usdc_request();
        let call = JediSwap.swap_call(&request).unwrap();
        assert_eq!(call.calldata[4], Felt::TWO);
        assert_eq!(call.calldata[5], request.from.address);
        assert_eq!(call.calldata[6], request.to.address);
    }

    #[test]
    fn unknown_module_has_no_amm() {
        assert!(amm_by_module("stargate").is_none());
    }
}
