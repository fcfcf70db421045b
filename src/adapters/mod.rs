//! # Protocol Adapters
//!
//! One module per protocol integration. Each adapter owns its static route
//! table and knows how to encode its router's calldata; the operation engine
//! treats them all through the `Adapter` trait.

pub mod coredao;
pub mod maverick;
pub mod mute;
pub mod spacefi;
pub mod stargate;
pub mod syncswap;
pub mod testnet_bridge;
pub mod zkera;

use std::time::{SystemTime, UNIX_EPOCH};

use ethers::abi::{Detokenize, Tokenize};
use ethers::contract::BaseContract;
use ethers::types::{Address, U256};

use crate::client::ChainClient;
use crate::errors::ContractError;

/// AMM deadline: always now + 20 minutes.
pub fn swap_deadline() -> U256 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    U256::from(now + 20 * 60)
}

/// One eth_call against `address` through `abi`, decoded into `R`.
pub async fn view<T, R>(
    client: &ChainClient,
    abi: &BaseContract,
    address: Address,
    method: &str,
    args: T,
) -> Result<R, ContractError>
where
    T: Tokenize,
    R: Detokenize,
{
    let data = abi
        .encode(method, args)
        .map_err(|e| ContractError::Abi(e.to_string()))?;
    let tx = client.new_tx(address, data, U256::zero());
    let out = client.call(&tx).await.map_err(|e| ContractError::CallFailed {
        address,
        method: method.to_string(),
        reason: e.to_string(),
    })?;
    abi.decode_output(method, out)
        .map_err(|e| ContractError::Abi(e.to_string()))
}

/// Scales a quoted fee by a percent buffer, rounding up.
pub fn buffer_fee(fee: U256, percent: u64) -> U256 {
    let scaled = fee * U256::from(100 + percent);
    (scaled + U256::from(99u64)) / U256::from(100u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_twenty_minutes_out() {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let deadline = swap_deadline().as_u64();
        assert!(deadline >= now + 1199 && deadline <= now + 1201);
    }

    #[test]
    fn fee_buffer_rounds_up() {
        // ceil(100 * 1.03) = 103, ceil(101 * 1.03) = 105 (104.03 -> 105)
        assert_eq!(buffer_fee(U256::from(100u64), 3), U256::from(103u64));
        assert_eq!(buffer_fee(U256::from(101u64), 3), U256::from(105u64));
        // 6% Stargate buffer
        assert_eq!(buffer_fee(U256::from(1000u64), 6), U256::from(1060u64));
    }
}
