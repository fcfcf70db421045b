//! # ABI Store
//!
//! Embedded human-readable ABIs for every protocol surface the adapters
//! touch, plus a memoized loader for JSON ABI files under `data/abis/`.
//! Parsed contracts are cached process-wide; parsing the same ABI twice is
//! never observable.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use ethers::abi::Abi;
use ethers::contract::BaseContract;
use once_cell::sync::Lazy;

use crate::errors::ContractError;

fn parse(human: &[&str]) -> BaseContract {
    BaseContract::from(
        ethers::abi::parse_abi(human).expect("embedded ABI must parse"),
    )
}

/// Minimal ERC-20 surface; the fallback for any token handle without an
/// explicit ABI.
pub static ERC20: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function balanceOf(address owner) view returns (uint256)",
        "function decimals() view returns (uint8)",
        "function symbol() view returns (string)",
        "function allowance(address owner, address spender) view returns (uint256)",
        "function approve(address spender, uint256 amount) returns (bool)",
        "function transfer(address to, uint256 amount) returns (bool)",
    ])
});

/// Stargate v1 router.
pub static STARGATE_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swap(uint16 dstChainId, uint256 srcPoolId, uint256 dstPoolId, address refundAddress, uint256 amountLD, uint256 minAmountLD, (uint256,uint256,bytes) lzTxParams, bytes to, bytes payload) payable",
        "function quoteLayerZeroFee(uint16 dstChainId, uint8 functionType, bytes toAddress, bytes transferAndCallPayload, (uint256,uint256,bytes) lzTxParams) view returns (uint256, uint256)",
    ])
});

/// Stargate v1 RouterETH wrapper around the backing router.
pub static STARGATE_ROUTER_ETH: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swapETH(uint16 dstChainId, address refundAddress, bytes toAddress, uint256 amountLD, uint256 minAmountLD) payable",
        "function stargateRouter() view returns (address)",
    ])
});

/// Stargate v2 OFT-style endpoint (`send` + `quoteSend`).
pub static STARGATE_V2: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function send((uint32,bytes32,uint256,uint256,bytes,bytes,bytes) sendParam, (uint256,uint256) fee, address refundAddress) payable returns (uint8, bytes32, uint64)",
        "function quoteSend((uint32,bytes32,uint256,uint256,bytes,bytes,bytes) sendParam, bool payInLzToken) view returns (uint256, uint256)",
    ])
});

/// USDV OFT: plain recolor-free send plus the inline-swap variant.
pub static USDV: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function send((uint32,bytes32,uint256,uint256,uint64) param, (uint256,uint256) fee, address refundAddress) payable",
        "function swapRecolorSend((address,uint256,uint64) swapParam, uint32 surplusColor, (uint32,bytes32,uint256,uint256,uint64) param, (uint256,uint256) fee, address refundAddress) payable",
        "function quoteSendFee((uint32,bytes32,uint256,uint256,uint64) param, bytes extraOptions, bool payInLzToken, bytes composeMsg) view returns (uint256, uint256)",
    ])
});

/// STG utility token with its own L0 send.
pub static STG_TOKEN: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function sendTokens(uint16 dstChainId, bytes to, uint256 qty, address zroPaymentAddress, bytes adapterParam) payable",
        "function estimateSendTokensFee(uint16 dstChainId, bool useZro, bytes txParameters) view returns (uint256, uint256)",
    ])
});

/// CoreDAO bridge, source-chain flavour (into Core).
pub static CORE_BRIDGE_TO: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function bridge(address token, uint256 amountLd, address to, (address,address) callParams, bytes adapterParams) payable",
        "function estimateBridgeFee(bool useZro, bytes adapterParams) view returns (uint256, uint256)",
    ])
});

/// CoreDAO bridge, Core-side flavour (out of Core).
pub static CORE_BRIDGE_FROM: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function bridge(address localToken, uint16 remoteChainId, uint256 amount, address to, bool unwrapWeth, (address,address) callParams, bytes adapterParams) payable",
        "function estimateBridgeFee(uint16 remoteChainId, bool useZro, bytes adapterParams) view returns (uint256, uint256)",
    ])
});

/// TestnetBridge router and the OFT it wraps.
pub static TESTNET_BRIDGE: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swapAndBridge(uint256 amountIn, uint256 amountOutMin, uint16 dstChainId, address to, address refundAddress, address zroPaymentAddress, bytes adapterParams) payable",
        "function oft() view returns (address)",
    ])
});

pub static OFT: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function estimateSendFee(uint16 dstChainId, bytes toAddress, uint256 amount, bool useZro, bytes adapterParams) view returns (uint256, uint256)",
    ])
});

/// Classic UniswapV2-shaped router (SpaceFi).
pub static V2_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline) payable returns (uint256[])",
        "function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[])",
        "function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline) returns (uint256[])",
    ])
});

/// Mute router: V2 shape with a parallel stable/volatile flag per hop.
pub static MUTE_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swapExactETHForTokens(uint256 amountOutMin, address[] path, address to, uint256 deadline, bool[] stable) payable returns (uint256[])",
        "function swapExactTokensForTokens(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline, bool[] stable) returns (uint256[])",
        "function swapExactTokensForETH(uint256 amountIn, uint256 amountOutMin, address[] path, address to, uint256 deadline, bool[] stable) returns (uint256[])",
    ])
});

/// Maverick concentrated-liquidity router.
pub static MAVERICK_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function exactInput((bytes,address,uint256,uint256,uint256) params) payable returns (uint256)",
        "function unwrapWETH9(uint256 amountMinimum, address recipient) payable",
        "function refundETH() payable",
    ])
});

/// SyncSwap router with its path-of-steps format.
pub static SYNCSWAP_ROUTER: Lazy<BaseContract> = Lazy::new(|| {
    parse(&[
        "function swap(((address,bytes,address,bytes)[],address,uint256)[] paths, uint256 amountOutMin, uint256 deadline) payable returns (uint256)",
    ])
});

static FILE_CACHE: Lazy<Mutex<HashMap<String, Abi>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Loads a JSON ABI from `data/abis/...`, memoized by path.
pub fn abi_from_file(path: &Path) -> Result<Abi, ContractError> {
    let key = path.to_string_lossy().into_owned();
    if let Some(abi) = FILE_CACHE.lock().expect("abi cache lock").get(&key) {
        return Ok(abi.clone());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|_| ContractError::AbiFileNotFound(key.clone()))?;
    let abi: Abi =
        serde_json::from_str(&raw).map_err(|e| ContractError::Abi(e.to_string()))?;
    FILE_CACHE
        .lock()
        .expect("abi cache lock")
        .insert(key, abi.clone());
    Ok(abi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::Token;
    use ethers::types::{Address, U256};

    #[test]
    fn embedded_abis_parse_and_encode() {
        let spender = Address::zero();
        let data = ERC20
            .encode("approve", (spender, U256::max_value()))
            .expect("approve encodes");
        assert_eq!(&data[..4], &hex::decode("095ea7b3").unwrap()[..]);
    }

    #[test]
    fn v2_router_selector_matches_known_prefix() {
        let data = V2_ROUTER
            .encode(
                "swapExactETHForTokens",
                (
                    U256::from(1u64),
                    vec![Address::zero(), Address::zero()],
                    Address::zero(),
                    U256::from(1u64),
                ),
            )
            .expect("swap encodes");
        // swapExactETHForTokens(uint256,address[],address,uint256)
        assert_eq!(&data[..4], &hex::decode("7ff36ab5").unwrap()[..]);
    }

    #[test]
    fn tuple_heavy_abis_parse() {
        let _ = Lazy::force(&STARGATE_V2);
        let _ = Lazy::force(&SYNCSWAP_ROUTER);
        let _ = Lazy::force(&MAVERICK_ROUTER);
        let _ = Lazy::force(&USDV);
        let _ = Lazy::force(&CORE_BRIDGE_FROM);
        let _ = Lazy::force(&STG_TOKEN);

        let token = Token::Tuple(vec![
            Token::Uint(U256::from(30110u64)),
            Token::FixedBytes(vec![0u8; 32]),
            Token::Uint(U256::from(1u64)),
            Token::Uint(U256::from(1u64)),
            Token::Bytes(vec![]),
            Token::Bytes(vec![]),
            Token::Bytes(vec![]),
        ]);
        let fee = Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::zero())]);
        STARGATE_V2
            .encode("send", (token, fee, Token::Address(Address::zero())))
            .expect("v2 send encodes");
    }
}
