//! # Token Registry
//!
//! Named handles to deployed tokens, keyed by (network, symbol). The registry
//! is assembled once at startup; `decimals` on a handle is lazily filled on
//! first use and memoized first-write-wins (safe, since a token's decimals
//! are a network-immutable fact).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::Address;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::errors::ContractError;
use crate::networks::NetworkName;

/// Sentinel address shared by every EVM native-token handle.
pub const NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";

/// Token symbols known to the engine. `UsdcE` is the bridged USDC flavour
/// (`USDC.e`); `GethLz` is the LayerZero testnet-bridge OFT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenSymbol {
    Eth,
    Weth,
    Usdt,
    Usdc,
    UsdcE,
    Usdv,
    Stg,
    Wbtc,
    Busd,
    GethLz,
    Core,
    Bnb,
    Avax,
    Pol,
    Ftm,
    Mav,
    Mute,
    Space,
}

impl TokenSymbol {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TokenSymbol::Eth => "ETH",
            TokenSymbol::Weth => "WETH",
            TokenSymbol::Usdt => "USDT",
            TokenSymbol::Usdc => "USDC",
            TokenSymbol::UsdcE => "USDC_E",
            TokenSymbol::Usdv => "USDV",
            TokenSymbol::Stg => "STG",
            TokenSymbol::Wbtc => "WBTC",
            TokenSymbol::Busd => "BUSD",
            TokenSymbol::GethLz => "GETH_LZ",
            TokenSymbol::Core => "CORE",
            TokenSymbol::Bnb => "BNB",
            TokenSymbol::Avax => "AVAX",
            TokenSymbol::Pol => "POL",
            TokenSymbol::Ftm => "FTM",
            TokenSymbol::Mav => "MAV",
            TokenSymbol::Mute => "MUTE",
            TokenSymbol::Space => "SPACE",
        }
    }

    /// Symbol used against the Binance spot ticker; wrapped prefix stripped.
    pub fn ticker(&self) -> &'static str {
        match self {
            TokenSymbol::Weth => "ETH",
            TokenSymbol::Wbtc => "BTC",
            TokenSymbol::Pol => "POL",
            other => other.as_str(),
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            TokenSymbol::Usdt | TokenSymbol::Usdc | TokenSymbol::UsdcE | TokenSymbol::Usdv
        )
    }
}

impl fmt::Display for TokenSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named handle to one deployed token on one network.
#[derive(Debug)]
pub struct TokenContract {
    pub title: TokenSymbol,
    pub address: Address,
    pub is_native: bool,
    decimals: OnceCell<u8>,
}

impl TokenContract {
    fn erc20(title: TokenSymbol, address: &str) -> Self {
        Self {
            title,
            address: Address::from_str(address).expect("static token address"),
            is_native: false,
            decimals: OnceCell::new(),
        }
    }

    fn erc20_with_decimals(title: TokenSymbol, address: &str, decimals: u8) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(decimals);
        Self {
            title,
            address: Address::from_str(address).expect("static token address"),
            is_native: false,
            decimals: cell,
        }
    }

    fn native(title: TokenSymbol) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(18);
        Self {
            title,
            address: Address::from_str(NATIVE_SENTINEL).expect("native sentinel"),
            is_native: true,
            decimals: cell,
        }
    }

    /// Cached decimals, if already observed.
    pub fn cached_decimals(&self) -> Option<u8> {
        self.decimals.get().copied()
    }

    /// Memoizes decimals on first observation; later writes are ignored.
    pub fn memoize_decimals(&self, decimals: u8) -> u8 {
        *self.decimals.get_or_init(|| decimals)
    }
}

/// Registry of every token handle, keyed by (network, symbol).
#[derive(Debug)]
pub struct TokenRegistry {
    tokens: HashMap<(NetworkName, TokenSymbol), Arc<TokenContract>>,
}

impl TokenRegistry {
    pub fn bootstrap() -> Self {
        use NetworkName::*;
        use TokenSymbol::*;

        let mut tokens: HashMap<(NetworkName, TokenSymbol), Arc<TokenContract>> = HashMap::new();
        let mut add = |net: NetworkName, t: TokenContract| {
            tokens.insert((net, t.title), Arc::new(t));
        };

        // Natives. One sentinel handle per network coin.
        for net in [Ethereum, Arbitrum, Optimism, Base, ZkSyncEra, Sepolia] {
            add(net, TokenContract::native(Eth));
        }
        add(Polygon, TokenContract::native(Pol));
        add(Bsc, TokenContract::native(Bnb));
        add(Avalanche, TokenContract::native(Avax));
        add(Fantom, TokenContract::native(Ftm));
        add(NetworkName::Core, TokenContract::native(TokenSymbol::Core));

        // Ethereum
        add(Ethereum, TokenContract::erc20_with_decimals(Usdt, "0xdAC17F958D2ee523a2206206994597C13D831ec7", 6));
        add(Ethereum, TokenContract::erc20_with_decimals(Usdc, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6));
        add(Ethereum, TokenContract::erc20_with_decimals(Weth, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18));
        add(Ethereum, TokenContract::erc20_with_decimals(Stg, "0xAf5191B0De278C7286d6C7CC6ab6BB8A73bA2Cd6", 18));
        add(Ethereum, TokenContract::erc20_with_decimals(Usdv, "0x0E573Ce2736Dd9637A0b21058352e1667925C7a8", 6));

        // Arbitrum
        add(Arbitrum, TokenContract::erc20_with_decimals(Usdt, "0xFd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9", 6));
        add(Arbitrum, TokenContract::erc20_with_decimals(UsdcE, "0xFF970A61A04b1cA14834A43f5dE4533eBDDB5CC8", 6));
        add(Arbitrum, TokenContract::erc20_with_decimals(Usdc, "0xaf88d065e77c8cC2239327C5EDb3A432268e5831", 6));
        add(Arbitrum, TokenContract::erc20_with_decimals(Weth, "0x82aF49447D8a07e3bd95BD0d56f35241523fBab1", 18));
        add(Arbitrum, TokenContract::erc20_with_decimals(Stg, "0x6694340fc020c5E6B96567843da2df01b2CE1eb6", 18));
        add(Arbitrum, TokenContract::erc20_with_decimals(Usdv, "0x323665443CEf804A3b5206103304BD4872EA4253", 6));

        // Optimism
        add(Optimism, TokenContract::erc20_with_decimals(UsdcE, "0x7F5c764cBc14f9669B88837ca1490cCa17c31607", 6));
        add(Optimism, TokenContract::erc20_with_decimals(Usdt, "0x94b008aA00579c1307B0EF2c499aD98a8ce58e58", 6));
        add(Optimism, TokenContract::erc20_with_decimals(Usdc, "0x0b2C639c533813f4Aa9D7837CAf62653d097Ff85", 6));
        add(Optimism, TokenContract::erc20_with_decimals(Weth, "0x4200000000000000000000000000000000000006", 18));

        // Polygon
        add(Polygon, TokenContract::erc20_with_decimals(Usdt, "0xc2132D05D31c914a87C6611C10748AEb04B58e8F", 6));
        add(Polygon, TokenContract::erc20_with_decimals(UsdcE, "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", 6));
        add(Polygon, TokenContract::erc20_with_decimals(Usdc, "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359", 6));
        add(Polygon, TokenContract::erc20_with_decimals(Weth, "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619", 18));
        add(Polygon, TokenContract::erc20_with_decimals(Stg, "0x2F6F07CDcf3588944Bf4C42aC74ff24bF56e7590", 18));

        // BSC
        add(Bsc, TokenContract::erc20_with_decimals(Usdt, "0x55d398326f99059fF775485246999027B3197955", 18));
        add(Bsc, TokenContract::erc20_with_decimals(Busd, "0xe9e7CEA3DedcA5984780Bafc599bD69ADd087D56", 18));
        add(Bsc, TokenContract::erc20_with_decimals(Stg, "0xB0D502E938ed5f4df2E681fE6E419ff29631d62b", 18));

        // Avalanche
        add(Avalanche, TokenContract::erc20_with_decimals(Usdt, "0x9702230A8Ea53601f5cD2dc00fDBc13d4dF4A8c7", 6));
        add(Avalanche, TokenContract::erc20_with_decimals(Usdc, "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E", 6));
        add(Avalanche, TokenContract::erc20_with_decimals(Stg, "0x2F6F07CDcf3588944Bf4C42aC74ff24bF56e7590", 18));

        // Fantom
        add(Fantom, TokenContract::erc20_with_decimals(Usdc, "0x04068DA6C83AFCFA0e13ba15A6696662335D5B75", 6));

        // Base
        add(Base, TokenContract::erc20_with_decimals(Weth, "0x4200000000000000000000000000000000000006", 18));
        add(Base, TokenContract::erc20_with_decimals(Usdc, "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913", 6));

        // zkSync Era
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Weth, "0x5AEa5775959fBC2557Cc8789bC1bf90A239D9a91", 18));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Usdc, "0x3355df6D4c9C3035724Fd0e3914dE96A5a83aaf4", 6));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Usdt, "0x493257fD37EDB34451f62EDf8D2a0C418852bA4C", 6));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Wbtc, "0xBBeB516fb02a01611cBBE0453Fe3c580D7281011", 8));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Mute, "0x0e97C7a0F8B2C9885C8ac9fC6136e829CbC21d42", 18));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Mav, "0x787c09494Ec8Bcb24DcAf8659E7d5D69979eE508", 18));
        add(ZkSyncEra, TokenContract::erc20_with_decimals(Space, "0x47260090cE5e83454d5f05A0AbbB2C953835f777", 18));

        // Core
        add(NetworkName::Core, TokenContract::erc20_with_decimals(Usdt, "0x900101d06A7426441Ae63e9AB3B9b0F63Be145F1", 6));
        add(NetworkName::Core, TokenContract::erc20_with_decimals(Usdc, "0xa4151B2B3e269645181dCcF2D426cE75fcbDeca9", 6));

        // Sepolia (testnet-bridge source side)
        add(Sepolia, TokenContract::erc20(GethLz, "0xdD69DB25F6D620A7baD3023c5d32761D353D3De9"));

        Self { tokens }
    }

    pub fn get(
        &self,
        network: NetworkName,
        symbol: TokenSymbol,
    ) -> Result<Arc<TokenContract>, ContractError> {
        self.tokens
            .get(&(network, symbol))
            .cloned()
            .ok_or_else(|| {
                ContractError::Abi(format!("token {symbol} not registered on {network}"))
            })
    }

    pub fn contains(&self, network: NetworkName, symbol: TokenSymbol) -> bool {
        self.tokens.contains_key(&(network, symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_handles_share_the_sentinel() {
        let registry = TokenRegistry::bootstrap();
        let eth = registry.get(NetworkName::Ethereum, TokenSymbol::Eth).unwrap();
        let pol = registry.get(NetworkName::Polygon, TokenSymbol::Pol).unwrap();
        assert!(eth.is_native);
        assert_eq!(eth.address, pol.address);
        assert_eq!(
            format!("{:?}", eth.address).to_lowercase(),
            NATIVE_SENTINEL.to_lowercase()
        );
    }

    #[test]
    fn decimals_memoization_is_first_write_wins() {
        let token = TokenContract::erc20(TokenSymbol::Usdc, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
        assert_eq!(token.cached_decimals(), None);
        assert_eq!(token.memoize_decimals(6), 6);
        assert_eq!(token.memoize_decimals(18), 6);
        assert_eq!(token.cached_decimals(), Some(6));
    }

    #[test]
    fn wrapped_prefix_is_stripped_for_tickers() {
        assert_eq!(TokenSymbol::Weth.ticker(), "ETH");
        assert_eq!(TokenSymbol::Wbtc.ticker(), "BTC");
        assert_eq!(TokenSymbol::Stg.ticker(), "STG");
    }
}
