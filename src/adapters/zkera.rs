//! # zkSync-Era AMM Support
//!
//! Shared plumbing for the four Era AMM adapters (SpaceFi, Mute, Maverick,
//! SyncSwap): the hand-curated per-pair payload-details table and its lookup
//! error. All four adapters are same-network swaps priced off the feed, not
//! an on-chain quote.

use std::collections::HashMap;

use ethers::types::Address;

use crate::errors::AdapterError;
use crate::tokens::TokenSymbol;

/// WETH on zkSync Era; the first/last hop of every native path.
pub fn weth() -> Address {
    "0x5AEa5775959fBC2557Cc8789bC1bf90A239D9a91"
        .parse()
        .expect("static WETH address")
}

/// Everything needed to encode one curated swap pair.
#[derive(Debug, Clone)]
pub struct TxPayloadDetails {
    /// Router method name.
    pub method: &'static str,
    /// Ordered token path.
    pub path: Vec<Address>,
    /// Mute: stable/volatile flag per hop.
    pub bool_list: Option<Vec<bool>>,
    /// Maverick: pool addresses interleaved between path tokens.
    pub pools: Vec<Address>,
}

impl TxPayloadDetails {
    pub fn new(method: &'static str, path: Vec<Address>) -> Self {
        Self {
            method,
            path,
            bool_list: None,
            pools: Vec::new(),
        }
    }

    pub fn with_bools(mut self, bools: Vec<bool>) -> Self {
        self.bool_list = Some(bools);
        self
    }

    pub fn with_pools(mut self, pools: Vec<Address>) -> Self {
        self.pools = pools;
        self
    }
}

/// Curated (from, to) → payload table.
#[derive(Debug, Default)]
pub struct PathTable {
    entries: HashMap<(TokenSymbol, TokenSymbol), TxPayloadDetails>,
}

impl PathTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        mut self,
        from: TokenSymbol,
        to: TokenSymbol,
        details: TxPayloadDetails,
    ) -> Self {
        self.entries.insert((from, to), details);
        self
    }

    pub fn get(
        &self,
        from: TokenSymbol,
        to: TokenSymbol,
    ) -> Result<&TxPayloadDetails, AdapterError> {
        self.entries
            .get(&(from, to))
            .ok_or(AdapterError::TxPayloadDetailsNotAdded {
                from: from.to_string(),
                to: to.to_string(),
            })
    }

    pub fn pairs(&self) -> impl Iterator<Item = &(TokenSymbol, TokenSymbol)> {
        self.entries.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pair_is_a_configuration_gap() {
        let table = PathTable::new();
        let err = table.get(TokenSymbol::Eth, TokenSymbol::Usdc).unwrap_err();
        assert!(matches!(err, AdapterError::TxPayloadDetailsNotAdded { .. }));
    }

    #[test]
    fn lookup_returns_curated_details() {
        let table = PathTable::new().insert(
            TokenSymbol::Eth,
            TokenSymbol::Usdc,
            TxPayloadDetails::new("swapExactETHForTokens", vec![weth()]),
        );
        let details = table.get(TokenSymbol::Eth, TokenSymbol::Usdc).unwrap();
        assert_eq!(details.method, "swapExactETHForTokens");
        assert_eq!(details.path, vec![weth()]);
    }
}
