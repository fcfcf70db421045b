//! # Operation Proposals
//!
//! `OperationInfo` is the abstract request (symbols, networks, amount policy,
//! slippage, gas overrides); the builder resolves it against live balances
//! and prices into an immutable `OperationProposal` ready for an adapter to
//! encode. Amount selection and minimum-destination math are pure functions,
//! kept separate from the I/O orchestration.

use std::sync::Arc;

use ethers::types::U256;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::amount::TokenAmount;
use crate::client::ChainClient;
use crate::contracts::ContractFacade;
use crate::errors::AdapterError;
use crate::networks::{NetworkName, Networks};
use crate::price_oracle::PriceOracle;
use crate::tokens::{TokenContract, TokenRegistry, TokenSymbol};

/// How the source amount is chosen. Exactly one policy per operation;
/// priority when resolving is absolute > percent-of-balance > full balance.
#[derive(Debug, Clone)]
pub enum AmountPolicy {
    /// Exact amount in human units.
    Absolute(Decimal),
    /// Uniform sample from `[min, max)` human units, rounded to `round`
    /// decimal places.
    Range { min: f64, max: f64, round: u32 },
    /// Uniform sample from `[min%, max%]` of the source balance.
    PercentRange { min: f64, max: f64 },
    /// Spend everything.
    FullBalance,
}

/// An operation request, before any chain state is consulted.
#[derive(Debug, Clone)]
pub struct OperationInfo {
    pub from_symbol: TokenSymbol,
    pub to_symbol: TokenSymbol,
    /// Destination network; `None` means same as source.
    pub dst_network: Option<NetworkName>,
    /// Slippage tolerance in percent.
    pub slippage: f64,
    pub amount: AmountPolicy,
    /// Caller-supplied floor for the destination amount, bypassing the
    /// price-ratio computation.
    pub min_amount_to_wei: Option<U256>,
    pub gas_price: Option<TokenAmount>,
    pub gas_limit: Option<u64>,
    pub gas_multiplier: Option<f64>,
}

impl OperationInfo {
    pub fn new(from: TokenSymbol, to: TokenSymbol, amount: AmountPolicy) -> Self {
        Self {
            from_symbol: from,
            to_symbol: to,
            dst_network: None,
            slippage: 0.5,
            amount,
            min_amount_to_wei: None,
            gas_price: None,
            gas_limit: None,
            gas_multiplier: None,
        }
    }

    pub fn to_network(mut self, network: NetworkName) -> Self {
        self.dst_network = Some(network);
        self
    }

    pub fn with_slippage(mut self, slippage: f64) -> Self {
        self.slippage = slippage;
        self
    }
}

/// A fully-resolved operation request. Immutable once built.
#[derive(Debug, Clone)]
pub struct OperationProposal {
    pub from_token: Arc<TokenContract>,
    pub amount_from: TokenAmount,
    pub to_token: Arc<TokenContract>,
    pub min_amount_to: TokenAmount,
}

/// Picks the source amount in wei for `policy` against `balance`, clamped to
/// the balance. Zero balance yields zero; the adapter is expected to skip.
pub fn pick_amount_wei(
    policy: &AmountPolicy,
    balance: U256,
    decimals: u8,
) -> Result<U256, AdapterError> {
    let wei = match policy {
        AmountPolicy::Absolute(ether) => {
            TokenAmount::from_ether(*ether, decimals)
                .map_err(AdapterError::Contract)?
                .wei()
        }
        AmountPolicy::Range { min, max, round } => {
            let sampled = if max > min {
                rand::thread_rng().gen_range(*min..*max)
            } else {
                *min
            };
            let factor = 10f64.powi(*round as i32);
            let rounded = (sampled * factor).floor() / factor;
            let ether = Decimal::from_f64(rounded).unwrap_or(Decimal::ZERO);
            TokenAmount::from_ether(ether, decimals)
                .map_err(AdapterError::Contract)?
                .wei()
        }
        AmountPolicy::PercentRange { min, max } => {
            let pct = if max > min {
                rand::thread_rng().gen_range(*min..=*max)
            } else {
                *min
            };
            // Scaled integer math keeps precision at high balances.
            let bps = U256::from((pct * 100.0) as u64);
            balance * bps / U256::from(10_000u64)
        }
        AmountPolicy::FullBalance => balance,
    };
    Ok(wei.min(balance))
}

/// Minimum destination amount from the price ratio and slippage:
/// `amount_from · price_from/price_to · (1 − slippage/100)`, re-expressed in
/// the destination token's decimals.
pub fn min_destination(
    amount_from: &TokenAmount,
    price_ratio: f64,
    slippage_percent: f64,
    to_decimals: u8,
) -> Result<TokenAmount, AdapterError> {
    let slippage = slippage_percent.clamp(0.0, 100.0);
    let ratio = Decimal::from_f64(price_ratio).unwrap_or(Decimal::ZERO);
    let keep = Decimal::from_f64(1.0 - slippage / 100.0).unwrap_or(Decimal::ZERO);
    let ether_out = amount_from.ether() * ratio * keep;
    TokenAmount::from_ether(ether_out, to_decimals).map_err(AdapterError::Contract)
}

/// Resolves an `OperationInfo` into an `OperationProposal` against a live
/// source-network client.
pub struct ProposalBuilder<'a> {
    pub client: &'a ChainClient,
    pub networks: &'a Networks,
    pub tokens: &'a TokenRegistry,
    pub oracle: &'a PriceOracle,
}

impl<'a> ProposalBuilder<'a> {
    pub async fn build(&self, info: &OperationInfo) -> Result<OperationProposal, AdapterError> {
        let src_network = self.client.network.name;
        let dst_network = info.dst_network.unwrap_or(src_network);

        let from_token = self
            .tokens
            .get(src_network, info.from_symbol)
            .map_err(AdapterError::Contract)?;
        let to_token = self
            .tokens
            .get(dst_network, info.to_symbol)
            .map_err(AdapterError::Contract)?;

        let facade = ContractFacade::new(self.client);
        let balance = facade
            .balance_of(&from_token, self.client.address())
            .await?;
        let from_decimals = facade.decimals(&from_token).await?;

        let to_decimals = match to_token.cached_decimals() {
            Some(d) => d,
            None => {
                // Destination on another chain: read decimals through a fresh
                // client there; no transaction activity involved.
                let dst_net = self.networks.get(dst_network)?;
                let dst_client = ChainClient::new(
                    self.client.account_id,
                    None,
                    dst_net,
                    self.client.proxy().map(str::to_string),
                    false,
                )
                .await?;
                ContractFacade::new(&dst_client).decimals(&to_token).await?
            }
        };

        let amount_wei = pick_amount_wei(&info.amount, balance, from_decimals)?;
        let amount_from =
            TokenAmount::from_wei(amount_wei, from_decimals).map_err(AdapterError::Contract)?;

        let min_amount_to = match info.min_amount_to_wei {
            Some(wei) => {
                TokenAmount::from_wei(wei, to_decimals).map_err(AdapterError::Contract)?
            }
            None => {
                let ratio = self
                    .oracle
                    .price_ratio(info.from_symbol, info.to_symbol)
                    .await?;
                min_destination(&amount_from, ratio, info.slippage, to_decimals)?
            }
        };

        Ok(OperationProposal {
            from_token,
            amount_from,
            to_token,
            min_amount_to,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn absolute_amount_clamps_to_balance() {
        let policy = AmountPolicy::Absolute(Decimal::from(10));
        let balance = U256::from(5_000_000u64); // 5.0 at 6 decimals
        let wei = pick_amount_wei(&policy, balance, 6).unwrap();
        assert_eq!(wei, balance);
    }

    #[test]
    fn full_balance_takes_everything() {
        let balance = U256::from(123_456_789u64);
        let wei = pick_amount_wei(&AmountPolicy::FullBalance, balance, 6).unwrap();
        assert_eq!(wei, balance);
    }

    #[test]
    fn zero_balance_yields_zero_amount() {
        for policy in [
            AmountPolicy::FullBalance,
            AmountPolicy::PercentRange { min: 10.0, max: 50.0 },
            AmountPolicy::Absolute(Decimal::ONE),
        ] {
            let wei = pick_amount_wei(&policy, U256::zero(), 18).unwrap();
            assert!(wei.is_zero());
        }
    }

    #[test]
    fn percent_range_stays_within_bounds() {
        let balance = U256::from(1_000_000_000u64);
        for _ in 0..50 {
            let wei = pick_amount_wei(
                &AmountPolicy::PercentRange { min: 25.0, max: 75.0 },
                balance,
                6,
            )
            .unwrap();
            assert!(wei >= balance / 4, "{wei} below 25%");
            assert!(wei <= balance * 3 / 4, "{wei} above 75%");
        }
    }

    #[test]
    fn fifty_percent_of_native_balance_matches_scenario() {
        // 0.01 ETH balance, 50% policy.
        let balance = U256::from(10_000_000_000_000_000u64);
        let wei = pick_amount_wei(
            &AmountPolicy::PercentRange { min: 50.0, max: 50.0 },
            balance,
            18,
        )
        .unwrap();
        assert_eq!(wei, U256::from(5_000_000_000_000_000u64));
    }

    #[test]
    fn min_destination_applies_ratio_and_slippage() {
        // 5.0 USDC at 6 decimals, USDC/USDT ratio 1.0, 0.5% slippage.
        let amount = TokenAmount::from_wei(U256::from(5_000_000u64), 6).unwrap();
        let min = min_destination(&amount, 1.0, 0.5, 6).unwrap();
        assert_eq!(min.wei(), U256::from(4_975_000u64));
    }

    #[test]
    fn min_destination_across_decimals() {
        // 0.005 ETH at price ratio 3000 into a 6-decimals stable.
        let amount =
            TokenAmount::from_wei(U256::from(5_000_000_000_000_000u64), 18).unwrap();
        let min = min_destination(&amount, 3000.0, 0.5, 6).unwrap();
        let expected = Decimal::from_str("14.925").unwrap();
        assert_eq!(min.ether(), expected);
    }

    #[test]
    fn slippage_is_capped_at_hundred_percent() {
        let amount = TokenAmount::from_wei(U256::from(1_000_000u64), 6).unwrap();
        let min = min_destination(&amount, 1.0, 250.0, 6).unwrap();
        assert!(min.is_zero());
    }

    #[test]
    fn proposal_invariant_holds_for_ratio_bound() {
        let amount = TokenAmount::from_wei(U256::from(7_500_000u64), 6).unwrap();
        let min = min_destination(&amount, 1.0, 1.0, 6).unwrap();
        // min_amount_to ≤ amount_from · ratio
        assert!(min.wei() <= amount.wei());
    }
}
