//! # Token Amounts
//!
//! `TokenAmount` is the single value type carried through proposals, gas
//! parameters and persisted records. It exposes three views over one
//! underlying quantity: integer wei (chain-minimal unit), decimal ether
//! (human) and GWei (gas-price unit). Whichever view it is constructed from,
//! the others are derived immediately; the value never mutates afterwards.

use ethers::types::U256;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::errors::ContractError;

/// An immutable token quantity with wei / ether / GWei views.
///
/// The decimal mantissa of `rust_decimal` is 96 bits, so quantities above
/// 2^96 wei are rejected at construction rather than silently truncated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAmount {
    wei: U256,
    ether: Decimal,
    decimals: u8,
}

impl TokenAmount {
    /// Constructs from the chain-minimal unit.
    pub fn from_wei(wei: U256, decimals: u8) -> Result<Self, ContractError> {
        if wei.bits() > 96 {
            return Err(ContractError::AmountOverflow(format!(
                "{wei} wei exceeds the representable range"
            )));
        }
        let ether = Decimal::from_i128_with_scale(wei.as_u128() as i128, decimals as u32)
            .normalize();
        Ok(Self { wei, ether, decimals })
    }

    /// Constructs from the human decimal view; fractional wei is truncated.
    pub fn from_ether(ether: Decimal, decimals: u8) -> Result<Self, ContractError> {
        if ether.is_sign_negative() {
            return Err(ContractError::AmountOverflow(format!(
                "negative amount {ether}"
            )));
        }
        let scale = Decimal::from(10u64.pow(decimals as u32));
        let scaled = (ether * scale).trunc();
        let wei_u128 = scaled.to_u128().ok_or_else(|| {
            ContractError::AmountOverflow(format!("{ether} at {decimals} decimals"))
        })?;
        Self::from_wei(U256::from(wei_u128), decimals)
    }

    /// Constructs from a GWei quantity (used for gas prices; decimals fixed
    /// at 18 on every EVM network here).
    pub fn from_gwei(gwei: Decimal, decimals: u8) -> Result<Self, ContractError> {
        let scaled = (gwei * Decimal::from(1_000_000_000u64)).trunc();
        let wei_u128 = scaled
            .to_u128()
            .ok_or_else(|| ContractError::AmountOverflow(format!("{gwei} GWei")))?;
        Self::from_wei(U256::from(wei_u128), decimals)
    }

    pub fn zero(decimals: u8) -> Self {
        Self {
            wei: U256::zero(),
            ether: Decimal::ZERO,
            decimals,
        }
    }

    pub fn wei(&self) -> U256 {
        self.wei
    }

    pub fn ether(&self) -> Decimal {
        self.ether
    }

    pub fn gwei(&self) -> Decimal {
        Decimal::from_i128_with_scale(self.wei.as_u128() as i128, 9).normalize()
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.wei.is_zero()
    }

    /// Ether view as `f64`, for USD math at logging/persistence boundaries.
    pub fn ether_f64(&self) -> f64 {
        self.ether.to_f64().unwrap_or(0.0)
    }
}

impl std::fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.ether)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn wei_and_ether_views_agree() {
        let amount = TokenAmount::from_wei(U256::from(5_000_000u64), 6).unwrap();
        assert_eq!(amount.ether(), Decimal::from(5));
        assert_eq!(amount.wei(), U256::from(5_000_000u64));
    }

    #[test]
    fn ether_round_trips_through_wei() {
        for (raw, decimals) in [("0.5", 18u8), ("1234.567891", 6), ("0.000000000000000001", 18)] {
            let ether = Decimal::from_str(raw).unwrap();
            let a = TokenAmount::from_ether(ether, decimals).unwrap();
            let b = TokenAmount::from_wei(a.wei(), decimals).unwrap();
            assert_eq!(a.ether(), b.ether(), "round trip failed for {raw}");
        }
    }

    #[test]
    fn gwei_view_scales_by_nine_decimals() {
        let one_gwei = TokenAmount::from_gwei(Decimal::ONE, 18).unwrap();
        assert_eq!(one_gwei.wei(), U256::from(1_000_000_000u64));
        assert_eq!(one_gwei.gwei(), Decimal::ONE);
    }

    #[test]
    fn oversized_wei_is_rejected() {
        let too_big = U256::from(2).pow(U256::from(97));
        assert!(TokenAmount::from_wei(too_big, 18).is_err());
    }

    #[test]
    fn negative_ether_is_rejected() {
        assert!(TokenAmount::from_ether(Decimal::from(-1), 18).is_err());
    }
}
