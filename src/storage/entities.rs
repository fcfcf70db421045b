//! # Persisted Entities
//!
//! Row-mapped structs for the five entity families plus the insert DTOs the
//! services accept. Key and address format invariants are enforced at
//! construction, not by the schema.

use chrono::NaiveDateTime;
use sqlx::FromRow;

use crate::config::{is_valid_evm_address, is_valid_private_key};
use crate::errors::StoreError;

/// Which planned counter an operation decrements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Swap,
    Mint,
    Bridge,
    Stake,
}

impl OperationKind {
    pub fn counter_column(self) -> &'static str {
        match self {
            OperationKind::Swap => "planned_swaps_count",
            OperationKind::Mint => "planned_mints_count",
            OperationKind::Bridge => "planned_bridges_count",
            OperationKind::Stake => "planned_stakes_count",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub account_name: Option<String>,
    pub evm_private_key: String,
    pub evm_address: String,
    pub next_action_time: Option<NaiveDateTime>,
    pub planned_swaps_count: i64,
    pub planned_mints_count: i64,
    pub planned_bridges_count: i64,
    pub planned_stakes_count: i64,
    pub completed: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Account {
    pub fn planned(&self, kind: OperationKind) -> i64 {
        match kind {
            OperationKind::Swap => self.planned_swaps_count,
            OperationKind::Mint => self.planned_mints_count,
            OperationKind::Bridge => self.planned_bridges_count,
            OperationKind::Stake => self.planned_stakes_count,
        }
    }

    pub fn all_counters_zero(&self) -> bool {
        self.planned_swaps_count == 0
            && self.planned_mints_count == 0
            && self.planned_bridges_count == 0
            && self.planned_stakes_count == 0
    }
}

/// Insert DTO for `accounts`. Validates key and address shape up front.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub account_name: Option<String>,
    pub evm_private_key: String,
    pub evm_address: String,
    pub planned_swaps_count: i64,
    pub planned_mints_count: i64,
    pub planned_bridges_count: i64,
    pub planned_stakes_count: i64,
}

impl NewAccount {
    pub fn new(private_key: &str, address: &str) -> Result<Self, StoreError> {
        if !is_valid_private_key(private_key) {
            return Err(StoreError::Malformed(format!(
                "private key {}",
                redact_key(private_key)
            )));
        }
        if !is_valid_evm_address(address) {
            return Err(StoreError::Malformed(format!("address {address}")));
        }
        Ok(Self {
            account_name: None,
            evm_private_key: private_key.to_string(),
            evm_address: address.to_string(),
            planned_swaps_count: 0,
            planned_mints_count: 0,
            planned_bridges_count: 0,
            planned_stakes_count: 0,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.account_name = Some(name.into());
        self
    }

    pub fn with_planned(mut self, swaps: i64, mints: i64, bridges: i64, stakes: i64) -> Self {
        self.planned_swaps_count = swaps;
        self.planned_mints_count = mints;
        self.planned_bridges_count = bridges;
        self.planned_stakes_count = stakes;
        self
    }
}

/// First and last characters only; full keys never reach logs or errors.
pub fn redact_key(key: &str) -> String {
    if key.len() <= 10 {
        return "***".to_string();
    }
    format!("{}***{}", &key[..6], &key[key.len() - 4..])
}

#[derive(Debug, Clone, FromRow)]
pub struct Bridge {
    pub id: i64,
    pub account_id: i64,
    pub from_network: String,
    pub to_network: String,
    pub src_amount: String,
    pub src_token: String,
    pub dst_amount: String,
    pub dst_token: String,
    pub volume_usd: f64,
    pub fee: String,
    pub fee_in_usd: f64,
    pub platform: String,
    pub tx_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Swap {
    pub id: i64,
    pub account_id: i64,
    pub network: String,
    pub src_amount: String,
    pub src_token: String,
    pub dst_amount: String,
    pub dst_token: String,
    pub volume_usd: f64,
    pub fee: String,
    pub fee_in_usd: f64,
    pub platform: String,
    pub tx_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Mint {
    pub id: i64,
    pub account_id: i64,
    pub nft: String,
    pub quantity: i64,
    pub mint_price: String,
    pub mint_price_usd: f64,
    pub platform: String,
    pub tx_hash: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Stake {
    pub id: i64,
    pub account_id: i64,
    pub token: String,
    pub amount: String,
    pub unfreeze_date: Option<NaiveDateTime>,
    pub platform: String,
    pub tx_hash: String,
    pub created_at: NaiveDateTime,
}

/// Insert DTO for `swaps`.
#[derive(Debug, Clone)]
pub struct NewSwap {
    pub account_id: i64,
    pub network: String,
    pub src_amount: String,
    pub src_token: String,
    pub dst_amount: String,
    pub dst_token: String,
    pub volume_usd: f64,
    pub fee: String,
    pub fee_in_usd: f64,
    pub platform: String,
    pub tx_hash: String,
}

/// Insert DTO for `bridges`.
#[derive(Debug, Clone)]
pub struct NewBridge {
    pub account_id: i64,
    pub from_network: String,
    pub to_network: String,
    pub src_amount: String,
    pub src_token: String,
    pub dst_amount: String,
    pub dst_token: String,
    pub volume_usd: f64,
    pub fee: String,
    pub fee_in_usd: f64,
    pub platform: String,
    pub tx_hash: String,
}

/// Insert DTO for `mints`.
#[derive(Debug, Clone)]
pub struct NewMint {
    pub account_id: i64,
    pub nft: String,
    pub quantity: i64,
    pub mint_price: String,
    pub mint_price_usd: f64,
    pub platform: String,
    pub tx_hash: String,
}

/// Insert DTO for `stakes`.
#[derive(Debug, Clone)]
pub struct NewStake {
    pub account_id: i64,
    pub token: String,
    pub amount: String,
    pub unfreeze_date: Option<NaiveDateTime>,
    pub platform: String,
    pub tx_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_rejects_malformed_inputs() {
        let key = format!("0x{}", "ab".repeat(32));
        let addr = format!("0x{}", "cd".repeat(20));
        assert!(NewAccount::new(&key, &addr).is_ok());
        assert!(NewAccount::new("0x1234", &addr).is_err());
        assert!(NewAccount::new(&key, "not-an-address").is_err());
    }

    #[test]
    fn key_redaction_keeps_only_the_edges() {
        let key = format!("0x{}", "ab".repeat(32));
        let redacted = redact_key(&key);
        assert!(redacted.starts_with("0xabab"));
        assert!(redacted.ends_with("abab"));
        assert!(!redacted.contains(&key[8..20]));
    }

    #[test]
    fn counters_gate_the_completed_flip() {
        let key = format!("0x{}", "ab".repeat(32));
        let addr = format!("0x{}", "cd".repeat(20));
        let new = NewAccount::new(&key, &addr)
            .unwrap()
            .with_planned(1, 0, 0, 0);
        assert_eq!(new.planned_swaps_count, 1);
        assert_eq!(OperationKind::Swap.counter_column(), "planned_swaps_count");
    }
}
