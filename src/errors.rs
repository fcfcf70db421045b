//! # Centralized Error Handling
//!
//! Hierarchical error enums for the whole engine. Each subsystem owns its own
//! enum; `EngineError` is the top-level type every per-account task resolves
//! to before the outcome is logged. Nothing below this module deals in
//! string-typed errors.

use ethers::types::{Address, H256, U256};
use thiserror::Error;

/// The top-level error type, encapsulating all failures within the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Chain client error: {0}")]
    Client(#[from] ClientError),
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("Price oracle error: {0}")]
    Price(#[from] PriceError),
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
    #[error("Exchange error: {0}")]
    Cex(#[from] CexError),
    #[error("Starknet error: {0}")]
    Starknet(#[from] StarknetError),
    #[error("Fee cap exceeded: quoted {fee_usd:.4} USD > cap {cap_usd:.4} USD")]
    FeeCapExceeded { fee_usd: f64, cap_usd: f64 },
    #[error("No source network holds a balance in the configured range")]
    NoEligibleSource,
    #[error("System shut down")]
    Shutdown,
    #[error("Other error: {0}")]
    Other(String),
}

/// Errors raised while loading or validating configuration and input files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {1}: {0}")]
    Parse(#[source] serde_json::Error, String),
    #[error("Module '{0}' has no settings entry")]
    ModuleNotConfigured(String),
    #[error("Invalid private key on line {0}")]
    InvalidPrivateKey(usize),
    #[error("Route refers to unknown module '{0}'")]
    UnknownModule(String),
}

/// Errors from the per-(account, network) chain client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Wallet error: {0}")]
    Wallet(String),
    #[error("Proxy reachable but egress IP {egress} not present in proxy URL")]
    InvalidProxy { egress: String },
    #[error("Chain id mismatch: expected {expected}, node reports {actual}")]
    WrongChainId { expected: u64, actual: u64 },
    #[error("Coin symbol mismatch for network {0}")]
    WrongCoinSymbol(String),
    #[error("Network '{0}' is not registered")]
    NetworkNotAdded(String),
    #[error("Receipt for {tx:?} not observed within {timeout_secs}s")]
    ReceiptTimeout { tx: H256, timeout_secs: u64 },
    #[error("Insufficient funds for gas + value (balance {balance}, required {required})")]
    InsufficientGas { balance: U256, required: U256 },
    #[error("Transaction {0:?} reverted")]
    Reverted(H256),
    #[error("RPC error: {0}")]
    Rpc(String),
}

/// Errors from the contract facade (ABI handling, ERC-20 reads, approvals).
#[derive(Error, Debug)]
pub enum ContractError {
    #[error("No contract with an ERC-20 surface at {0:?}")]
    ContractNotExists(Address),
    #[error("ABI error: {0}")]
    Abi(String),
    #[error("ABI file {0} not found")]
    AbiFileNotFound(String),
    #[error("Approve failed for token {token:?} spender {spender:?}: {reason}")]
    ApproveFailed {
        token: Address,
        spender: Address,
        reason: String,
    },
    #[error("Call to {address:?}.{method} failed: {reason}")]
    CallFailed {
        address: Address,
        method: String,
        reason: String,
    },
    #[error("Amount does not fit the unit conversion: {0}")]
    AmountOverflow(String),
}

/// Errors from the Binance-backed price oracle.
#[derive(Error, Debug)]
pub enum PriceError {
    #[error("Price for {symbol} unavailable after {attempts} attempts")]
    PriceUnavailable { symbol: String, attempts: u32 },
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Unexpected ticker payload: {0}")]
    BadPayload(String),
}

/// Errors from protocol adapters.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("No route from {network}/{token}")]
    NoRoute { network: String, token: String },
    #[error("Tx payload details not added for pair {from}->{to}")]
    TxPayloadDetailsNotAdded { from: String, to: String },
    #[error("Pool id missing for pair {from}->{to}")]
    PoolIdMissing { from: String, to: String },
    #[error("Slippage revert (selector {selector})")]
    SlippageRevert { selector: String },
    #[error("Fee quote failed: {0}")]
    QuoteFailed(String),
    #[error("Proposal amount is zero; nothing to do")]
    ZeroAmount,
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Price error: {0}")]
    Price(#[from] PriceError),
}

/// Errors from the persistence layer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account already exists: address {address}, key {key_redacted}")]
    AccountExists { address: String, key_redacted: String },
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Malformed entity field: {0}")]
    Malformed(String),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Errors from centralized-exchange clients.
#[derive(Error, Debug)]
pub enum CexError {
    #[error("Exchange API error ({exchange}): {message}")]
    Api { exchange: String, message: String },
    #[error("Withdrawal network {network} not active right now on {exchange}")]
    NetworkNotActive { exchange: String, network: String },
    #[error("Not enough confirmations for sub-account transfer")]
    NotEnoughConfirmations,
    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors from the Starknet execution path.
#[derive(Error, Debug)]
pub enum StarknetError {
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("Account error: {0}")]
    Account(String),
    #[error("Transaction {0} did not succeed")]
    ExecutionFailed(String),
    #[error("Felt conversion error: {0}")]
    Felt(String),
}

impl EngineError {
    /// True when the failure is a recognized slippage revert that the engine
    /// may retry with a widened tolerance.
    pub fn is_slippage_revert(&self) -> bool {
        matches!(
            self,
            EngineError::Adapter(AdapterError::SlippageRevert { .. })
        )
    }
}

/// Custom-error selectors known to signal a slippage revert.
pub const SLIPPAGE_SELECTORS: &[&str] = &["0xc9f52c71", "0x8f66ec14", "0x963b34a5"];

/// Classifies an RPC revert payload; returns the matched selector when the
/// revert is a known slippage custom error.
pub fn match_slippage_selector(revert_data: &str) -> Option<&'static str> {
    SLIPPAGE_SELECTORS
        .iter()
        .copied()
        .find(|sel| revert_data.starts_with(sel) || revert_data.contains(&sel[2..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_selector_matches_prefixed_and_embedded() {
        assert_eq!(match_slippage_selector("0xc9f52c71"), Some("0xc9f52c71"));
        assert_eq!(
            match_slippage_selector("execution reverted: custom error c9f52c71"),
            Some("0xc9f52c71")
        );
        assert_eq!(match_slippage_selector("0xdeadbeef"), None);
    }

    #[test]
    fn slippage_revert_is_retryable() {
        let err = EngineError::Adapter(AdapterError::SlippageRevert {
            selector: "0xc9f52c71".into(),
        });
        assert!(err.is_slippage_revert());
        assert!(!EngineError::Shutdown.is_slippage_revert());
    }
}
