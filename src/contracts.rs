//! # Contract Facade
//!
//! ERC-20 reads, the approval flow and gas-parameter injection, layered over
//! a borrowed `ChainClient`. The facade never owns the transport; one facade
//! is constructed per operation and dropped with it.

use std::time::Duration;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, TransactionReceipt, U256};
use tracing::info;

use crate::abi;
use crate::amount::TokenAmount;
use crate::client::{ChainClient, RECEIPT_POLL_INTERVAL};
use crate::errors::ContractError;
use crate::tokens::TokenContract;

/// Outcome of an approval request.
#[derive(Debug)]
pub enum ApproveOutcome {
    /// Allowance already covers the amount; no transaction emitted.
    AlreadyApproved,
    Approved(TransactionReceipt),
}

/// Either a raw wei quantity or a `TokenAmount`; both coerce to wei when
/// injected into transaction parameters.
#[derive(Debug, Clone)]
pub enum GasValue {
    Wei(U256),
    Amount(TokenAmount),
}

impl GasValue {
    pub fn as_wei(&self) -> U256 {
        match self {
            GasValue::Wei(w) => *w,
            GasValue::Amount(a) => a.wei(),
        }
    }
}

impl From<U256> for GasValue {
    fn from(v: U256) -> Self {
        GasValue::Wei(v)
    }
}

impl From<u64> for GasValue {
    fn from(v: u64) -> Self {
        GasValue::Wei(U256::from(v))
    }
}

impl From<TokenAmount> for GasValue {
    fn from(a: TokenAmount) -> Self {
        GasValue::Amount(a)
    }
}

/// Sets the effective gas price on whichever envelope the transaction uses.
/// Applying the same value twice yields the same parameters.
pub fn set_gas_price(tx: &mut TypedTransaction, price: impl Into<GasValue>) {
    let wei = price.into().as_wei();
    match tx {
        TypedTransaction::Eip1559(req) => {
            req.max_fee_per_gas = Some(wei);
        }
        _ => {
            tx.set_gas_price(wei);
        }
    }
}

pub fn set_gas_limit(tx: &mut TypedTransaction, limit: impl Into<GasValue>) {
    tx.set_gas(limit.into().as_wei());
}

/// Scales the already-present gas limit; a no-op when none is set yet.
pub fn add_multiplier_of_gas(tx: &mut TypedTransaction, multiplier: f64) {
    if let Some(gas) = tx.gas().copied() {
        let scaled = U256::from((gas.as_u128() as f64 * multiplier) as u128);
        tx.set_gas(scaled);
    }
}

/// Copies the gas-price and gas-limit overrides from `hints` onto `tx`.
/// Fields absent on the hints are left untouched.
pub fn apply_gas_hints(tx: &mut TypedTransaction, hints: &TypedTransaction) {
    if let Some(price) = hints.gas_price() {
        set_gas_price(tx, price);
    }
    if let Some(limit) = hints.gas().copied() {
        set_gas_limit(tx, limit);
    }
}

/// The facade proper. Borrows its client; one per operation.
pub struct ContractFacade<'a> {
    client: &'a ChainClient,
}

impl<'a> ContractFacade<'a> {
    pub fn new(client: &'a ChainClient) -> Self {
        Self { client }
    }

    /// Balance of `owner` in `token` units; native balances route through the
    /// client directly.
    pub async fn balance_of(
        &self,
        token: &TokenContract,
        owner: Address,
    ) -> Result<U256, ContractError> {
        if token.is_native {
            return self
                .client
                .balance_of(owner)
                .await
                .map_err(|e| ContractError::CallFailed {
                    address: token.address,
                    method: "balance".into(),
                    reason: e.to_string(),
                });
        }
        let data = abi::ERC20
            .encode("balanceOf", owner)
            .map_err(|e| ContractError::Abi(e.to_string()))?;
        let tx = self.client.new_tx(token.address, data, U256::zero());
        let out = self
            .client
            .call(&tx)
            .await
            .map_err(|_| ContractError::ContractNotExists(token.address))?;
        abi::ERC20
            .decode_output("balanceOf", out)
            .map_err(|e| ContractError::Abi(e.to_string()))
    }

    /// Memoized decimals read.
    pub async fn decimals(&self, token: &TokenContract) -> Result<u8, ContractError> {
        if let Some(d) = token.cached_decimals() {
            return Ok(d);
        }
        let data = abi::ERC20
            .encode("decimals", ())
            .map_err(|e| ContractError::Abi(e.to_string()))?;
        let tx = self.client.new_tx(token.address, data, U256::zero());
        let out = self
            .client
            .call(&tx)
            .await
            .map_err(|_| ContractError::ContractNotExists(token.address))?;
        let decimals: u8 = abi::ERC20
            .decode_output("decimals", out)
            .map_err(|e| ContractError::Abi(e.to_string()))?;
        Ok(token.memoize_decimals(decimals))
    }

    pub async fn allowance(
        &self,
        token: &TokenContract,
        owner: Address,
        spender: Address,
    ) -> Result<U256, ContractError> {
        let data = abi::ERC20
            .encode("allowance", (owner, spender))
            .map_err(|e| ContractError::Abi(e.to_string()))?;
        let tx = self.client.new_tx(token.address, data, U256::zero());
        let out = self
            .client
            .call(&tx)
            .await
            .map_err(|_| ContractError::ContractNotExists(token.address))?;
        abi::ERC20
            .decode_output("allowance", out)
            .map_err(|e| ContractError::Abi(e.to_string()))
    }

    /// Ensures `spender` may move `amount` of `token`. No-op when the current
    /// allowance already covers it; otherwise builds, signs and confirms an
    /// `approve`. `infinite` approves `uint256::MAX` instead of the amount.
    /// Gas overrides (price, limit, estimate multiplier) are reused from
    /// `gas_hints` and `gas_multiplier` when supplied.
    pub async fn approve(
        &self,
        token: &TokenContract,
        spender: Address,
        amount: U256,
        infinite: bool,
        gas_hints: Option<&TypedTransaction>,
        gas_multiplier: f64,
    ) -> Result<ApproveOutcome, ContractError> {
        let owner = self.client.address();
        let current = self.allowance(token, owner, spender).await?;
        if current >= amount {
            return Ok(ApproveOutcome::AlreadyApproved);
        }

        let approve_amount = if infinite { U256::max_value() } else { amount };
        let data = abi::ERC20
            .encode("approve", (spender, approve_amount))
            .map_err(|e| ContractError::Abi(e.to_string()))?;
        let mut tx = self.client.new_tx(token.address, data, U256::zero());

        if let Some(hints) = gas_hints {
            apply_gas_hints(&mut tx, hints);
        }

        self.client
            .auto_add_params(&mut tx, gas_multiplier)
            .await
            .map_err(|e| ContractError::ApproveFailed {
                token: token.address,
                spender,
                reason: e.to_string(),
            })?;
        let hash = self
            .client
            .sign_and_send(&tx)
            .await
            .map_err(|e| ContractError::ApproveFailed {
                token: token.address,
                spender,
                reason: e.to_string(),
            })?;
        let receipt = self
            .client
            .wait_for_receipt(hash, Duration::from_secs(240), RECEIPT_POLL_INTERVAL)
            .await
            .map_err(|e| ContractError::ApproveFailed {
                token: token.address,
                spender,
                reason: e.to_string(),
            })?;

        info!(
            target: "contracts",
            account = self.client.account_id,
            network = %self.client.network.name,
            status = "APPROVED",
            token = %token.title,
            spender = %format!("{spender:?}"),
            "allowance granted"
        );
        Ok(ApproveOutcome::Approved(receipt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Eip1559TransactionRequest;

    #[test]
    fn gas_price_injection_is_idempotent() {
        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        set_gas_price(&mut tx, U256::from(42u64));
        let once = tx.clone();
        set_gas_price(&mut tx, U256::from(42u64));
        assert_eq!(tx, once);
    }

    #[test]
    fn gas_limit_injection_is_idempotent() {
        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        set_gas_limit(&mut tx, 250_000u64);
        let once = tx.clone();
        set_gas_limit(&mut tx, 250_000u64);
        assert_eq!(tx, once);
        assert_eq!(tx.gas().copied(), Some(U256::from(250_000u64)));
    }

    #[test]
    fn multiplier_scales_existing_gas_only() {
        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        add_multiplier_of_gas(&mut tx, 1.5);
        assert!(tx.gas().is_none());

        set_gas_limit(&mut tx, 100_000u64);
        add_multiplier_of_gas(&mut tx, 1.5);
        assert_eq!(tx.gas().copied(), Some(U256::from(150_000u64)));
    }

    #[test]
    fn gas_hints_carry_price_and_limit() {
        let mut hints: TypedTransaction = Eip1559TransactionRequest::new().into();
        set_gas_price(&mut hints, U256::from(7_000_000_000u64));
        set_gas_limit(&mut hints, 180_000u64);

        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        apply_gas_hints(&mut tx, &hints);
        match &tx {
            TypedTransaction::Eip1559(req) => {
                assert_eq!(req.max_fee_per_gas, Some(U256::from(7_000_000_000u64)));
            }
            _ => panic!("expected EIP-1559 envelope"),
        }
        assert_eq!(tx.gas().copied(), Some(U256::from(180_000u64)));
    }

    #[test]
    fn empty_gas_hints_leave_the_transaction_alone() {
        let hints: TypedTransaction = Eip1559TransactionRequest::new().into();
        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        let before = tx.clone();
        apply_gas_hints(&mut tx, &hints);
        assert_eq!(tx, before);
    }

    #[test]
    fn token_amount_coerces_to_wei_in_injectors() {
        let amount =
            TokenAmount::from_gwei(rust_decimal::Decimal::from(30), 18).unwrap();
        let mut tx: TypedTransaction = Eip1559TransactionRequest::new().into();
        set_gas_price(&mut tx, amount);
        match tx {
            TypedTransaction::Eip1559(req) => {
                assert_eq!(req.max_fee_per_gas, Some(U256::from(30_000_000_000u64)));
            }
            _ => panic!("expected EIP-1559 envelope"),
        }
    }
}
