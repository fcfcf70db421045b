//! # CEX Adapter Contract
//!
//! The abstract surface the engine uses for exchange top-ups. Concrete
//! exchange clients (OKX, Binance, Bybit, BingX) live outside this crate and
//! implement this trait; the engine never sees past it. The retry policy for
//! the two transient exchange conditions lives here so every client gets it
//! for free.

use std::time::Duration;

use async_trait::async_trait;
use ethers::types::Address;
use tracing::{info, warn};

use crate::amount::TokenAmount;
use crate::errors::CexError;
use crate::networks::NetworkName;
use crate::tokens::TokenSymbol;

/// Pause between retries of transient exchange conditions.
pub const RETRY_PAUSE: Duration = Duration::from_secs(60);
/// Bound on the transient-condition retry loop.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// An accepted withdrawal, as the exchange identifies it.
#[derive(Debug, Clone)]
pub struct WithdrawalHandle {
    pub id: String,
    pub symbol: TokenSymbol,
    pub network: NetworkName,
    pub amount: TokenAmount,
}

#[async_trait]
pub trait Cex: Send + Sync {
    fn name(&self) -> &'static str;

    /// Requests a withdrawal of `amount` to `to` over `network`.
    async fn withdraw(
        &self,
        symbol: TokenSymbol,
        network: NetworkName,
        to: Address,
        amount: &TokenAmount,
    ) -> Result<WithdrawalHandle, CexError>;

    /// Blocks until the exchange reports the withdrawal completed.
    async fn await_arrival(
        &self,
        handle: &WithdrawalHandle,
        timeout: Duration,
    ) -> Result<(), CexError>;

    /// The exchange-side deposit address for `(symbol, network)`.
    async fn deposit_address(
        &self,
        symbol: TokenSymbol,
        network: NetworkName,
    ) -> Result<Address, CexError>;
}

fn is_transient(err: &CexError) -> bool {
    matches!(
        err,
        CexError::NetworkNotActive { .. } | CexError::NotEnoughConfirmations
    )
}

/// Withdraws with the standard transient-condition policy: an inactive
/// withdrawal network or a pending sub-account transfer sleeps 60 s and
/// retries; everything else surfaces immediately.
pub async fn withdraw_with_retry(
    cex: &dyn Cex,
    symbol: TokenSymbol,
    network: NetworkName,
    to: Address,
    amount: &TokenAmount,
) -> Result<WithdrawalHandle, CexError> {
    let mut attempt = 0u32;
    loop {
        match cex.withdraw(symbol, network, to, amount).await {
            Ok(handle) => {
                info!(
                    target: "cex",
                    exchange = cex.name(),
                    network = %network,
                    status = "WITHDRAWN",
                    symbol = %symbol,
                    amount = %amount,
                    id = %handle.id,
                    "withdrawal accepted"
                );
                return Ok(handle);
            }
            Err(err) if is_transient(&err) => {
                attempt += 1;
                if attempt >= MAX_RETRY_ATTEMPTS {
                    return Err(err);
                }
                warn!(
                    target: "cex",
                    exchange = cex.name(),
                    network = %network,
                    status = "DELAY",
                    attempt,
                    error = %err,
                    "transient exchange condition; sleeping before retry"
                );
                tokio::time::sleep(RETRY_PAUSE).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyCex {
        failures: AtomicU32,
        error: fn() -> CexError,
    }

    #[async_trait]
    impl Cex for FlakyCex {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn withdraw(
            &self,
            symbol: TokenSymbol,
            network: NetworkName,
            _to: Address,
            amount: &TokenAmount,
        ) -> Result<WithdrawalHandle, CexError> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(WithdrawalHandle {
                id: "w-1".into(),
                symbol,
                network,
                amount: amount.clone(),
            })
        }

        async fn await_arrival(
            &self,
            _handle: &WithdrawalHandle,
            _timeout: Duration,
        ) -> Result<(), CexError> {
            Ok(())
        }

        async fn deposit_address(
            &self,
            _symbol: TokenSymbol,
            _network: NetworkName,
        ) -> Result<Address, CexError> {
            Ok(Address::zero())
        }
    }

    fn amount() -> TokenAmount {
        TokenAmount::from_wei(U256::from(1_000_000u64), 6).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn inactive_network_is_retried() {
        let cex = FlakyCex {
            failures: AtomicU32::new(2),
            error: || CexError::NetworkNotActive {
                exchange: "flaky".into(),
                network: "Arbitrum".into(),
            },
        };
        let handle = withdraw_with_retry(
            &cex,
            TokenSymbol::Usdc,
            NetworkName::Arbitrum,
            Address::zero(),
            &amount(),
        )
        .await
        .unwrap();
        assert_eq!(handle.id, "w-1");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_subaccount_transfer_is_retried() {
        let cex = FlakyCex {
            failures: AtomicU32::new(1),
            error: || CexError::NotEnoughConfirmations,
        };
        assert!(withdraw_with_retry(
            &cex,
            TokenSymbol::Eth,
            NetworkName::Optimism,
            Address::zero(),
            &amount(),
        )
        .await
        .is_ok());
    }

    #[tokio::test]
    async fn api_errors_surface_immediately() {
        let cex = FlakyCex {
            failures: AtomicU32::new(5),
            error: || CexError::Api {
                exchange: "flaky".into(),
                message: "insufficient balance".into(),
            },
        };
        let err = withdraw_with_retry(
            &cex,
            TokenSymbol::Usdt,
            NetworkName::Bsc,
            Address::zero(),
            &amount(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CexError::Api { .. }));
    }
}
