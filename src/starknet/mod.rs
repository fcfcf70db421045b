//! # Starknet Execution
//!
//! Thin wrapper over starknet-rs: one account bound to one RPC transport,
//! ERC-20-style balance reads, and the two-call `[approve, swap]` execution
//! pattern every Starknet AMM here uses. Receipts are successful only on
//! `TransactionExecutionStatus::Succeeded`.

pub mod amm;

use std::sync::Arc;
use std::time::Duration;

use ethers::types::U256;
use rand::seq::SliceRandom;
use ::starknet::accounts::{Account, Call, ExecutionEncoding, SingleOwnerAccount};
use ::starknet::core::chain_id;
use ::starknet::core::types::{
    BlockId, BlockTag, Felt, FunctionCall, TransactionExecutionStatus, TransactionStatus,
};
use ::starknet::core::utils::get_selector_from_name;
use ::starknet::providers::jsonrpc::{HttpTransport, JsonRpcClient};
use ::starknet::providers::{Provider, Url};
use ::starknet::signers::{LocalWallet, SigningKey};
use tracing::{info, warn};

use crate::errors::StarknetError;
use crate::networks::Network;
use crate::tokens::TokenSymbol;

/// Splits an EVM-style `U256` into the `(low, high)` felt pair Starknet
/// contracts expect for `u256` arguments.
pub fn split_u256(value: U256) -> (Felt, Felt) {
    let low = value.low_u128();
    let high = (value >> 128).low_u128();
    (Felt::from(low), Felt::from(high))
}

/// A Starknet token handle.
#[derive(Debug, Clone)]
pub struct StarkToken {
    pub title: TokenSymbol,
    pub address: Felt,
    pub decimals: u8,
}

fn felt(hex: &str) -> Felt {
    Felt::from_hex(hex).expect("static felt")
}

/// The Starknet-side token registry; small and static.
pub fn stark_token(symbol: TokenSymbol) -> Option<StarkToken> {
    let token = match symbol {
        TokenSymbol::Eth => StarkToken {
            title: TokenSymbol::Eth,
            address: felt("0x049d36570d4e46f48e99674bd3fcc84644ddd6b96f7c741b1562b82f9e004dc7"),
            decimals: 18,
        },
        TokenSymbol::Usdc => StarkToken {
            title: TokenSymbol::Usdc,
            address: felt("0x053c91253bc9682c04929ca02ed00b3e423f6710d2ee7e0d5ebb06f3ecf368a8"),
            decimals: 6,
        },
        TokenSymbol::Usdt => StarkToken {
            title: TokenSymbol::Usdt,
            address: felt("0x068f5c6a61780768455de69077e07e89787839bf8166decfbf92b645209c0fb8"),
            decimals: 6,
        },
        _ => return None,
    };
    Some(token)
}

/// One Starknet account bound to one RPC transport.
pub struct StarknetClient {
    pub account_id: i64,
    provider: Arc<JsonRpcClient<HttpTransport>>,
    account: SingleOwnerAccount<Arc<JsonRpcClient<HttpTransport>>, LocalWallet>,
}

impl StarknetClient {
    pub fn new(
        account_id: i64,
        private_key: &str,
        account_address: &str,
        network: &Network,
    ) -> Result<Self, StarknetError> {
        let rpc_url = network
            .rpc_urls
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| StarknetError::Provider("no RPC URLs configured".into()))?;
        let url =
            Url::parse(rpc_url).map_err(|e| StarknetError::Provider(e.to_string()))?;
        let provider = Arc::new(JsonRpcClient::new(HttpTransport::new(url)));

        let key = Felt::from_hex(private_key).map_err(|e| StarknetError::Felt(e.to_string()))?;
        let address =
            Felt::from_hex(account_address).map_err(|e| StarknetError::Felt(e.to_string()))?;
        let signer = LocalWallet::from(SigningKey::from_secret_scalar(key));
        let account = SingleOwnerAccount::new(
            provider.clone(),
            signer,
            address,
            chain_id::MAINNET,
            ExecutionEncoding::New,
        );

        Ok(Self {
            account_id,
            provider,
            account,
        })
    }

    pub fn address(&self) -> Felt {
        self.account.address()
    }

    /// ERC-20 balance as a `U256` assembled from the `(low, high)` pair.
    pub async fn balance_of(&self, token: &StarkToken) -> Result<U256, StarknetError> {
        let selector = get_selector_from_name("balanceOf")
            .map_err(|e| StarknetError::Felt(e.to_string()))?;
        let out = self
            .provider
            .call(
                FunctionCall {
                    contract_address: token.address,
                    entry_point_selector: selector,
                    calldata: vec![self.account.address()],
                },
                BlockId::Tag(BlockTag::Pending),
            )
            .await
            .map_err(|e| StarknetError::Provider(e.to_string()))?;
        let low = out
            .first()
            .map(|f| {
                let bytes = f.to_bytes_be();
                u128::from_be_bytes(bytes[16..].try_into().expect("16 bytes"))
            })
            .unwrap_or(0);
        let high = out
            .get(1)
            .map(|f| {
                let bytes = f.to_bytes_be();
                u128::from_be_bytes(bytes[16..].try_into().expect("16 bytes"))
            })
            .unwrap_or(0);
        Ok((U256::from(high) << 128) | U256::from(low))
    }

    /// Submits the call sequence with fee auto-estimation; returns the tx
    /// hash as a felt.
    pub async fn execute(&self, calls: Vec<Call>) -> Result<Felt, StarknetError> {
        let result = self
            .account
            .execute_v1(calls)
            .send()
            .await
            .map_err(|e| StarknetError::Account(e.to_string()))?;
        info!(
            target: "starknet",
            account = self.account_id,
            status = "SENT",
            tx = %format!("{:#x}", result.transaction_hash),
            "invoke submitted"
        );
        Ok(result.transaction_hash)
    }

    /// Polls the receipt until `timeout`; success is
    /// `TransactionExecutionStatus::Succeeded`.
    pub async fn wait_for_receipt(
        &self,
        tx_hash: Felt,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<(), StarknetError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.provider.get_transaction_status(tx_hash).await {
                Ok(TransactionStatus::AcceptedOnL2(exec))
                | Ok(TransactionStatus::AcceptedOnL1(exec)) => {
                    return match exec {
                        TransactionExecutionStatus::Succeeded => Ok(()),
                        TransactionExecutionStatus::Reverted => Err(
                            StarknetError::ExecutionFailed(format!("{tx_hash:#x}")),
                        ),
                    };
                }
                Ok(TransactionStatus::Rejected) => {
                    return Err(StarknetError::ExecutionFailed(format!(
                        "{tx_hash:#x} rejected"
                    )));
                }
                Ok(TransactionStatus::Received) => {}
                Err(e) => {
                    warn!(
                        target: "starknet",
                        account = self.account_id,
                        error = %e,
                        "status poll error; continuing"
                    );
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(StarknetError::ExecutionFailed(format!(
                    "{tx_hash:#x} not confirmed in {}s",
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// The `[approve, …]` prefix of every AMM execution.
pub fn approve_call(token: &StarkToken, spender: Felt, amount: U256) -> Call {
    let (low, high) = split_u256(amount);
    Call {
        to: token.address,
        selector: get_selector_from_name("approve").expect("approve selector"),
        calldata: vec![spender, low, high],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_split_round_trips() {
        let value = (U256::from(7u64) << 128) | U256::from(42u64);
        let (low, high) = split_u256(value);
        assert_eq!(low, Felt::from(42u64));
        assert_eq!(high, Felt::from(7u64));
    }

    #[test]
    fn stark_registry_covers_amm_tokens() {
        for symbol in [TokenSymbol::Eth, TokenSymbol::Usdc, TokenSymbol::Usdt] {
            assert!(stark_token(symbol).is_some());
        }
        assert!(stark_token(TokenSymbol::Wbtc).is_none());
    }

    #[test]
    fn approve_call_carries_low_high_pair() {
        let token = stark_token(TokenSymbol::Usdc).unwrap();
        let call = approve_call(&token, Felt::from(1u64), U256::from(5_000_000u64));
        assert_eq!(call.calldata.len(), 3);
        assert_eq!(call.calldata[1], Felt::from(5_000_000u64));
        assert_eq!(call.calldata[2], Felt::ZERO);
    }
}
