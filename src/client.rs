//! # Chain Client
//!
//! A per-(account, network) interface to an EVM chain. Owns exactly one
//! signer and one RPC transport; every RPC call the engine makes on behalf of
//! an account flows through here. The RPC URL is chosen at random from the
//! network's list once, at construction, and never re-randomised
//! mid-execution.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, Eip1559TransactionRequest, TransactionReceipt,
    TransactionRequest, H256, U256, U64,
};
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::networks::{Network, TxType};

/// Default polling cadence for receipt waits.
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// One account bound to one network.
#[derive(Debug, Clone)]
pub struct ChainClient {
    pub account_id: i64,
    pub network: Arc<Network>,
    provider: Arc<Provider<Http>>,
    wallet: LocalWallet,
    proxy: Option<String>,
}

impl ChainClient {
    /// Builds the client. When `private_key` is `None` a throwaway wallet is
    /// generated (read-only use). When `validate_proxy` is set, the client
    /// fetches its own egress IP through the proxy and fails `InvalidProxy`
    /// unless that IP occurs in the proxy URL.
    pub async fn new(
        account_id: i64,
        private_key: Option<&str>,
        network: Arc<Network>,
        proxy: Option<String>,
        validate_proxy: bool,
    ) -> Result<Self, ClientError> {
        let wallet = match private_key {
            Some(pk) => LocalWallet::from_str(pk)
                .map_err(|e| ClientError::Wallet(e.to_string()))?,
            None => LocalWallet::new(&mut rand::thread_rng()),
        }
        .with_chain_id(network.chain_id);

        let rpc_url = network
            .rpc_urls
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| ClientError::NetworkNotAdded(network.name.to_string()))?
            .clone();

        let mut http_builder = reqwest::Client::builder().timeout(Duration::from_secs(10));
        if let Some(ref proxy_url) = proxy {
            let p = reqwest::Proxy::all(proxy_url)
                .map_err(|e| ClientError::Provider(e.to_string()))?;
            http_builder = http_builder.proxy(p);
        }
        let http = http_builder
            .build()
            .map_err(|e| ClientError::Provider(e.to_string()))?;

        if validate_proxy {
            if let Some(ref proxy_url) = proxy {
                let egress = http
                    .get("https://api.ipify.org")
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| ClientError::Provider(e.to_string()))?
                    .text()
                    .await
                    .map_err(|e| ClientError::Provider(e.to_string()))?;
                if !proxy_url.contains(egress.trim()) {
                    return Err(ClientError::InvalidProxy {
                        egress: egress.trim().to_string(),
                    });
                }
            }
        }

        let url = url::Url::parse(&rpc_url).map_err(|e| ClientError::Provider(e.to_string()))?;
        let provider = Arc::new(Provider::new(Http::new_with_client(url, http)));

        debug!(
            target: "client",
            account = account_id,
            network = %network.name,
            rpc = %rpc_url,
            "chain client constructed"
        );

        Ok(Self {
            account_id,
            network,
            provider: provider.clone(),
            wallet,
            proxy,
        })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    /// Verifies the node agrees with the registry's chain id. Chain id, once
    /// observed, is immutable for the process lifetime.
    pub async fn verify_chain_id(&self) -> Result<u64, ClientError> {
        let actual = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?
            .as_u64();
        if actual != self.network.chain_id {
            return Err(ClientError::WrongChainId {
                expected: self.network.chain_id,
                actual,
            });
        }
        Ok(actual)
    }

    pub async fn gas_price(&self) -> Result<U256, ClientError> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    pub async fn max_priority_fee(&self) -> Result<U256, ClientError> {
        self.provider
            .request("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    pub async fn estimate_gas(&self, tx: &TypedTransaction) -> Result<U256, ClientError> {
        self.provider
            .estimate_gas(tx, None)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    pub async fn nonce_for(&self, address: Address) -> Result<U256, ClientError> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    pub async fn current_block(&self) -> Result<u64, ClientError> {
        Ok(self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?
            .as_u64())
    }

    /// Native-coin balance.
    pub async fn balance_of(&self, address: Address) -> Result<U256, ClientError> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    /// Read-only eth_call.
    pub async fn call(&self, tx: &TypedTransaction) -> Result<Bytes, ClientError> {
        self.provider
            .call(tx, None)
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))
    }

    /// Fresh transaction skeleton in the envelope this network expects.
    pub fn new_tx(&self, to: Address, data: Bytes, value: U256) -> TypedTransaction {
        match self.network.tx_type {
            TxType::Eip1559 => Eip1559TransactionRequest::new()
                .to(to)
                .data(data)
                .value(value)
                .into(),
            TxType::Legacy => TransactionRequest::new()
                .to(to)
                .data(data)
                .value(value)
                .into(),
        }
    }

    /// Fills the fields adapters leave blank: chain id, from, nonce, fee
    /// parameters in the network's envelope, and an estimated gas limit
    /// scaled by `gas_multiplier`.
    pub async fn auto_add_params(
        &self,
        tx: &mut TypedTransaction,
        gas_multiplier: f64,
    ) -> Result<(), ClientError> {
        let from = self.wallet.address();
        tx.set_chain_id(self.network.chain_id);
        tx.set_from(from);
        if tx.nonce().is_none() {
            tx.set_nonce(self.nonce_for(from).await?);
        }

        match self.network.tx_type {
            TxType::Eip1559 => {
                // A gasPrice left over by an adapter becomes maxFeePerGas with
                // the priority fee layered on top.
                if let TypedTransaction::Eip1559(ref mut req) = tx {
                    if req.max_priority_fee_per_gas.is_none() {
                        req.max_priority_fee_per_gas = Some(self.max_priority_fee().await?);
                    }
                    if req.max_fee_per_gas.is_none() {
                        let base = self.gas_price().await?;
                        let tip = req.max_priority_fee_per_gas.unwrap_or_default();
                        req.max_fee_per_gas = Some(base + tip);
                    }
                } else {
                    let gas_price = match tx.gas_price() {
                        Some(p) => p,
                        None => self.gas_price().await?,
                    };
                    let tip = self.max_priority_fee().await?;
                    let mut req = Eip1559TransactionRequest::new()
                        .max_priority_fee_per_gas(tip)
                        .max_fee_per_gas(gas_price + tip);
                    req.from = tx.from().copied();
                    req.to = tx.to().cloned();
                    req.value = tx.value().copied();
                    req.data = tx.data().cloned();
                    req.nonce = tx.nonce().copied();
                    req.gas = tx.gas().copied();
                    req.chain_id = tx.chain_id();
                    *tx = req.into();
                }
            }
            TxType::Legacy => {
                if tx.gas_price().is_none() {
                    tx.set_gas_price(self.gas_price().await?);
                }
            }
        }

        let needs_gas = tx.gas().map(|g| g.is_zero()).unwrap_or(true);
        if needs_gas {
            let estimated = self.estimate_gas(tx).await?;
            let scaled = if (gas_multiplier - 1.0).abs() > f64::EPSILON {
                U256::from((estimated.as_u128() as f64 * gas_multiplier) as u128)
            } else {
                estimated
            };
            tx.set_gas(scaled);
        }
        Ok(())
    }

    /// Signs and broadcasts; returns the tx hash. Reverts and gas shortfalls
    /// are classified from the node's error string.
    pub async fn sign_and_send(&self, tx: &TypedTransaction) -> Result<H256, ClientError> {
        let signature = self
            .wallet
            .sign_transaction(tx)
            .await
            .map_err(|e| ClientError::Wallet(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("insufficient funds") {
                    ClientError::InsufficientGas {
                        balance: U256::zero(),
                        required: tx.value().copied().unwrap_or_default(),
                    }
                } else {
                    ClientError::Rpc(msg)
                }
            })?;
        let hash = pending.tx_hash();
        info!(
            target: "client",
            account = self.account_id,
            network = %self.network.name,
            status = "SENT",
            tx = %format!("{hash:?}"),
            "transaction broadcast"
        );
        Ok(hash)
    }

    /// Polls for the receipt until `timeout`; a missing receipt surfaces as
    /// `ReceiptTimeout`, a status-0 receipt as `Reverted`.
    pub async fn wait_for_receipt(
        &self,
        hash: H256,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<TransactionReceipt, ClientError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match self.provider.get_transaction_receipt(hash).await {
                Ok(Some(receipt)) => {
                    if receipt.status == Some(U64::zero()) {
                        return Err(ClientError::Reverted(hash));
                    }
                    return Ok(receipt);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        target: "client",
                        account = self.account_id,
                        network = %self.network.name,
                        error = %e,
                        "receipt poll error; continuing"
                    );
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ClientError::ReceiptTimeout {
                    tx: hash,
                    timeout_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// 32-byte left-zero-padded form of an address, as LayerZero destination
/// arguments expect it.
pub fn address_to_bytes32(address: Address) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[12..].copy_from_slice(address.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_pads_left_to_32_bytes() {
        let addr = Address::from_str("0x9Aa02D4Fae7F58b8E8f34c66E756cC734DAc7fe4").unwrap();
        let padded = address_to_bytes32(addr);
        assert_eq!(&padded[..12], &[0u8; 12]);
        assert_eq!(&padded[12..], addr.as_bytes());
    }

    #[tokio::test]
    async fn generated_wallet_binds_network_chain_id() {
        let networks = crate::networks::Networks::bootstrap();
        let net = networks.get(crate::networks::NetworkName::Polygon).unwrap();
        let client = ChainClient::new(1, None, net, None, false).await.unwrap();
        assert_eq!(client.wallet.chain_id(), 137);
    }

    #[tokio::test]
    async fn legacy_networks_produce_legacy_envelopes() {
        let networks = crate::networks::Networks::bootstrap();
        let net = networks.get(crate::networks::NetworkName::Bsc).unwrap();
        let client = ChainClient::new(1, None, net, None, false).await.unwrap();
        let tx = client.new_tx(Address::zero(), Bytes::new(), U256::zero());
        assert!(matches!(tx, TypedTransaction::Legacy(_)));
    }
}
