//! # Account Runner
//!
//! Imports accounts from the key file, then supervises per-account tasks: a
//! shuffled queue drained by up to `threads` concurrent workers, strict
//! serial module execution within an account, Ctrl-C cancellation through a
//! `CancellationToken`. One account's failure never poisons the pool.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::sqlite::SqlitePool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapter::Adapter;
use crate::adapters::{
    coredao::CoreDaoBridge, maverick::Maverick, mute::Mute, spacefi::SpaceFi,
    stargate::Stargate, syncswap::SyncSwap, testnet_bridge::TestnetBridge,
};
use crate::cex::{Cex, WithdrawalHandle};
use crate::config::{read_private_keys, Settings};
use crate::engine::{sample_secs, Engine};
use crate::errors::{ConfigError, EngineError};
use crate::networks::NetworkName;
use crate::starknet::amm::amm_by_module;
use crate::starknet::StarknetClient;
use crate::storage::{Account, NewAccount, NewBridge, OperationKind, ServiceUnitOfWork};

/// Modules whose outcome decrements the bridges counter.
const BRIDGE_MODULES: &[&str] = &[
    "layerzero-warmup",
    "cex-top-up",
    "stargate",
    "coredao-bridge",
    "testnet-bridge",
];

/// EVM adapter roster keyed by config module name. The LayerZero warmup
/// drives the Stargate routes.
pub fn adapter_for(module: &str) -> Option<Box<dyn Adapter>> {
    match module {
        "stargate" | "layerzero-warmup" => Some(Box::new(Stargate::new())),
        "coredao-bridge" => Some(Box::new(CoreDaoBridge::new())),
        "testnet-bridge" => Some(Box::new(TestnetBridge::new())),
        "mute" => Some(Box::new(Mute::new())),
        "maverick" => Some(Box::new(Maverick::new())),
        "syncswap" => Some(Box::new(SyncSwap::new())),
        "space_fi" => Some(Box::new(SpaceFi::new())),
        _ => None,
    }
}

fn sample_count(range: [u32; 2]) -> i64 {
    if range[1] > range[0] {
        rand::thread_rng().gen_range(range[0]..=range[1]) as i64
    } else {
        range[0] as i64
    }
}

/// One fresh `(swaps, bridges)` quota draw; called once per account so the
/// count ranges actually spread across the roster.
fn sample_planned(settings: &Settings) -> (i64, i64) {
    let mut swaps = 0i64;
    let mut bridges = 0i64;
    for module in &settings.routes {
        let count = sample_count(settings.module(module).count);
        if BRIDGE_MODULES.contains(&module.as_str()) {
            bridges += count;
        } else {
            swaps += count;
        }
    }
    (swaps, bridges)
}

/// Derives the checksummed address from a private key.
pub fn address_of(private_key: &str) -> Result<String, ConfigError> {
    let wallet =
        LocalWallet::from_str(private_key).map_err(|_| ConfigError::InvalidPrivateKey(0))?;
    Ok(format!("{:#x}", wallet.address()))
}

/// Imports the key file into the store. Idempotent: keys already present are
/// left untouched. Planned counters are sampled from the module `count`
/// ranges on first import.
pub async fn import_accounts(
    pool: &SqlitePool,
    settings: &Settings,
    keys_path: &str,
) -> Result<Vec<Account>, EngineError> {
    let keys = read_private_keys(keys_path).await?;

    let mut uow = ServiceUnitOfWork::begin(pool).await?;
    let mut accounts = Vec::with_capacity(keys.len());
    let mut imported = 0usize;
    for key in &keys {
        if let Some(existing) = uow.accounts().get_by_evm_private_key(key).await? {
            accounts.push(existing);
            continue;
        }
        let address = address_of(key)?;
        let (planned_swaps, planned_bridges) = sample_planned(settings);
        let new = NewAccount::new(key, &address)?
            .with_planned(planned_swaps, 0, planned_bridges, 0);
        accounts.push(uow.accounts().add(&new).await?);
        imported += 1;
    }
    uow.commit().await?;
    info!(
        target: "runner",
        total = accounts.len(),
        imported,
        "account import finished"
    );
    Ok(accounts)
}

/// Everything a per-account worker needs, shared by `Arc`.
pub struct Runner {
    pub engine: Arc<Engine>,
    pub settings: Arc<Settings>,
    /// Exchange client for `cex-top-up`; the module is skipped when absent.
    pub cex: Option<Arc<dyn Cex>>,
    /// Starknet credentials keyed by EVM private key.
    pub starknet_accounts: HashMap<String, (String, String)>,
}

impl Runner {
    /// Drains the shuffled account queue with up to `threads` workers.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), EngineError> {
        let now = chrono::Utc::now().naive_utc();
        let mut accounts = {
            let mut uow = ServiceUnitOfWork::begin(&self.engine.pool).await?;
            let ready = uow.accounts().get_all_ready(now).await?;
            uow.commit().await?;
            ready
        };
        accounts.shuffle(&mut rand::thread_rng());
        info!(target: "runner", ready = accounts.len(), "starting account queue");

        let limit = self.settings.threads.unwrap_or(accounts.len().max(1));
        let mut queue = accounts.into_iter();
        let mut workers: JoinSet<()> = JoinSet::new();

        loop {
            while workers.len() < limit {
                let Some(account) = queue.next() else { break };
                let runner = Arc::clone(&self);
                let token = cancel.clone();
                workers.spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!(target: "runner", account = account.id, "cancelled before start");
                        }
                        _ = runner.run_account(&account) => {}
                    }
                });
            }
            if workers.is_empty() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(target: "runner", "shutdown requested; waiting for in-flight accounts");
                    while workers.join_next().await.is_some() {}
                    return Err(EngineError::Shutdown);
                }
                joined = workers.join_next() => {
                    if let Some(Err(e)) = joined {
                        error!(target: "runner", error = %e, "account task panicked");
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the configured route for one account, strictly serially. A module
    /// failure is logged and ends this account's run without touching others.
    async fn run_account(&self, account: &Account) {
        let mut modules = self.settings.routes.clone();
        modules.shuffle(&mut rand::thread_rng());

        for module in &modules {
            let result = self.run_one_module(account, module).await;
            match result {
                Ok(()) => {}
                Err(EngineError::NoEligibleSource) => {
                    warn!(
                        target: "runner",
                        account = account.id,
                        module = %module,
                        status = "WARNING",
                        "no funded source in range; module skipped"
                    );
                }
                Err(e) => {
                    error!(
                        target: "runner",
                        account = account.id,
                        module = %module,
                        status = "FAILED",
                        error = %e,
                        "module failed; account run aborted"
                    );
                    return;
                }
            }
        }
    }

    async fn run_one_module(&self, account: &Account, module: &str) -> Result<(), EngineError> {
        let settings = self.settings.module(module);

        if let Some(adapter) = adapter_for(module) {
            return self
                .engine
                .run_module(account, adapter.as_ref(), module, &settings, None)
                .await;
        }

        if let Some(amm) = amm_by_module(module) {
            let Some((key, address)) = self.starknet_accounts.get(&account.evm_private_key)
            else {
                warn!(
                    target: "runner",
                    account = account.id,
                    module,
                    status = "WARNING",
                    "no Starknet credentials for this account; module skipped"
                );
                return Ok(());
            };
            let network = self.engine.networks.get(NetworkName::Starknet)?;
            let client = StarknetClient::new(account.id, key, address, &network)?;
            return self
                .engine
                .run_starknet_module(account, &client, amm.as_ref(), module, &settings)
                .await;
        }

        if module == "cex-top-up" {
            let Some(_cex) = self.cex.as_ref() else {
                warn!(
                    target: "runner",
                    account = account.id,
                    module,
                    status = "WARNING",
                    "no exchange client wired; module skipped"
                );
                return Ok(());
            };
            return self.top_up(account).await;
        }

        warn!(
            target: "runner",
            account = account.id,
            module,
            status = "WARNING",
            "module recognized but has no driver; skipped"
        );
        Ok(())
    }

    /// Withdraws from the exchange, waits for arrival and records the
    /// outcome like any other bridge.
    async fn top_up(&self, account: &Account) -> Result<(), EngineError> {
        let cex = self.cex.as_ref().expect("checked by caller");
        let settings = self.settings.module("cex-top-up");
        let network = NetworkName::Arbitrum;
        let amount = crate::amount::TokenAmount::from_ether(
            rust_decimal::Decimal::try_from(settings.min_balance).unwrap_or_default(),
            18,
        )
        .map_err(EngineError::Contract)?;
        let to = ethers::types::Address::from_str(&account.evm_address)
            .map_err(|e| EngineError::Other(e.to_string()))?;
        let handle = crate::cex::withdraw_with_retry(
            cex.as_ref(),
            crate::tokens::TokenSymbol::Eth,
            network,
            to,
            &amount,
        )
        .await?;
        cex.await_arrival(&handle, std::time::Duration::from_secs(1800))
            .await?;

        let price = self
            .engine
            .oracle
            .usd_price(crate::tokens::TokenSymbol::Eth)
            .await?;
        let volume_usd = amount.ether_f64() * price;
        persist_top_up(
            &self.engine.pool,
            account.id,
            &handle,
            cex.name(),
            volume_usd,
            settings.delay.between_modules,
        )
        .await?;

        info!(
            target: "runner",
            account = account.id,
            network = %network,
            status = "DEPOSITED",
            amount = %amount,
            "top-up arrived"
        );
        Ok(())
    }
}

/// Bridge record, bridges-counter decrement and the next action time, all in
/// one transaction; completion flips in the same scope once every counter is
/// spent.
async fn persist_top_up(
    pool: &SqlitePool,
    account_id: i64,
    handle: &WithdrawalHandle,
    exchange: &str,
    volume_usd: f64,
    delay_range: [u64; 2],
) -> Result<(), EngineError> {
    let mut uow = ServiceUnitOfWork::begin(pool).await?;
    uow.bridges()
        .add(&NewBridge {
            account_id,
            from_network: exchange.to_string(),
            to_network: handle.network.to_string(),
            src_amount: handle.amount.ether().to_string(),
            src_token: handle.symbol.to_string(),
            dst_amount: handle.amount.ether().to_string(),
            dst_token: handle.symbol.to_string(),
            volume_usd,
            fee: "0".to_string(),
            fee_in_usd: 0.0,
            platform: exchange.to_string(),
            tx_hash: handle.id.clone(),
        })
        .await?;
    uow.accounts()
        .decrement_planned(account_id, OperationKind::Bridge)
        .await?;
    let delay = sample_secs(delay_range);
    let next = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(delay as i64);
    uow.accounts()
        .set_next_action_time(account_id, next)
        .await?;
    uow.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModuleSettings, KNOWN_MODULES};

    #[test]
    fn every_known_module_has_a_driver() {
        for module in KNOWN_MODULES {
            let evm = adapter_for(module).is_some();
            let stark = amm_by_module(module).is_some();
            let cex = *module == "cex-top-up";
            assert!(evm || stark || cex, "module {module} has no driver");
        }
    }

    #[test]
    fn bridge_modules_partition_matches_roster() {
        for module in BRIDGE_MODULES {
            assert!(KNOWN_MODULES.contains(module));
        }
        assert!(!BRIDGE_MODULES.contains(&"mute"));
    }

    #[test]
    fn address_derivation_matches_known_vector() {
        // The all-ones key has a fixed, well-known address.
        let key = format!("0x{}", "01".repeat(32));
        let address = address_of(&key).unwrap();
        assert_eq!(address.len(), 42);
        assert!(address.starts_with("0x"));
    }

    #[test]
    fn planned_count_sampling_respects_bounds() {
        for _ in 0..20 {
            let n = sample_count([2, 5]);
            assert!((2..=5).contains(&n));
        }
        assert_eq!(sample_count([3, 3]), 3);
    }

    #[test]
    fn planned_quotas_vary_across_accounts() {
        let mut modules = HashMap::new();
        modules.insert(
            "mute".to_string(),
            ModuleSettings {
                count: [0, 100_000],
                ..ModuleSettings::default()
            },
        );
        let settings = Settings {
            routes: vec!["mute".into(), "stargate".into()],
            threads: None,
            database_url: "sqlite::memory:".into(),
            modules,
        };
        let swap_quotas: std::collections::HashSet<i64> =
            (0..16).map(|_| sample_planned(&settings).0).collect();
        assert!(swap_quotas.len() > 1, "quota draws collapsed to one value");

        // The stargate default count is fixed, so the bridge side is stable.
        let (_, bridges) = sample_planned(&settings);
        assert_eq!(bridges, 1);
    }

    #[tokio::test]
    async fn top_up_outcome_lands_in_one_transaction() {
        let pool = crate::storage::connect("sqlite::memory:").await.unwrap();
        let key = format!("0x{}", "11".repeat(32));
        let address = address_of(&key).unwrap();
        let account = {
            let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
            let new = NewAccount::new(&key, &address)
                .unwrap()
                .with_planned(0, 0, 1, 0);
            let account = uow.accounts().add(&new).await.unwrap();
            uow.commit().await.unwrap();
            account
        };

        let handle = WithdrawalHandle {
            id: "w-42".into(),
            symbol: crate::tokens::TokenSymbol::Eth,
            network: NetworkName::Arbitrum,
            amount: crate::amount::TokenAmount::from_wei(
                ethers::types::U256::exp10(16),
                18,
            )
            .unwrap(),
        };
        persist_top_up(&pool, account.id, &handle, "okx", 30.0, [0, 0])
            .await
            .unwrap();

        let mut uow = ServiceUnitOfWork::begin(&pool).await.unwrap();
        let stored = uow.accounts().get_by_id(account.id).await.unwrap();
        assert_eq!(stored.planned_bridges_count, 0);
        assert!(stored.completed, "spent quota must flip completion");
        assert!(stored.next_action_time.is_some());
        assert_eq!(uow.bridges().count(account.id).await.unwrap(), 1);
        let bridges = uow.bridges().get_all_by_account_id(account.id).await.unwrap();
        assert_eq!(bridges[0].platform, "okx");
        assert_eq!(bridges[0].to_network, "Arbitrum");
        assert_eq!(bridges[0].tx_hash, "w-42");
        uow.commit().await.unwrap();
    }
}
