//! # Operation Engine
//!
//! The top-level random-route driver. Given an adapter and the module's
//! settings it picks a funded source (network, token) pair, samples a
//! destination leg, builds and broadcasts the transaction, and persists the
//! outcome together with the account's counter decrement in one unit of
//! work. Slippage reverts widen the tolerance and retry; fee-cap refusals
//! abort without retry.

use std::sync::Arc;
use std::time::Duration;

use ethers::types::{NameOrAddress, H256};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::sqlite::SqlitePool;
use ::starknet::core::types::Felt;
use tracing::{error, info, warn};

use crate::adapter::{Adapter, AdapterContext, RouteLeg};
use crate::amount::TokenAmount;
use crate::client::{ChainClient, RECEIPT_POLL_INTERVAL};
use crate::config::ModuleSettings;
use crate::contracts::{set_gas_limit, set_gas_price, ApproveOutcome, ContractFacade};
use crate::errors::{match_slippage_selector, AdapterError, ClientError, EngineError};
use crate::networks::{NetworkName, Networks};
use crate::price_oracle::PriceOracle;
use crate::proposal::{AmountPolicy, OperationInfo, OperationProposal, ProposalBuilder};
use crate::starknet::amm::StarknetAmm;
use crate::starknet::{stark_token, StarknetClient};
use crate::storage::{
    entities::{NewBridge, NewSwap},
    Account, OperationKind, ServiceUnitOfWork,
};
use crate::tokens::{TokenRegistry, TokenSymbol};

/// Bound on the widen-and-retry loop for slippage reverts.
pub const MAX_SLIPPAGE_RETRIES: u32 = 3;
/// Tolerance multiplier per retry.
pub const SLIPPAGE_WIDENING: f64 = 1.25;

const SWAP_RECEIPT_TIMEOUT: Duration = Duration::from_secs(240);
const BRIDGE_RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);
const STARKNET_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Widens slippage one step, capped at 100 %.
pub fn widen_slippage(slippage: f64) -> f64 {
    (slippage * SLIPPAGE_WIDENING).min(100.0)
}

/// The USD fee-cap decision. A breach aborts the attempt; the resulting
/// error is never classified as a slippage revert, so the retry loop
/// surfaces it unchanged.
pub fn check_fee_cap(fee_usd: f64, cap_usd: f64) -> Result<(), EngineError> {
    if fee_usd > cap_usd {
        Err(EngineError::FeeCapExceeded { fee_usd, cap_usd })
    } else {
        Ok(())
    }
}

/// Uniform sample from an inclusive `[min, max]` pair.
pub(crate) fn sample_secs(range: [u64; 2]) -> u64 {
    if range[1] > range[0] {
        rand::thread_rng().gen_range(range[0]..=range[1])
    } else {
        range[0]
    }
}

/// The native coin of a network as an oracle symbol.
fn coin_token(coin_symbol: &str) -> TokenSymbol {
    match coin_symbol {
        "BNB" => TokenSymbol::Bnb,
        "POL" => TokenSymbol::Pol,
        "AVAX" => TokenSymbol::Avax,
        "FTM" => TokenSymbol::Ftm,
        "CORE" => TokenSymbol::Core,
        _ => TokenSymbol::Eth,
    }
}

/// Slippage classification over every layer an attempt can fail in.
fn slippage_selector_of(err: &EngineError) -> Option<&'static str> {
    match err {
        EngineError::Adapter(AdapterError::SlippageRevert { selector }) => {
            match_slippage_selector(selector)
        }
        EngineError::Adapter(AdapterError::Client(ClientError::Rpc(msg)))
        | EngineError::Client(ClientError::Rpc(msg)) => match_slippage_selector(msg),
        _ => None,
    }
}

/// Shared, immutable engine state; one instance serves every account task.
pub struct Engine {
    pub networks: Arc<Networks>,
    pub tokens: Arc<TokenRegistry>,
    pub oracle: Arc<PriceOracle>,
    pub pool: SqlitePool,
}

struct PickedSource {
    client: ChainClient,
    token: TokenSymbol,
    leg: RouteLeg,
}

impl Engine {
    pub fn new(
        networks: Arc<Networks>,
        tokens: Arc<TokenRegistry>,
        oracle: Arc<PriceOracle>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            networks,
            tokens,
            oracle,
            pool,
        }
    }

    /// Runs one module for one account end to end.
    pub async fn run_module(
        &self,
        account: &Account,
        adapter: &dyn Adapter,
        module: &str,
        settings: &ModuleSettings,
        proxy: Option<&str>,
    ) -> Result<(), EngineError> {
        let source = self
            .pick_source(account, adapter, settings, proxy)
            .await?;
        info!(
            target: "engine",
            account = account.id,
            module,
            network = %source.client.network.name,
            token = %source.token,
            status = "FOUND",
            "eligible source selected"
        );
        self.execute(account, adapter, module, settings, &source)
            .await
    }

    /// Shuffled walk over the adapter's source networks and tokens; the first
    /// balance inside the module's `[min, max]` range wins.
    async fn pick_source(
        &self,
        account: &Account,
        adapter: &dyn Adapter,
        settings: &ModuleSettings,
        proxy: Option<&str>,
    ) -> Result<PickedSource, EngineError> {
        let mut networks: Vec<NetworkName> = adapter
            .route_table()
            .source_networks()
            .into_iter()
            .filter(NetworkName::is_evm)
            .collect();
        networks.shuffle(&mut rand::thread_rng());

        for net_name in networks {
            let net = self.networks.get(net_name)?;
            let client = ChainClient::new(
                account.id,
                Some(&account.evm_private_key),
                net,
                proxy.map(str::to_string),
                false,
            )
            .await?;
            let facade = ContractFacade::new(&client);

            let mut symbols = adapter.route_table().source_tokens(net_name);
            symbols.shuffle(&mut rand::thread_rng());

            for symbol in symbols {
                let token = self
                    .tokens
                    .get(net_name, symbol)
                    .map_err(EngineError::Contract)?;
                let balance_wei = facade
                    .balance_of(&token, client.address())
                    .await
                    .map_err(EngineError::Contract)?;
                let decimals = facade
                    .decimals(&token)
                    .await
                    .map_err(EngineError::Contract)?;
                let balance = TokenAmount::from_wei(balance_wei, decimals)
                    .map_err(EngineError::Contract)?;
                let ether = balance.ether_f64();
                if ether < settings.min_balance || ether > settings.max_balance {
                    continue;
                }

                let leg = adapter
                    .route_table()
                    .destinations(net_name, symbol)
                    .choose(&mut rand::thread_rng())
                    .cloned();
                if let Some(leg) = leg {
                    return Ok(PickedSource {
                        client,
                        token: symbol,
                        leg,
                    });
                }
            }
        }
        Err(EngineError::NoEligibleSource)
    }

    /// The build / cap / approve / send / confirm pipeline, with the
    /// slippage-widening retry loop around it.
    async fn execute(
        &self,
        account: &Account,
        adapter: &dyn Adapter,
        module: &str,
        settings: &ModuleSettings,
        source: &PickedSource,
    ) -> Result<(), EngineError> {
        let mut slippage = settings.slippage;
        let mut attempt = 0u32;
        loop {
            match self
                .attempt(account, adapter, module, settings, source, slippage)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    if let Some(selector) = slippage_selector_of(&err) {
                        if attempt < MAX_SLIPPAGE_RETRIES {
                            attempt += 1;
                            slippage = widen_slippage(slippage);
                            warn!(
                                target: "engine",
                                account = account.id,
                                module,
                                status = "WARNING",
                                selector,
                                attempt,
                                slippage,
                                "slippage revert; retrying with widened tolerance"
                            );
                            continue;
                        }
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        account: &Account,
        adapter: &dyn Adapter,
        module: &str,
        settings: &ModuleSettings,
        source: &PickedSource,
        slippage: f64,
    ) -> Result<(), EngineError> {
        let client = &source.client;
        let src_network = client.network.name;
        let is_bridge = source.leg.dst_network != src_network;

        let mut info = OperationInfo::new(
            source.token,
            source.leg.dst_token,
            AmountPolicy::PercentRange {
                min: settings.amount_percent[0],
                max: settings.amount_percent[1],
            },
        )
        .with_slippage(slippage);
        if is_bridge {
            info = info.to_network(source.leg.dst_network);
        }

        let builder = ProposalBuilder {
            client,
            networks: &self.networks,
            tokens: &self.tokens,
            oracle: &self.oracle,
        };
        let proposal = builder.build(&info).await?;
        if proposal.amount_from.is_zero() {
            info!(
                target: "engine",
                account = account.id,
                module,
                status = "INFO",
                "zero-amount proposal; skipping"
            );
            return Ok(());
        }

        let ctx = AdapterContext {
            client,
            networks: &self.networks,
            tokens: &self.tokens,
            oracle: &self.oracle,
            leg: &source.leg,
        };
        let plan = adapter.build_tx(&proposal, &info, &ctx).await?;

        // Fee cap, in USD on the source network's native coin. A breach
        // aborts the operation outright.
        let coin = coin_token(client.network.coin_symbol);
        let coin_price = self.oracle.usd_price(coin).await?;
        let fee = TokenAmount::from_wei(plan.native_fee, client.network.decimals)
            .map_err(EngineError::Contract)?;
        let fee_usd = fee.ether_f64() * coin_price;
        if let Err(err) = check_fee_cap(fee_usd, settings.max_fee_in_usd) {
            error!(
                target: "engine",
                account = account.id,
                module,
                network = %src_network,
                status = "ERROR",
                fee_usd,
                cap_usd = settings.max_fee_in_usd,
                "network fee above the configured cap"
            );
            return Err(err);
        }

        // Volume is priced before broadcast so a post-send oracle hiccup
        // cannot fail a confirmed operation.
        let src_price = self.oracle.usd_price(source.token).await?;
        let volume_usd = proposal.amount_from.ether_f64() * src_price;

        let mut tx = plan.tx.clone();
        // Gas overrides land before the approval branch so the approval
        // reuses the same hints.
        if let Some(price) = info.gas_price.clone() {
            set_gas_price(&mut tx, price);
        }
        if let Some(limit) = info.gas_limit {
            set_gas_limit(&mut tx, limit);
        }
        let gas_multiplier = info.gas_multiplier.unwrap_or(1.0);

        if proposal.from_token.is_native {
            tx.set_value(plan.native_fee + proposal.amount_from.wei());
        } else {
            let spender = match tx.to() {
                Some(NameOrAddress::Address(addr)) => *addr,
                _ => {
                    return Err(EngineError::Other(
                        "adapter produced a transaction without a destination".into(),
                    ))
                }
            };
            let facade = ContractFacade::new(client);
            let outcome = facade
                .approve(
                    &proposal.from_token,
                    spender,
                    proposal.amount_from.wei(),
                    false,
                    Some(&tx),
                    gas_multiplier,
                )
                .await
                .map_err(EngineError::Contract)?;
            if matches!(outcome, ApproveOutcome::Approved(_)) {
                let pause = sample_secs(settings.delay.before_tx_receipt);
                info!(
                    target: "engine",
                    account = account.id,
                    module,
                    status = "DELAY",
                    seconds = pause,
                    "sleeping after approval"
                );
                tokio::time::sleep(Duration::from_secs(pause)).await;
            }
            tx.set_value(plan.native_fee);
        }

        client.auto_add_params(&mut tx, gas_multiplier).await?;

        let hash = client.sign_and_send(&tx).await?;
        let timeout = if is_bridge {
            BRIDGE_RECEIPT_TIMEOUT
        } else {
            SWAP_RECEIPT_TIMEOUT
        };
        client
            .wait_for_receipt(hash, timeout, RECEIPT_POLL_INTERVAL)
            .await?;

        self.persist_outcome(
            account,
            adapter.name(),
            settings,
            src_network,
            &source.leg,
            &proposal,
            &fee,
            fee_usd,
            volume_usd,
            hash,
        )
        .await?;

        info!(
            target: "engine",
            account = account.id,
            module,
            network = %src_network,
            status = if is_bridge { "BRIDGED" } else { "SWAPPED" },
            amount = %proposal.amount_from,
            token = %source.token,
            tx = %client.network.tx_url(&format!("{hash:?}")),
            "operation confirmed"
        );
        Ok(())
    }

    /// Operation record, counter decrement, completion flip and the next
    /// action time all land in one transaction.
    #[allow(clippy::too_many_arguments)]
    async fn persist_outcome(
        &self,
        account: &Account,
        platform: &str,
        settings: &ModuleSettings,
        src_network: NetworkName,
        leg: &RouteLeg,
        proposal: &OperationProposal,
        fee: &TokenAmount,
        fee_usd: f64,
        volume_usd: f64,
        hash: H256,
    ) -> Result<(), EngineError> {
        let is_bridge = leg.dst_network != src_network;
        let mut uow = ServiceUnitOfWork::begin(&self.pool).await?;

        if is_bridge {
            uow.bridges()
                .add(&NewBridge {
                    account_id: account.id,
                    from_network: src_network.to_string(),
                    to_network: leg.dst_network.to_string(),
                    src_amount: proposal.amount_from.ether().to_string(),
                    src_token: proposal.from_token.title.to_string(),
                    dst_amount: proposal.min_amount_to.ether().to_string(),
                    dst_token: leg.dst_token.to_string(),
                    volume_usd,
                    fee: fee.ether().to_string(),
                    fee_in_usd: fee_usd,
                    platform: platform.to_string(),
                    tx_hash: format!("{hash:?}"),
                })
                .await?;
        } else {
            uow.swaps()
                .add(&NewSwap {
                    account_id: account.id,
                    network: src_network.to_string(),
                    src_amount: proposal.amount_from.ether().to_string(),
                    src_token: proposal.from_token.title.to_string(),
                    dst_amount: proposal.min_amount_to.ether().to_string(),
                    dst_token: leg.dst_token.to_string(),
                    volume_usd,
                    fee: fee.ether().to_string(),
                    fee_in_usd: fee_usd,
                    platform: platform.to_string(),
                    tx_hash: format!("{hash:?}"),
                })
                .await?;
        }

        let kind = if is_bridge {
            OperationKind::Bridge
        } else {
            OperationKind::Swap
        };
        uow.accounts().decrement_planned(account.id, kind).await?;

        let delay = sample_secs(settings.delay.between_modules);
        let next = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(delay as i64);
        uow.accounts()
            .set_next_action_time(account.id, next)
            .await?;
        uow.commit().await?;
        Ok(())
    }

    /// Starknet counterpart of `run_module`: pick a funded pair, build the
    /// `[approve, swap]` sequence, execute and persist as a swap.
    pub async fn run_starknet_module(
        &self,
        account: &Account,
        client: &StarknetClient,
        amm: &dyn StarknetAmm,
        module: &str,
        settings: &ModuleSettings,
    ) -> Result<(), EngineError> {
        let mut pairs = amm.pairs();
        pairs.shuffle(&mut rand::thread_rng());

        for (from, to) in pairs {
            let from_token = match stark_token(from) {
                Some(t) => t,
                None => continue,
            };
            let to_token = match stark_token(to) {
                Some(t) => t,
                None => continue,
            };
            let balance_wei = client.balance_of(&from_token).await?;
            let balance = TokenAmount::from_wei(balance_wei, from_token.decimals)
                .map_err(EngineError::Contract)?;
            let ether = balance.ether_f64();
            if ether < settings.min_balance || ether > settings.max_balance {
                continue;
            }

            let amount_wei = crate::proposal::pick_amount_wei(
                &AmountPolicy::PercentRange {
                    min: settings.amount_percent[0],
                    max: settings.amount_percent[1],
                },
                balance_wei,
                from_token.decimals,
            )?;
            if amount_wei.is_zero() {
                continue;
            }
            let amount = TokenAmount::from_wei(amount_wei, from_token.decimals)
                .map_err(EngineError::Contract)?;
            let ratio = self.oracle.price_ratio(from, to).await?;
            let min_out = crate::proposal::min_destination(
                &amount,
                ratio,
                settings.slippage,
                to_token.decimals,
            )?;

            let request = crate::starknet::amm::request_for(
                from,
                to,
                amount_wei,
                min_out.wei(),
                client.address(),
            )?;
            let calls = amm.calls(&request)?;
            let tx_hash = client.execute(calls).await?;
            client
                .wait_for_receipt(tx_hash, SWAP_RECEIPT_TIMEOUT, STARKNET_POLL_INTERVAL)
                .await?;

            let volume_usd = amount.ether_f64() * self.oracle.usd_price(from).await?;
            self.persist_starknet_swap(
                account,
                amm.name(),
                settings,
                &amount,
                from,
                &min_out,
                to,
                volume_usd,
                tx_hash,
            )
            .await?;

            info!(
                target: "engine",
                account = account.id,
                module,
                network = %NetworkName::Starknet,
                status = "SWAPPED",
                amount = %amount,
                token = %from,
                tx = %format!("{tx_hash:#x}"),
                "operation confirmed"
            );
            return Ok(());
        }
        Err(EngineError::NoEligibleSource)
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_starknet_swap(
        &self,
        account: &Account,
        platform: &str,
        settings: &ModuleSettings,
        amount: &TokenAmount,
        from: TokenSymbol,
        min_out: &TokenAmount,
        to: TokenSymbol,
        volume_usd: f64,
        tx_hash: Felt,
    ) -> Result<(), EngineError> {
        let mut uow = ServiceUnitOfWork::begin(&self.pool).await?;
        uow.swaps()
            .add(&NewSwap {
                account_id: account.id,
                network: NetworkName::Starknet.to_string(),
                src_amount: amount.ether().to_string(),
                src_token: from.to_string(),
                dst_amount: min_out.ether().to_string(),
                dst_token: to.to_string(),
                volume_usd,
                fee: "0".to_string(),
                fee_in_usd: 0.0,
                platform: platform.to_string(),
                tx_hash: format!("{tx_hash:#x}"),
            })
            .await?;
        uow.accounts()
            .decrement_planned(account.id, OperationKind::Swap)
            .await?;
        let delay = sample_secs(settings.delay.between_modules);
        let next = chrono::Utc::now().naive_utc() + chrono::Duration::seconds(delay as i64);
        uow.accounts()
            .set_next_action_time(account.id, next)
            .await?;
        uow.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_widens_and_caps_at_hundred() {
        let mut s = 0.5;
        for _ in 0..MAX_SLIPPAGE_RETRIES {
            s = widen_slippage(s);
        }
        assert!((s - 0.9765625).abs() < 1e-9);
        assert_eq!(widen_slippage(95.0), 100.0);
        assert_eq!(widen_slippage(100.0), 100.0);
    }

    #[test]
    fn coin_symbols_map_to_oracle_tokens() {
        assert_eq!(coin_token("ETH"), TokenSymbol::Eth);
        assert_eq!(coin_token("POL"), TokenSymbol::Pol);
        assert_eq!(coin_token("BNB"), TokenSymbol::Bnb);
        assert_eq!(coin_token("CORE"), TokenSymbol::Core);
    }

    #[test]
    fn rpc_slippage_messages_are_classified() {
        let err = EngineError::Client(ClientError::Rpc(
            "execution reverted: 0xc9f52c71".into(),
        ));
        assert_eq!(slippage_selector_of(&err), Some("0xc9f52c71"));
        let other = EngineError::Client(ClientError::Rpc("nonce too low".into()));
        assert!(slippage_selector_of(&other).is_none());
    }

    #[test]
    fn fee_cap_refusal_aborts_without_retry() {
        assert!(check_fee_cap(0.49, 0.50).is_ok());
        assert!(check_fee_cap(0.50, 0.50).is_ok());

        let err = check_fee_cap(6.0, 0.50).unwrap_err();
        assert!(matches!(
            err,
            EngineError::FeeCapExceeded { fee_usd, cap_usd }
                if fee_usd == 6.0 && cap_usd == 0.50
        ));
        // Not a slippage revert, so the retry loop passes it straight up.
        assert!(slippage_selector_of(&err).is_none());
    }

    #[test]
    fn sampled_delays_stay_in_range() {
        for _ in 0..50 {
            let s = sample_secs([10, 30]);
            assert!((10..=30).contains(&s));
        }
        assert_eq!(sample_secs([60, 60]), 60);
    }
}
