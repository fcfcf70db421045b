use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chainflow::config::{read_starknet_accounts, Settings};
use chainflow::engine::Engine;
use chainflow::networks::Networks;
use chainflow::price_oracle::PriceOracle;
use chainflow::runner::{import_accounts, Runner};
use chainflow::storage;
use chainflow::tokens::TokenRegistry;

const PRIVATE_KEYS_PATH: &str = "user_data/input_data/private_keys.txt";
const STARKNET_ACCOUNTS_PATH: &str = "user_data/input_data/starknet_accounts.txt";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(target: "main", status = "CRITICAL", error = %e, "fatal error");
        std::process::exit(1);
    }
}

async fn run() -> eyre::Result<()> {
    let settings = Arc::new(Settings::load(Settings::default_path()).await?);
    let pool = storage::connect(&settings.database_url).await?;

    let networks = Arc::new(Networks::bootstrap());
    let tokens = Arc::new(TokenRegistry::bootstrap());
    let oracle = Arc::new(PriceOracle::new());
    let engine = Arc::new(Engine::new(networks, tokens, oracle, pool.clone()));

    let accounts = import_accounts(&pool, &settings, PRIVATE_KEYS_PATH).await?;

    // Starknet credentials are optional and positionally aligned with the
    // key file.
    let starknet_accounts = match read_starknet_accounts(STARKNET_ACCOUNTS_PATH).await {
        Ok(pairs) => accounts
            .iter()
            .zip(pairs)
            .map(|(account, pair)| (account.evm_private_key.clone(), pair))
            .collect(),
        Err(_) => HashMap::new(),
    };

    let cancel = CancellationToken::new();
    let ctrlc_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "main", "Ctrl-C received; cancelling");
            ctrlc_token.cancel();
        }
    });

    let runner = Arc::new(Runner {
        engine,
        settings,
        cex: None,
        starknet_accounts,
    });
    match runner.run(cancel).await {
        Ok(()) => {
            info!(target: "main", status = "SUCCESS", "all account runs finished");
            Ok(())
        }
        Err(chainflow::errors::EngineError::Shutdown) => {
            info!(target: "main", "shut down cleanly");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
