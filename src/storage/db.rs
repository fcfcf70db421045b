//! # Database Bootstrap
//!
//! Opens (and creates, if missing) the SQLite store and applies the schema.
//! Foreign keys are enabled at the connection level so account deletes
//! cascade into the operation tables.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use tracing::info;

use crate::errors::StoreError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    account_name            TEXT,
    evm_private_key         TEXT NOT NULL UNIQUE,
    evm_address             TEXT NOT NULL UNIQUE,
    next_action_time        TEXT,
    planned_swaps_count     INTEGER NOT NULL DEFAULT 0,
    planned_mints_count     INTEGER NOT NULL DEFAULT 0,
    planned_bridges_count   INTEGER NOT NULL DEFAULT 0,
    planned_stakes_count    INTEGER NOT NULL DEFAULT 0,
    completed               INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at              TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS bridges (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    from_network    TEXT NOT NULL,
    to_network      TEXT NOT NULL,
    src_amount      TEXT NOT NULL,
    src_token       TEXT NOT NULL,
    dst_amount      TEXT NOT NULL,
    dst_token       TEXT NOT NULL,
    volume_usd      REAL NOT NULL,
    fee             TEXT NOT NULL,
    fee_in_usd      REAL NOT NULL,
    platform        TEXT NOT NULL,
    tx_hash         TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS swaps (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    network         TEXT NOT NULL,
    src_amount      TEXT NOT NULL,
    src_token       TEXT NOT NULL,
    dst_amount      TEXT NOT NULL,
    dst_token       TEXT NOT NULL,
    volume_usd      REAL NOT NULL,
    fee             TEXT NOT NULL,
    fee_in_usd      REAL NOT NULL,
    platform        TEXT NOT NULL,
    tx_hash         TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS mints (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    nft             TEXT NOT NULL,
    quantity        INTEGER NOT NULL DEFAULT 1,
    mint_price      TEXT NOT NULL,
    mint_price_usd  REAL NOT NULL,
    platform        TEXT NOT NULL,
    tx_hash         TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS stakes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id      INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    token           TEXT NOT NULL,
    amount          TEXT NOT NULL,
    unfreeze_date   TEXT,
    platform        TEXT NOT NULL,
    tx_hash         TEXT NOT NULL,
    created_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Opens the pool and applies the schema. The database file is created on
/// first run.
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    // An in-memory database exists per connection; keep the pool at one so
    // every session sees the same schema.
    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    // Raw execute: the schema is a multi-statement script.
    pool.execute(SCHEMA).await?;
    info!(target: "storage", url = %database_url, "database ready");
    Ok(pool)
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    connect("sqlite::memory:").await.expect("in-memory pool")
}
