//! # chainflow
//!
//! Multi-account, multi-chain transaction orchestration: scripted swap and
//! bridge routes across EVM networks and Starknet, interleaved with exchange
//! top-ups, with per-account quotas persisted in SQLite.

pub mod abi;
pub mod adapter;
pub mod adapters;
pub mod amount;
pub mod cex;
pub mod client;
pub mod config;
pub mod contracts;
pub mod engine;
pub mod errors;
pub mod networks;
pub mod price_oracle;
pub mod proposal;
pub mod runner;
pub mod starknet;
pub mod storage;
pub mod tokens;
