//! # Persistence
//!
//! sqlx/SQLite layer: pool bootstrap with create-on-startup schema,
//! row-mapped entities, and a unit of work owning one transaction per
//! module invocation.

pub mod db;
pub mod entities;
pub mod uow;

pub use db::connect;
pub use entities::{
    Account, Bridge, Mint, NewAccount, NewBridge, NewMint, NewStake, NewSwap, OperationKind,
    Stake, Swap,
};
pub use uow::ServiceUnitOfWork;
