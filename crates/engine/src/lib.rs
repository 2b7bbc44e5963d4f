//! Wallet ledger engine.
//!
//! The engine owns the only write path to wallets and transfers. It is built
//! around a sea-orm [`DatabaseConnection`](sea_orm::DatabaseConnection)
//! handed in through [`Engine::builder`]; every operation runs as one store
//! transaction and the store's isolation is the only lock over balances.

pub use commands::TransferCmd;
pub use error::EngineError;
pub use money::Money;
pub use ops::{AuditReport, BalanceDrift, Engine, EngineBuilder, HistoryPage, MAX_HISTORY_COUNT};
pub use retry::{RetryPolicy, StoreFailure, classify};
pub use transfers::Transfer;
pub use wallets::Wallet;

mod commands;
mod error;
mod money;
mod ops;
mod retry;
mod transfers;
mod util;
mod wallets;

type ResultEngine<T> = Result<T, EngineError>;
