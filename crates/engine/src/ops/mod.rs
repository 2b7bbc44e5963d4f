use std::sync::atomic::{AtomicBool, Ordering};

use sea_orm::{
    AccessMode, ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr,
    EntityTrait, IsolationLevel, QuerySelect, TransactionTrait,
};

use crate::{EngineError, ResultEngine, RetryPolicy};

mod audit;
mod history;
mod transfers;
mod wallets;

pub use audit::{AuditReport, BalanceDrift};
pub use history::{HistoryPage, MAX_HISTORY_COUNT};

/// Run a block inside a DB transaction, committing on success and rolling
/// back (by dropping the transaction) on error.
macro_rules! with_tx {
    ($begin:expr, |$tx:ident| $body:expr) => {{
        let $tx = $begin;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    retry: RetryPolicy,
    /// Set once a fatal error is observed. Mutations stay disabled until the
    /// process is restarted.
    halted: AtomicBool,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Returns `true` once a fatal error disabled mutations.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> ResultEngine<()> {
        if self.is_halted() {
            return Err(EngineError::Halted);
        }
        Ok(())
    }

    /// Record a fatal error by halting the engine, then hand the error back.
    fn observe(&self, err: EngineError) -> EngineError {
        if err.is_fatal()
            && !matches!(err, EngineError::Halted)
            && !self.halted.swap(true, Ordering::SeqCst)
        {
            tracing::error!("halting ledger mutations: {err}");
        }
        err
    }

    /// Begin a unit of work that writes.
    ///
    /// Postgres and MySQL run it as `SERIALIZABLE`; SQLite transactions are
    /// serializable already and reject per-transaction isolation settings.
    async fn begin_write(&self) -> ResultEngine<DatabaseTransaction> {
        let isolation = match self.database.get_database_backend() {
            DbBackend::Sqlite => None,
            _ => Some(IsolationLevel::Serializable),
        };
        Ok(self.database.begin_with_config(isolation, None).await?)
    }

    /// Begin a read-only unit of work with a stable snapshot.
    async fn begin_read(&self) -> ResultEngine<DatabaseTransaction> {
        let (isolation, access) = match self.database.get_database_backend() {
            DbBackend::Sqlite => (None, None),
            _ => (
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            ),
        };
        Ok(self.database.begin_with_config(isolation, access).await?)
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    retry: RetryPolicy,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Override the default retry policy for conflicting transfers.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> EngineBuilder {
        self.retry = retry;
        self
    }

    /// Construct `Engine`.
    ///
    /// Probes both tables so a missing or outdated schema is reported here
    /// instead of on the first transfer.
    pub async fn build(self) -> ResultEngine<Engine> {
        let probe = async {
            crate::wallets::Entity::find()
                .limit(1)
                .all(&self.database)
                .await?;
            crate::transfers::Entity::find()
                .limit(1)
                .all(&self.database)
                .await?;
            Ok::<(), DbErr>(())
        };
        if let Err(err) = probe.await {
            let err = EngineError::from(err);
            if err.is_fatal() {
                return Err(EngineError::Corrupted(format!("schema mismatch: {err}")));
            }
            return Err(err);
        }

        Ok(Engine {
            database: self.database,
            retry: self.retry,
            halted: AtomicBool::new(false),
        })
    }
}
