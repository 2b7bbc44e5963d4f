//! Retry policy for units of work that lose a race against a concurrent one.
//!
//! The store reports conflicts in backend specific ways (Postgres SQLSTATE,
//! SQLite result codes). [`classify`] folds them into [`StoreFailure`] so the
//! engine can decide what is worth another attempt.

use std::time::Duration;

use sea_orm::{DbErr, RuntimeErr, sqlx};

/// Default number of attempts for a single transfer.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(500);

/// How many times, and how patiently, a conflicting unit of work is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    ///
    /// Exponential: `base * 2^(attempt - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .checked_mul(1u32 << exp)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// What a store error means for the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreFailure {
    /// Serialization failure, deadlock or a busy/locked database.
    Conflict,
    /// The connection (or the pool) went away.
    Connection,
    /// The schema does not match what the engine expects.
    Schema,
    Other,
}

/// Postgres: serialization_failure, deadlock_detected.
const PG_CONFLICT_CODES: [&str; 2] = ["40001", "40P01"];
/// Postgres: undefined_table, undefined_column.
const PG_SCHEMA_CODES: [&str; 2] = ["42P01", "42703"];
/// SQLite: BUSY, LOCKED, BUSY_RECOVERY, LOCKED_SHAREDCACHE, BUSY_SNAPSHOT.
const SQLITE_CONFLICT_CODES: [&str; 5] = ["5", "6", "261", "262", "517"];

pub fn classify(err: &DbErr) -> StoreFailure {
    let runtime = match err {
        DbErr::ConnectionAcquire(_) => return StoreFailure::Connection,
        DbErr::Conn(runtime) | DbErr::Exec(runtime) | DbErr::Query(runtime) => runtime,
        _ => return StoreFailure::Other,
    };

    let RuntimeErr::SqlxError(sqlx_err) = runtime else {
        return StoreFailure::Other;
    };

    match sqlx_err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code();
            let code = code.as_deref().unwrap_or_default();
            let message = db_err.message();
            if PG_CONFLICT_CODES.contains(&code) || SQLITE_CONFLICT_CODES.contains(&code) {
                StoreFailure::Conflict
            } else if PG_SCHEMA_CODES.contains(&code)
                || message.starts_with("no such table")
                || message.starts_with("no such column")
            {
                StoreFailure::Schema
            } else {
                StoreFailure::Other
            }
        }
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreFailure::Connection,
        _ => StoreFailure::Other,
    }
}
