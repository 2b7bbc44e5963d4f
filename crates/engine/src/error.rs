//! The module contains the errors the engine can return.
//!
//! Errors fall in four groups:
//!
//! - client input: [`InvalidAmount`], [`InvalidCount`], [`InvalidTransfer`],
//!   [`InvalidWallet`], [`InvalidCursor`], [`KeyNotFound`], [`ExistingKey`];
//! - business rules: [`InsufficientFunds`];
//! - transient: [`Conflict`] (only seen inside the retry loop) and
//!   [`Transient`] once retries are exhausted;
//! - fatal: [`Corrupted`] and [`Halted`].
//!
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`InvalidCount`]: EngineError::InvalidCount
//!  [`InvalidTransfer`]: EngineError::InvalidTransfer
//!  [`InvalidWallet`]: EngineError::InvalidWallet
//!  [`InvalidCursor`]: EngineError::InvalidCursor
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`ExistingKey`]: EngineError::ExistingKey
//!  [`InsufficientFunds`]: EngineError::InsufficientFunds
//!  [`Conflict`]: EngineError::Conflict
//!  [`Transient`]: EngineError::Transient
//!  [`Corrupted`]: EngineError::Corrupted
//!  [`Halted`]: EngineError::Halted
use sea_orm::DbErr;
use thiserror::Error;

use crate::retry::{StoreFailure, classify};

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid count: {0}")]
    InvalidCount(String),
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),
    #[error("Invalid wallet: {0}")]
    InvalidWallet(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    /// A concurrent unit of work touched the same rows.
    #[error("Write conflict: {0}")]
    Conflict(String),
    #[error("Transient failure after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },
    #[error("Ledger corrupted: {0}")]
    Corrupted(String),
    #[error("Engine halted, mutations are disabled until the ledger is repaired")]
    Halted,
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl EngineError {
    /// Errors caused by the request itself. Retrying them is pointless.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds(_)
                | Self::KeyNotFound(_)
                | Self::ExistingKey(_)
                | Self::InvalidAmount(_)
                | Self::InvalidCount(_)
                | Self::InvalidTransfer(_)
                | Self::InvalidWallet(_)
                | Self::InvalidCursor(_)
        )
    }

    /// Errors the caller may retry as a whole request.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Conflict(_) | Self::Transient { .. } => true,
            Self::Database(err) => matches!(
                classify(err),
                StoreFailure::Conflict | StoreFailure::Connection
            ),
            _ => false,
        }
    }

    /// Errors that must stop further mutation.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Corrupted(_) | Self::Halted => true,
            Self::Database(err) => classify(err) == StoreFailure::Schema,
            _ => false,
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InsufficientFunds(a), Self::InsufficientFunds(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidCount(a), Self::InvalidCount(b)) => a == b,
            (Self::InvalidTransfer(a), Self::InvalidTransfer(b)) => a == b,
            (Self::InvalidWallet(a), Self::InvalidWallet(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (
                Self::Transient {
                    attempts: a1,
                    reason: r1,
                },
                Self::Transient {
                    attempts: a2,
                    reason: r2,
                },
            ) => a1 == a2 && r1 == r2,
            (Self::Corrupted(a), Self::Corrupted(b)) => a == b,
            (Self::Halted, Self::Halted) => true,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
