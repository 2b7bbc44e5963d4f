//! Command structs for engine write operations.

use uuid::Uuid;

/// Move `amount` from wallet `from` to wallet `to`.
///
/// `amount` is kept as the decimal string received from the caller; the
/// engine parses it, so malformed input is reported as
/// [`EngineError::InvalidAmount`](crate::EngineError::InvalidAmount).
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub from: Uuid,
    pub to: Uuid,
    pub amount: String,
    /// Optional caller supplied key. Replaying a command with the same key
    /// returns the original transfer instead of moving money twice.
    pub idempotency_key: Option<String>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(from: Uuid, to: Uuid, amount: impl Into<String>) -> Self {
        Self {
            from,
            to,
            amount: amount.into(),
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
