use chrono::{DateTime, Utc};
use uuid::Uuid;

use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, SqlErr, prelude::*, sea_query::Expr,
};

use crate::{
    EngineError, Money, ResultEngine, Transfer, TransferCmd, Wallet, transfers,
    util::{normalize_optional_text, now_micros},
    wallets,
};

use super::{
    Engine,
    wallets::{ensure_wallet_id, find_wallet_model},
    with_tx,
};

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// A `TransferCmd` that passed input validation.
#[derive(Clone, Debug)]
struct TransferRequest {
    from: Uuid,
    to: Uuid,
    amount: Money,
    idempotency_key: Option<String>,
}

impl TryFrom<TransferCmd> for TransferRequest {
    type Error = EngineError;

    fn try_from(cmd: TransferCmd) -> Result<Self, Self::Error> {
        ensure_wallet_id(cmd.from, "source")?;
        ensure_wallet_id(cmd.to, "destination")?;
        if cmd.from == cmd.to {
            return Err(EngineError::InvalidTransfer(
                "source and destination wallets must differ".to_string(),
            ));
        }

        let amount: Money = cmd.amount.parse()?;
        if !amount.is_positive() {
            return Err(EngineError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let idempotency_key = normalize_optional_text(cmd.idempotency_key.as_deref());
        if idempotency_key
            .as_ref()
            .is_some_and(|key| key.len() > MAX_IDEMPOTENCY_KEY_LEN)
        {
            return Err(EngineError::InvalidTransfer(format!(
                "idempotency key longer than {MAX_IDEMPOTENCY_KEY_LEN} bytes"
            )));
        }

        Ok(Self {
            from: cmd.from,
            to: cmd.to,
            amount,
            idempotency_key,
        })
    }
}

impl Engine {
    /// Move money from one wallet to another.
    ///
    /// The debit, the credit and the transfer record are written in one unit
    /// of work. A unit that loses a race against a concurrent transfer is
    /// rolled back and retried according to the engine [`RetryPolicy`];
    /// every attempt re-reads the balances, so the outcome is either the new
    /// transfer id, a client error such as
    /// [`EngineError::InsufficientFunds`], or [`EngineError::Transient`]
    /// once the attempts are exhausted.
    ///
    /// [`RetryPolicy`]: crate::RetryPolicy
    pub async fn send(&self, cmd: TransferCmd) -> ResultEngine<Uuid> {
        self.ensure_running()?;
        let request = TransferRequest::try_from(cmd)?;

        let mut attempt = 1;
        loop {
            self.ensure_running()?;
            let err = match self.try_transfer(&request).await {
                Ok(id) => return Ok(id),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(self.observe(err));
            }
            if attempt >= self.retry.max_attempts {
                tracing::warn!(
                    from = %request.from,
                    to = %request.to,
                    attempts = attempt,
                    "transfer gave up after conflicts: {err}"
                );
                return Err(EngineError::Transient {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let delay = self.retry.backoff(attempt);
            tracing::debug!(attempt, ?delay, "transfer conflicted, retrying: {err}");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// One attempt at applying `request`.
    async fn try_transfer(&self, request: &TransferRequest) -> ResultEngine<Uuid> {
        with_tx!(self.begin_write().await?, |db_tx| {
            if let Some(key) = request.idempotency_key.as_deref() {
                if let Some(existing) = find_by_idempotency_key(&db_tx, key).await? {
                    return replay(existing, request, key);
                }
            }

            let from_model = find_wallet_model(&db_tx, request.from).await?;
            let to_model = find_wallet_model(&db_tx, request.to).await?;
            let from = Wallet::try_from(from_model.clone())?;
            let to = Wallet::try_from(to_model.clone())?;

            if from.balance < request.amount {
                return Err(EngineError::InsufficientFunds(format!(
                    "balance {}, required {}",
                    from.balance, request.amount
                )));
            }
            let debited = from.balance.checked_sub(request.amount).ok_or_else(|| {
                EngineError::InvalidAmount(
                    "source balance cannot hold the result exactly".to_string(),
                )
            })?;
            let credited = to.balance.checked_add(request.amount).ok_or_else(|| {
                EngineError::InvalidAmount(
                    "destination balance cannot hold the result exactly".to_string(),
                )
            })?;

            let committed_at = commit_time(&db_tx, &from, &to).await?;
            let transfer = Transfer::new(
                request.from,
                request.to,
                request.amount,
                committed_at,
                request.idempotency_key.clone(),
            );

            if let Err(err) = transfers::ActiveModel::from(&transfer).insert(&db_tx).await {
                // Two requests with the same key raced past the lookup above;
                // the next attempt sees the winner and replays it.
                if request.idempotency_key.is_some()
                    && matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
                {
                    return Err(EngineError::Conflict(
                        "idempotency key inserted concurrently".to_string(),
                    ));
                }
                return Err(err.into());
            }

            set_balance(&db_tx, &to_model, credited, committed_at).await?;
            set_balance(&db_tx, &from_model, debited, committed_at).await?;

            tracing::info!(
                transfer = %transfer.id,
                from = %transfer.from,
                to = %transfer.to,
                amount = %transfer.amount,
                "transfer committed"
            );
            Ok(transfer.id)
        })
    }
}

async fn find_by_idempotency_key(
    db_tx: &DatabaseTransaction,
    key: &str,
) -> ResultEngine<Option<transfers::Model>> {
    Ok(transfers::Entity::find()
        .filter(transfers::Column::IdempotencyKey.eq(key.to_string()))
        .one(db_tx)
        .await?)
}

/// Answer a replayed request with the transfer it already produced.
fn replay(existing: transfers::Model, request: &TransferRequest, key: &str) -> ResultEngine<Uuid> {
    let existing = Transfer::try_from(existing)?;
    if !existing.same_movement(request.from, request.to, request.amount) {
        return Err(EngineError::ExistingKey(format!(
            "idempotency key {key:?} already used by transfer {}",
            existing.id
        )));
    }
    tracing::info!(transfer = %existing.id, "replayed transfer for idempotency key");
    Ok(existing.id)
}

/// Commit time for a new transfer: now, but never before the latest transfer
/// nor before the last update of either wallet.
async fn commit_time(
    db_tx: &DatabaseTransaction,
    from: &Wallet,
    to: &Wallet,
) -> ResultEngine<DateTime<Utc>> {
    let latest = transfers::Entity::find()
        .order_by_desc(transfers::Column::TransferredAt)
        .one(db_tx)
        .await?
        .map(|model| model.transferred_at);

    let committed_at = [latest, Some(from.updated_at), Some(to.updated_at)]
        .into_iter()
        .flatten()
        .fold(now_micros(), Ord::max);
    Ok(committed_at)
}

/// Write the new balance of a wallet, guarded on the balance read earlier in
/// the same unit. A miss means another unit changed the row in between.
async fn set_balance(
    db_tx: &DatabaseTransaction,
    read: &wallets::Model,
    balance: Money,
    updated_at: DateTime<Utc>,
) -> ResultEngine<()> {
    let result = wallets::Entity::update_many()
        .col_expr(wallets::Column::Balance, Expr::value(balance.to_string()))
        .col_expr(wallets::Column::UpdatedAt, Expr::value(updated_at))
        .filter(wallets::Column::Id.eq(read.id.clone()))
        .filter(wallets::Column::Balance.eq(read.balance.clone()))
        .exec(db_tx)
        .await?;

    if result.rows_affected != 1 {
        return Err(EngineError::Conflict(format!(
            "wallet {} changed concurrently",
            read.id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(amount: &str) -> TransferCmd {
        TransferCmd::new(Uuid::new_v4(), Uuid::new_v4(), amount)
    }

    #[test]
    fn request_rejects_bad_amounts() {
        for amount in ["abc", "-5.00", "0", "0.00", "", "1e2"] {
            let err = TransferRequest::try_from(cmd(amount)).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidAmount(_)),
                "{amount:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn request_rejects_self_transfer() {
        let id = Uuid::new_v4();
        let err = TransferRequest::try_from(TransferCmd::new(id, id, "1.00")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransfer(_)));
    }

    #[test]
    fn request_rejects_nil_wallets() {
        let err =
            TransferRequest::try_from(TransferCmd::new(Uuid::nil(), Uuid::new_v4(), "1"))
                .unwrap_err();
        assert!(matches!(err, EngineError::InvalidWallet(_)));
    }

    #[test]
    fn request_normalizes_idempotency_key() {
        let request = TransferRequest::try_from(cmd("1").idempotency_key("  ")).unwrap();
        assert_eq!(request.idempotency_key, None);

        let request = TransferRequest::try_from(cmd("1").idempotency_key(" abc ")).unwrap();
        assert_eq!(request.idempotency_key.as_deref(), Some("abc"));

        let err = TransferRequest::try_from(cmd("1").idempotency_key("k".repeat(256)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTransfer(_)));
    }

    #[test]
    fn request_keeps_exact_amount() {
        let request = TransferRequest::try_from(cmd("0.10")).unwrap();
        assert_eq!(request.amount.to_string(), "0.10");
    }
}
