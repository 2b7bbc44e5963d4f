use std::collections::HashMap;

use uuid::Uuid;

use sea_orm::prelude::*;

use crate::{EngineError, Money, ResultEngine, Transfer, transfers, util::parse_uuid, wallets};

use super::{Engine, with_tx};

/// A wallet whose stored balance does not match its transfers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BalanceDrift {
    pub wallet_id: Uuid,
    pub stored: Money,
    /// `opening + credits - debits`.
    pub expected: Money,
}

/// Outcome of [`Engine::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub wallets_checked: u64,
    pub transfers_checked: u64,
    pub drift: Vec<BalanceDrift>,
}

impl AuditReport {
    /// Returns `true` when every balance matches the transfer log.
    pub fn is_clean(&self) -> bool {
        self.drift.is_empty()
    }
}

struct AuditedWallet {
    stored: Money,
    expected: Money,
}

impl Engine {
    /// Recompute every balance from its opening balance and the transfer
    /// log, and compare it with the stored one.
    ///
    /// Drift (or a negative stored balance) halts the engine, the report is
    /// still returned so the caller can show what diverged.
    pub async fn reconcile(&self) -> ResultEngine<AuditReport> {
        let report = self
            .load_audit()
            .await
            .map_err(|err| self.observe(err))?;

        if report.is_clean() {
            tracing::info!(
                wallets = report.wallets_checked,
                transfers = report.transfers_checked,
                "ledger reconciled"
            );
        } else {
            for drift in &report.drift {
                tracing::warn!(
                    wallet = %drift.wallet_id,
                    stored = %drift.stored,
                    expected = %drift.expected,
                    "balance drift"
                );
            }
            self.observe(EngineError::Corrupted(format!(
                "{} wallet(s) diverge from the transfer log",
                report.drift.len()
            )));
        }
        Ok(report)
    }

    async fn load_audit(&self) -> ResultEngine<AuditReport> {
        with_tx!(self.begin_read().await?, |db_tx| {
            let wallet_models = wallets::Entity::find().all(&db_tx).await?;
            let transfer_models = transfers::Entity::find().all(&db_tx).await?;

            let mut audited: HashMap<Uuid, AuditedWallet> =
                HashMap::with_capacity(wallet_models.len());
            for model in wallet_models {
                let id = parse_uuid(&model.id, "wallet")?;
                audited.insert(
                    id,
                    AuditedWallet {
                        stored: Money::from_stored(&model.balance, "wallet balance")?,
                        expected: Money::from_stored(
                            &model.opening_balance,
                            "wallet opening balance",
                        )?,
                    },
                );
            }

            let transfers_checked = transfer_models.len() as u64;
            for model in transfer_models {
                let transfer = Transfer::try_from(model)?;
                apply(&mut audited, transfer.from, transfer.id, |expected| {
                    expected.checked_sub(transfer.amount)
                })?;
                apply(&mut audited, transfer.to, transfer.id, |expected| {
                    expected.checked_add(transfer.amount)
                })?;
            }

            let mut drift: Vec<BalanceDrift> = audited
                .iter()
                .filter(|(_, wallet)| {
                    wallet.stored != wallet.expected || wallet.stored.is_negative()
                })
                .map(|(id, wallet)| BalanceDrift {
                    wallet_id: *id,
                    stored: wallet.stored,
                    expected: wallet.expected,
                })
                .collect();
            drift.sort_by_key(|d| d.wallet_id);

            Ok(AuditReport {
                wallets_checked: audited.len() as u64,
                transfers_checked,
                drift,
            })
        })
    }
}

fn apply(
    audited: &mut HashMap<Uuid, AuditedWallet>,
    wallet_id: Uuid,
    transfer_id: Uuid,
    op: impl FnOnce(Money) -> Option<Money>,
) -> ResultEngine<()> {
    let wallet = audited.get_mut(&wallet_id).ok_or_else(|| {
        EngineError::Corrupted(format!(
            "transfer {transfer_id} references unknown wallet {wallet_id}"
        ))
    })?;
    wallet.expected = op(wallet.expected).ok_or_else(|| {
        EngineError::Corrupted(format!("wallet {wallet_id} total out of range"))
    })?;
    Ok(())
}
