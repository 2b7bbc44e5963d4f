//! Transfer primitives.
//!
//! A `Transfer` is the immutable record of value moved from one wallet to
//! another. The log of transfers is the source of truth for balances.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, Money, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub amount: Money,
    /// Commit time, assigned by the engine inside the committing unit.
    pub transferred_at: DateTime<Utc>,
    pub idempotency_key: Option<String>,
}

impl Transfer {
    pub(crate) fn new(
        from: Uuid,
        to: Uuid,
        amount: Money,
        transferred_at: DateTime<Utc>,
        idempotency_key: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from,
            to,
            amount,
            transferred_at,
            idempotency_key,
        }
    }

    /// Returns `true` if `other` describes the same movement of money.
    pub(crate) fn same_movement(&self, from: Uuid, to: Uuid, amount: Money) -> bool {
        self.from == from && self.to == to && self.amount == amount
    }
}

/// Position in the history, used to resume listing after a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HistoryCursor {
    pub transferred_at: DateTime<Utc>,
    pub transfer_id: String,
}

impl From<&Transfer> for HistoryCursor {
    fn from(transfer: &Transfer) -> Self {
        Self {
            transferred_at: transfer.transferred_at,
            transfer_id: transfer.id.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transfers")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub from_wallet: String,
    pub to_wallet: String,
    pub amount: String,
    pub transferred_at: DateTimeUtc,
    pub idempotency_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transfer> for ActiveModel {
    fn from(transfer: &Transfer) -> Self {
        Self {
            id: ActiveValue::Set(transfer.id.to_string()),
            from_wallet: ActiveValue::Set(transfer.from.to_string()),
            to_wallet: ActiveValue::Set(transfer.to.to_string()),
            amount: ActiveValue::Set(transfer.amount.to_string()),
            transferred_at: ActiveValue::Set(transfer.transferred_at),
            idempotency_key: ActiveValue::Set(transfer.idempotency_key.clone()),
        }
    }
}

impl TryFrom<Model> for Transfer {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let amount = Money::from_stored(&model.amount, "transfer amount")?;
        if !amount.is_positive() {
            return Err(EngineError::Corrupted(format!(
                "transfer {} has a non positive amount: {amount}",
                model.id
            )));
        }
        Ok(Self {
            id: parse_uuid(&model.id, "transfer")?,
            from: parse_uuid(&model.from_wallet, "source wallet")?,
            to: parse_uuid(&model.to_wallet, "destination wallet")?,
            amount,
            transferred_at: model.transferred_at,
            idempotency_key: model.idempotency_key,
        })
    }
}
