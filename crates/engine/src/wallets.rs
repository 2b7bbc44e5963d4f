//! The module contains `Wallet` struct and its storage model.

use chrono::{DateTime, Utc};

use sea_orm::entity::{ActiveValue, prelude::*};
use uuid::Uuid;

use crate::{EngineError, Money, util::parse_uuid};

/// A wallet.
///
/// A wallet holds a balance and is identified by a UUID that never changes.
/// Wallets are created with an opening balance and afterwards only the
/// transfer engine changes their balance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Wallet {
    pub id: Uuid,
    pub balance: Money,
    /// Balance the wallet was created with. Together with the transfer log
    /// it is enough to recompute `balance`.
    pub opening_balance: Money,
    pub created_at: DateTime<Utc>,
    /// Time of the last change to `balance`. Never moves backwards.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: Uuid, opening_balance: Money, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            balance: opening_balance,
            opening_balance,
            created_at,
            updated_at: created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "wallets")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub balance: String,
    pub opening_balance: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Wallet> for ActiveModel {
    fn from(value: &Wallet) -> Self {
        Self {
            id: ActiveValue::Set(value.id.to_string()),
            balance: ActiveValue::Set(value.balance.to_string()),
            opening_balance: ActiveValue::Set(value.opening_balance.to_string()),
            created_at: ActiveValue::Set(value.created_at),
            updated_at: ActiveValue::Set(value.updated_at),
        }
    }
}

impl TryFrom<Model> for Wallet {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let id = parse_uuid(&model.id, "wallet")?;
        let balance = Money::from_stored(&model.balance, "wallet balance")?;
        if balance.is_negative() {
            return Err(EngineError::Corrupted(format!(
                "wallet {id} has a negative balance: {balance}"
            )));
        }
        Ok(Self {
            id,
            balance,
            opening_balance: Money::from_stored(&model.opening_balance, "opening balance")?,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn model(balance: &str) -> Model {
        Model {
            id: "6a8416ed-b8e6-4732-a591-bf55da9687e7".to_string(),
            balance: balance.to_string(),
            opening_balance: "100.00".to_string(),
            created_at: Utc.timestamp_opt(0, 0).unwrap(),
            updated_at: Utc.timestamp_opt(10, 0).unwrap(),
        }
    }

    #[test]
    fn model_round_trips_through_domain() {
        let wallet = Wallet::try_from(model("70.00")).unwrap();
        assert_eq!(wallet.balance.to_string(), "70.00");
        assert_eq!(wallet.opening_balance.to_string(), "100.00");

        let active = ActiveModel::from(&wallet);
        assert_eq!(active.balance, ActiveValue::Set("70.00".to_string()));
    }

    #[test]
    fn negative_stored_balance_is_corruption() {
        let err = Wallet::try_from(model("-1.00")).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted(_)));
    }

    #[test]
    fn malformed_stored_balance_is_corruption() {
        let err = Wallet::try_from(model("seventy")).unwrap_err();
        assert!(matches!(err, EngineError::Corrupted(_)));
    }

    #[test]
    fn new_wallet_starts_at_opening_balance() {
        let at = Utc.timestamp_opt(42, 0).unwrap();
        let wallet = Wallet::new(Uuid::new_v4(), "5".parse().unwrap(), at);
        assert_eq!(wallet.balance, wallet.opening_balance);
        assert_eq!(wallet.updated_at, at);
    }
}
