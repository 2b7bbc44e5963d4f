use sea_orm::{DatabaseTransaction, PaginatorTrait, prelude::*};
use uuid::Uuid;

use crate::{EngineError, Money, ResultEngine, Wallet, util::now_micros, wallets};

use super::{Engine, with_tx};

/// Load a wallet row inside `db_tx`.
pub(super) async fn find_wallet_model(
    db_tx: &DatabaseTransaction,
    wallet_id: Uuid,
) -> ResultEngine<wallets::Model> {
    wallets::Entity::find_by_id(wallet_id.to_string())
        .one(db_tx)
        .await?
        .ok_or_else(|| EngineError::KeyNotFound(format!("wallet {wallet_id}")))
}

pub(super) fn ensure_wallet_id(wallet_id: Uuid, label: &str) -> ResultEngine<()> {
    if wallet_id.is_nil() {
        return Err(EngineError::InvalidWallet(format!("{label} wallet id is nil")));
    }
    Ok(())
}

fn parse_opening_balance(raw: &str) -> ResultEngine<Money> {
    let opening: Money = raw.parse()?;
    if opening.is_negative() {
        return Err(EngineError::InvalidAmount(
            "opening balance must be >= 0".to_string(),
        ));
    }
    Ok(opening)
}

impl Engine {
    /// Return a wallet snapshot: id, balance and last update.
    pub async fn balance(&self, wallet_id: Uuid) -> ResultEngine<Wallet> {
        self.load_wallet(wallet_id)
            .await
            .map_err(|err| self.observe(err))
    }

    async fn load_wallet(&self, wallet_id: Uuid) -> ResultEngine<Wallet> {
        with_tx!(self.begin_read().await?, |db_tx| {
            let model = find_wallet_model(&db_tx, wallet_id).await?;
            Wallet::try_from(model)
        })
    }

    /// Return only the current balance of a wallet.
    pub async fn wallet_balance(&self, wallet_id: Uuid) -> ResultEngine<Money> {
        Ok(self.balance(wallet_id).await?.balance)
    }

    /// Number of wallets in the store.
    pub async fn wallet_count(&self) -> ResultEngine<u64> {
        with_tx!(self.begin_read().await?, |db_tx| {
            let count = wallets::Entity::find().count(&db_tx).await?;
            Ok(count)
        })
    }

    /// Create a wallet holding `opening_balance`.
    ///
    /// When `wallet_id` is `None` a fresh UUID is generated. Creating a wallet
    /// with an id already in use fails with [`EngineError::ExistingKey`].
    pub async fn create_wallet(
        &self,
        wallet_id: Option<Uuid>,
        opening_balance: &str,
    ) -> ResultEngine<Uuid> {
        let opening = parse_opening_balance(opening_balance)?;
        let wallet_id = wallet_id.unwrap_or_else(Uuid::new_v4);
        ensure_wallet_id(wallet_id, "new")?;

        with_tx!(self.begin_write().await?, |db_tx| {
            let exists = wallets::Entity::find_by_id(wallet_id.to_string())
                .one(&db_tx)
                .await?
                .is_some();
            if exists {
                return Err(EngineError::ExistingKey(format!("wallet {wallet_id}")));
            }

            let wallet = Wallet::new(wallet_id, opening, now_micros());
            wallets::ActiveModel::from(&wallet).insert(&db_tx).await?;
            tracing::info!(wallet = %wallet_id, opening = %opening, "wallet created");
            Ok(wallet_id)
        })
    }

    /// Create `count` wallets with the same opening balance in one unit of
    /// work. Used to bootstrap an empty store.
    pub async fn seed_wallets(&self, count: usize, opening_balance: &str) -> ResultEngine<Vec<Uuid>> {
        if count == 0 {
            return Err(EngineError::InvalidCount(
                "wallet count must be > 0".to_string(),
            ));
        }
        let opening = parse_opening_balance(opening_balance)?;

        with_tx!(self.begin_write().await?, |db_tx| {
            let created_at = now_micros();
            let mut ids = Vec::with_capacity(count);
            for _ in 0..count {
                let wallet = Wallet::new(Uuid::new_v4(), opening, created_at);
                wallets::ActiveModel::from(&wallet).insert(&db_tx).await?;
                ids.push(wallet.id);
            }
            tracing::info!(count, opening = %opening, "seeded wallets");
            Ok(ids)
        })
    }
}
