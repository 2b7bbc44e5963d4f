use base64::Engine as _;
use uuid::Uuid;

use sea_orm::{Condition, QueryFilter, QueryOrder, QuerySelect, prelude::*};

use crate::{EngineError, ResultEngine, Transfer, transfers, transfers::HistoryCursor};

use super::{Engine, with_tx};

/// Upper bound for a single history page.
pub const MAX_HISTORY_COUNT: u64 = 1_000;

/// One page of the transfer history, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HistoryPage {
    pub transfers: Vec<Transfer>,
    /// Opaque cursor for the next (older) page, `None` on the last page.
    pub next_cursor: Option<String>,
}

impl HistoryCursor {
    fn encode(&self) -> ResultEngine<String> {
        let bytes = serde_json::to_vec(self)
            .map_err(|_| EngineError::InvalidCursor("invalid history cursor".to_string()))?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }

    fn decode(input: &str) -> ResultEngine<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(input.as_bytes())
            .map_err(|_| EngineError::InvalidCursor("invalid history cursor".to_string()))?;
        serde_json::from_slice::<Self>(&bytes)
            .map_err(|_| EngineError::InvalidCursor("invalid history cursor".to_string()))
    }
}

fn validate_count(count: i64) -> ResultEngine<u64> {
    if count <= 0 {
        return Err(EngineError::InvalidCount(format!(
            "count must be > 0, got {count}"
        )));
    }
    let count = count.unsigned_abs();
    if count > MAX_HISTORY_COUNT {
        return Err(EngineError::InvalidCount(format!(
            "count must be <= {MAX_HISTORY_COUNT}, got {count}"
        )));
    }
    Ok(count)
}

impl Engine {
    /// Return the `count` most recent transfers, newest first.
    ///
    /// Transfers sharing a commit time are ordered by id, so repeated calls
    /// over an unchanged log return the same sequence.
    pub async fn history(&self, count: i64) -> ResultEngine<Vec<Transfer>> {
        Ok(self.history_page(count, None).await?.transfers)
    }

    /// Lists transfers with cursor-based pagination.
    ///
    /// Pagination is newest → older by `(transferred_at DESC, id DESC)`.
    pub async fn history_page(
        &self,
        count: i64,
        cursor: Option<&str>,
    ) -> ResultEngine<HistoryPage> {
        let limit = validate_count(count)?;
        let cursor = cursor.map(HistoryCursor::decode).transpose()?;

        self.load_history_page(limit, cursor)
            .await
            .map_err(|err| self.observe(err))
    }

    async fn load_history_page(
        &self,
        limit: u64,
        cursor: Option<HistoryCursor>,
    ) -> ResultEngine<HistoryPage> {
        with_tx!(self.begin_read().await?, |db_tx| {
            let mut query = transfers::Entity::find()
                .order_by_desc(transfers::Column::TransferredAt)
                .order_by_desc(transfers::Column::Id)
                .limit(limit.saturating_add(1));

            if let Some(cursor) = cursor {
                query = query.filter(
                    Condition::any()
                        .add(transfers::Column::TransferredAt.lt(cursor.transferred_at))
                        .add(
                            Condition::all()
                                .add(transfers::Column::TransferredAt.eq(cursor.transferred_at))
                                .add(transfers::Column::Id.lt(cursor.transfer_id)),
                        ),
                );
            }

            let rows = query.all(&db_tx).await?;
            let has_more = rows.len() as u64 > limit;

            let transfers = rows
                .into_iter()
                .take(limit as usize)
                .map(Transfer::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;

            let next_cursor = if has_more {
                transfers
                    .last()
                    .map(|transfer| HistoryCursor::from(transfer).encode())
                    .transpose()?
            } else {
                None
            };

            Ok(HistoryPage {
                transfers,
                next_cursor,
            })
        })
    }

    /// Return a single transfer by id.
    pub async fn transfer(&self, transfer_id: Uuid) -> ResultEngine<Transfer> {
        self.load_transfer(transfer_id)
            .await
            .map_err(|err| self.observe(err))
    }

    async fn load_transfer(&self, transfer_id: Uuid) -> ResultEngine<Transfer> {
        with_tx!(self.begin_read().await?, |db_tx| {
            let model = transfers::Entity::find_by_id(transfer_id.to_string())
                .one(&db_tx)
                .await?
                .ok_or_else(|| EngineError::KeyNotFound(format!("transfer {transfer_id}")))?;
            Transfer::try_from(model)
        })
    }
}
