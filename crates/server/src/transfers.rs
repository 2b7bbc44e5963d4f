//! Transfers API endpoints.

use api_types::transfer::{HistoryQuery, SendRequest, SendResponse, TransferView};
use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue},
};
use engine::{EngineError, Transfer, TransferCmd};

use crate::{NEXT_CURSOR_HEADER, ServerError, server::ServerState};

fn transfer_view(transfer: Transfer) -> TransferView {
    TransferView {
        transaction_id: transfer.id,
        from: transfer.from,
        to: transfer.to,
        amount: transfer.amount.to_string(),
        transfer_date: transfer.transferred_at,
    }
}

fn parse_count(raw: Option<&str>) -> Result<i64, EngineError> {
    let raw = raw
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| EngineError::InvalidCount("count is required".to_string()))?;
    raw.parse::<i64>()
        .map_err(|_| EngineError::InvalidCount(format!("{raw:?} is not an integer")))
}

pub async fn send(
    State(state): State<ServerState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Result<Json<SendResponse>, ServerError> {
    let Json(payload) = payload.map_err(|err| ServerError::BadRequest(err.body_text()))?;

    let mut cmd = TransferCmd::new(payload.from, payload.to, payload.amount);
    if let Some(key) = payload.idempotency_key {
        cmd = cmd.idempotency_key(key);
    }
    let transaction_id = state.engine.send(cmd).await?;

    Ok(Json(SendResponse { transaction_id }))
}

pub async fn list(
    State(state): State<ServerState>,
    Query(query): Query<HistoryQuery>,
) -> Result<(HeaderMap, Json<Vec<TransferView>>), ServerError> {
    let count = parse_count(query.count.as_deref())?;
    let page = state
        .engine
        .history_page(count, query.cursor.as_deref())
        .await?;

    let mut headers = HeaderMap::new();
    if let Some(cursor) = page.next_cursor {
        let value = HeaderValue::from_str(&cursor)
            .map_err(|_| EngineError::InvalidCursor("cursor is not a header value".to_string()))?;
        headers.insert(NEXT_CURSOR_HEADER, value);
    }

    let transfers = page.transfers.into_iter().map(transfer_view).collect();
    Ok((headers, Json(transfers)))
}
