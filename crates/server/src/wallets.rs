//! Wallets API endpoints.

use api_types::wallet::WalletView;
use axum::{
    Json,
    extract::{Path, State},
};
use engine::EngineError;
use uuid::Uuid;

use crate::{ServerError, server::ServerState};

pub async fn balance(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> Result<Json<WalletView>, ServerError> {
    let wallet_id = Uuid::parse_str(id.trim())
        .map_err(|_| EngineError::InvalidWallet(format!("{id:?} is not a wallet id")))?;

    let wallet = state.engine.balance(wallet_id).await?;

    Ok(Json(WalletView {
        id: wallet.id,
        balance: wallet.balance.to_string(),
        date_update: wallet.updated_at,
    }))
}
