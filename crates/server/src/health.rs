use api_types::health::Health;
use axum::{Json, extract::State, http::StatusCode};

use crate::server::ServerState;

/// Liveness of the ledger: `503` once the engine halted mutations.
pub async fn get(State(state): State<ServerState>) -> (StatusCode, Json<Health>) {
    if state.engine.is_halted() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(Health {
                status: "halted".to_string(),
            }),
        );
    }
    (
        StatusCode::OK,
        Json(Health {
            status: "ok".to_string(),
        }),
    )
}
