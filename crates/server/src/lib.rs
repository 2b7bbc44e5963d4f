use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use serde::Serialize;
pub use server::{ServerOptions, app, run, run_with_listener, spawn_with_listener};

mod health;
mod server;
mod transfers;
mod wallets;

/// Header carrying the cursor of the next history page.
pub const NEXT_CURSOR_HEADER: &str = "x-next-cursor";

#[derive(Debug)]
pub enum ServerError {
    Engine(EngineError),
    /// The request could not be decoded.
    BadRequest(String),
    /// The request did not complete within the configured timeout.
    Timeout,
    /// A handler panicked.
    Panic,
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::InvalidAmount(_)
        | EngineError::InvalidCount(_)
        | EngineError::InvalidTransfer(_)
        | EngineError::InvalidWallet(_)
        | EngineError::InvalidCursor(_) => StatusCode::BAD_REQUEST,
        EngineError::InsufficientFunds(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_) => StatusCode::CONFLICT,
        EngineError::Conflict(_) | EngineError::Transient { .. } | EngineError::Halted => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        EngineError::Corrupted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::Database(_) if err.is_transient() => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn message_for_engine_error(status: StatusCode, err: EngineError) -> String {
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("internal error: {err}");
        return "internal server error".to_string();
    }
    if let EngineError::Database(db_err) = &err {
        tracing::warn!("store unavailable: {db_err}");
        return "service temporarily unavailable".to_string();
    }
    err.to_string()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => {
                let status = status_for_engine_error(&err);
                (status, message_for_engine_error(status, err))
            }
            ServerError::BadRequest(err) => (StatusCode::BAD_REQUEST, err),
            ServerError::Timeout => (
                StatusCode::SERVICE_UNAVAILABLE,
                "request timed out".to_string(),
            ),
            ServerError::Panic => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}
