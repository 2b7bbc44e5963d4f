//! Wire types shared by the HTTP server and its clients.
//!
//! Amounts always travel as decimal strings (`"30.00"`), never as JSON
//! numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod transfer {
    use super::*;

    /// Body of `POST /api/send`.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct SendRequest {
        pub from: Uuid,
        pub to: Uuid,
        pub amount: String,
        /// Replaying a request with the same key returns the first transfer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub idempotency_key: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SendResponse {
        #[serde(rename = "transactionId")]
        pub transaction_id: Uuid,
    }

    /// Query of `GET /api/transactions`.
    ///
    /// `count` stays a string so a malformed value is reported like any other
    /// invalid count.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct HistoryQuery {
        pub count: Option<String>,
        /// Opaque pagination cursor, from the `x-next-cursor` header.
        pub cursor: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransferView {
        pub transaction_id: Uuid,
        pub from: Uuid,
        pub to: Uuid,
        pub amount: String,
        pub transfer_date: DateTime<Utc>,
    }
}

pub mod wallet {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct WalletView {
        pub id: Uuid,
        pub balance: String,
        pub date_update: DateTime<Utc>,
    }
}

pub mod health {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct Health {
        pub status: String,
    }
}
