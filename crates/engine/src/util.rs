//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EngineError::Corrupted(format!("invalid {label} id: {value:?}")))
}

/// Current time at the precision every supported backend can store.
pub(crate) fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Trim an optional text and drop it when empty.
pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
