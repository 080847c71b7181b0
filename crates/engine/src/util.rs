//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API. They centralize
//! validation and mapping logic so the engine enforces consistent invariants.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value).map_err(|_| EngineError::Validation(format!("invalid {label} id")))
}

/// Largest amount, in minor units, a single entry or invoice may carry.
pub const MAX_AMOUNT_MINOR: i64 = 1_000_000_000_000_000;

/// Reject non-positive or out-of-range monetary amounts.
pub(crate) fn ensure_positive_amount(amount_minor: i64, label: &str) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::Validation(format!("{label} must be > 0")));
    }
    if amount_minor > MAX_AMOUNT_MINOR {
        return Err(EngineError::Validation(format!(
            "{label} must be <= {MAX_AMOUNT_MINOR}"
        )));
    }
    Ok(())
}

pub(crate) fn normalize_required_text(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{label} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
