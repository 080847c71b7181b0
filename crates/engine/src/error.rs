//! The module contains the error the engine can throw.
//!
//! Every variant maps onto one [`ErrorKind`], which is what crosses the
//! external boundary:
//!
//! - [`Validation`] malformed or missing input, rejected before any write.
//! - [`OverpaymentRejected`] a payment would exceed the invoice total.
//! - [`KeyNotFound`] a referenced invoice/student/vendor/transaction is missing.
//! - [`Conflict`] concurrent modification detected, the caller may retry.
//! - [`Unauthorized`] the caller is unknown or lacks the required role.
//! - [`Database`] the store failed; the unit of work was rolled back.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`OverpaymentRejected`]: EngineError::OverpaymentRejected
//!  [`KeyNotFound`]: EngineError::KeyNotFound
//!  [`Conflict`]: EngineError::Conflict
//!  [`Unauthorized`]: EngineError::Unauthorized
//!  [`Database`]: EngineError::Database
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error(
        "Overpayment rejected: invoice {invoice_id} total is {total_minor}, \
         already paid {paid_minor}, attempted {attempted_minor}"
    )]
    OverpaymentRejected {
        invoice_id: Uuid,
        total_minor: i64,
        paid_minor: i64,
        attempted_minor: i64,
    },
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Database(DbErr),
}

/// Closed classification of [`EngineError`] used by callers of the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    OverpaymentRejected,
    NotFound,
    Conflict,
    Persistence,
    Authorization,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::OverpaymentRejected => "OVERPAYMENT_REJECTED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Persistence => "PERSISTENCE",
            Self::Authorization => "AUTHORIZATION",
        }
    }
}

impl EngineError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::OverpaymentRejected { .. } => ErrorKind::OverpaymentRejected,
            Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized(_) => ErrorKind::Authorization,
            Self::Database(_) => ErrorKind::Persistence,
        }
    }

    pub(crate) fn not_found(what: &str) -> Self {
        Self::KeyNotFound(format!("{what} not exists"))
    }
}

impl From<DbErr> for EngineError {
    /// Unique violations and SQLite lock contention are concurrent writers
    /// racing each other, so they surface as retryable conflicts.
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return Self::Conflict(detail);
        }
        let message = err.to_string();
        if message.contains("database is locked") || message.contains("database is busy") {
            return Self::Conflict(message);
        }
        Self::Database(err)
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (
                Self::OverpaymentRejected {
                    invoice_id: a_id,
                    total_minor: a_total,
                    paid_minor: a_paid,
                    attempted_minor: a_attempted,
                },
                Self::OverpaymentRejected {
                    invoice_id: b_id,
                    total_minor: b_total,
                    paid_minor: b_paid,
                    attempted_minor: b_attempted,
                },
            ) => a_id == b_id && a_total == b_total && a_paid == b_paid && a_attempted == b_attempted,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::Unauthorized(a), Self::Unauthorized(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
