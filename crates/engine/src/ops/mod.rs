use sea_orm::DatabaseConnection;

use crate::ResultEngine;

mod access;
mod balances;
mod expenses;
mod finances;
mod invoices;
mod ledger;
mod payments;
mod reports;
mod students;

pub use balances::FinanceReplay;
pub use invoices::InvoiceListFilter;
pub use ledger::TransactionListFilter;

/// Conflict retries used when the builder is not told otherwise.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

/// Re-run a unit of work while it fails with `Conflict`, up to the configured
/// number of retries.
macro_rules! retry_on_conflict {
    ($self:expr, $operation:literal, $body:expr) => {{
        let mut attempt: u32 = 0;
        loop {
            match $body {
                Err(crate::EngineError::Conflict(reason)) if attempt < $self.conflict_retries => {
                    attempt += 1;
                    tracing::warn!(
                        operation = $operation,
                        attempt,
                        "retrying after conflict: {reason}"
                    );
                }
                other => break other,
            }
        }
    }};
}

pub(crate) use retry_on_conflict;
pub(crate) use with_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    conflict_retries: u32,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
pub struct EngineBuilder {
    database: DatabaseConnection,
    conflict_retries: u32,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            database: DatabaseConnection::default(),
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// How many times a conflicting unit of work is retried before the
    /// conflict is surfaced.
    pub fn conflict_retries(mut self, retries: u32) -> EngineBuilder {
        self.conflict_retries = retries;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            conflict_retries: self.conflict_retries,
        })
    }
}
