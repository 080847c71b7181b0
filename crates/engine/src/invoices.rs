//! Invoices and their status derivation.
//!
//! `total_minor` is fixed at creation as the sum of the line items. The stored
//! status only ever changes through [`derive_status`] or an explicit
//! cancellation, which is sticky.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, invoice_line_items::InvoiceLineItem, util::parse_uuid};

const INVOICE_PREFIX: &str = "INV";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Overdue => "OVERDUE",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl TryFrom<&str> for InvoiceStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "OVERDUE" => Ok(Self::Overdue),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(EngineError::Validation(format!(
                "invalid invoice status: {other}"
            ))),
        }
    }
}

/// Derives the status of an invoice from monetary facts.
///
/// Pure and idempotent: feeding the result back in as `current` yields the
/// same status. `Cancelled` is never overridden.
pub fn derive_status(
    current: InvoiceStatus,
    paid_minor: i64,
    total_minor: i64,
    due_date: NaiveDate,
    today: NaiveDate,
) -> InvoiceStatus {
    match current {
        InvoiceStatus::Cancelled => InvoiceStatus::Cancelled,
        InvoiceStatus::Pending | InvoiceStatus::Paid | InvoiceStatus::Overdue => {
            if paid_minor >= total_minor {
                InvoiceStatus::Paid
            } else if due_date < today {
                InvoiceStatus::Overdue
            } else {
                InvoiceStatus::Pending
            }
        }
    }
}

/// Allocates the invoice number following `last` for the given year.
///
/// Numbers look like `INV-2026-001`. The sequence is the trailing digits of
/// the most recently created invoice, restarted at `001` when the year
/// changes or when there is no previous invoice.
pub fn next_invoice_number(last: Option<&str>, year: i32) -> String {
    let year_prefix = format!("{INVOICE_PREFIX}-{year}-");
    let next = match last {
        Some(last) if last.starts_with(&year_prefix) => trailing_number(last).unwrap_or(0) + 1,
        _ => 1,
    };
    format!("{year_prefix}{next:03}")
}

fn trailing_number(value: &str) -> Option<u64> {
    let digits: String = value
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub total_minor: i64,
    /// Sum of the linked `Completed` transactions.
    pub paid_minor: i64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    /// Derived status as of the read; `Cancelled` is sticky.
    pub status: InvoiceStatus,
    pub line_items: Vec<InvoiceLineItem>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn outstanding_minor(&self) -> i64 {
        (self.total_minor - self.paid_minor).max(0)
    }

    /// Builds the read view of a stored invoice. The status is re-derived as
    /// of `today` but nothing is written back.
    pub(crate) fn from_parts(
        model: Model,
        line_items: Vec<InvoiceLineItem>,
        paid_minor: i64,
        today: NaiveDate,
    ) -> ResultEngine<Self> {
        let stored = InvoiceStatus::try_from(model.status.as_str())?;
        Ok(Self {
            id: parse_uuid(&model.id, "invoice")?,
            status: derive_status(stored, paid_minor, model.total_minor, model.due_date, today),
            invoice_number: model.invoice_number,
            student_id: parse_uuid(&model.student_id, "student")?,
            total_minor: model.total_minor,
            paid_minor,
            issue_date: model.issue_date,
            due_date: model.due_date,
            line_items,
            created_by: model.created_by,
            created_at: model.created_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub invoice_number: String,
    pub student_id: String,
    pub total_minor: i64,
    pub issue_date: Date,
    pub due_date: Date,
    pub status: String,
    /// Bumped by every write that changes the invoice's payment set.
    pub version: i64,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_line_items::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::transactions::Entity")]
    Transactions,
}

impl Related<super::invoice_line_items::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::transactions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Invoice> for ActiveModel {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: ActiveValue::Set(invoice.id.to_string()),
            invoice_number: ActiveValue::Set(invoice.invoice_number.clone()),
            student_id: ActiveValue::Set(invoice.student_id.to_string()),
            total_minor: ActiveValue::Set(invoice.total_minor),
            issue_date: ActiveValue::Set(invoice.issue_date),
            due_date: ActiveValue::Set(invoice.due_date),
            status: ActiveValue::Set(invoice.status.as_str().to_string()),
            version: ActiveValue::Set(0),
            created_by: ActiveValue::Set(invoice.created_by.clone()),
            created_at: ActiveValue::Set(invoice.created_at),
        }
    }
}
