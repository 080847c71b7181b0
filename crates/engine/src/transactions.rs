//! Ledger entries.
//!
//! A `Transaction` is the only record of money movement. Its sign is implied
//! by `kind`; `amount_minor` is always positive. Aggregates only ever reflect
//! transactions whose status is `Completed`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// Category used by invoice payments.
pub const TUITION_PAYMENT: &str = "TUITION_PAYMENT";
/// Category used by payments that are not linked to an invoice.
pub const DIRECT_PAYMENT: &str = "DIRECT_PAYMENT";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "INCOME" => Ok(Self::Income),
            "EXPENSE" => Ok(Self::Expense),
            other => Err(EngineError::Validation(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }

    /// Whether a transaction in this status contributes to the aggregates.
    pub fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl TryFrom<&str> for TransactionStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(EngineError::Validation(format!(
                "invalid transaction status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Card,
    MobileMoney,
    Other,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::BankTransfer => "BANK_TRANSFER",
            Self::Card => "CARD",
            Self::MobileMoney => "MOBILE_MONEY",
            Self::Other => "OTHER",
        }
    }
}

impl TryFrom<&str> for PaymentMethod {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "CASH" => Ok(Self::Cash),
            "BANK_TRANSFER" => Ok(Self::BankTransfer),
            "CARD" => Ok(Self::Card),
            "MOBILE_MONEY" => Ok(Self::MobileMoney),
            "OTHER" => Ok(Self::Other),
            other => Err(EngineError::Validation(format!(
                "invalid payment method: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub category: String,
    pub amount_minor: i64,
    pub occurred_at: DateTime<Utc>,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Signed effect of this entry on the school balance.
    pub fn signed_amount(&self) -> i64 {
        match self.kind {
            TransactionKind::Income => self.amount_minor,
            TransactionKind::Expense => -self.amount_minor,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub category: String,
    pub amount_minor: i64,
    pub occurred_at: DateTimeUtc,
    pub payment_method: String,
    pub status: String,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub invoice_id: Option<String>,
    pub student_id: Option<String>,
    pub vendor_id: Option<String>,
    pub created_by: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoices::Entity",
        from = "Column::InvoiceId",
        to = "super::invoices::Column::Id"
    )]
    Invoices,
}

impl Related<super::invoices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            kind: ActiveValue::Set(tx.kind.as_str().to_string()),
            category: ActiveValue::Set(tx.category.clone()),
            amount_minor: ActiveValue::Set(tx.amount_minor),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            payment_method: ActiveValue::Set(tx.payment_method.as_str().to_string()),
            status: ActiveValue::Set(tx.status.as_str().to_string()),
            reference: ActiveValue::Set(tx.reference.clone()),
            description: ActiveValue::Set(tx.description.clone()),
            receipt_url: ActiveValue::Set(tx.receipt_url.clone()),
            invoice_id: ActiveValue::Set(tx.invoice_id.map(|id| id.to_string())),
            student_id: ActiveValue::Set(tx.student_id.map(|id| id.to_string())),
            vendor_id: ActiveValue::Set(tx.vendor_id.map(|id| id.to_string())),
            created_by: ActiveValue::Set(tx.created_by.clone()),
            created_at: ActiveValue::Set(tx.created_at),
        }
    }
}

fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|raw| parse_uuid(raw, label)).transpose()
}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            category: model.category,
            amount_minor: model.amount_minor,
            occurred_at: model.occurred_at,
            payment_method: PaymentMethod::try_from(model.payment_method.as_str())?,
            status: TransactionStatus::try_from(model.status.as_str())?,
            reference: model.reference,
            description: model.description,
            receipt_url: model.receipt_url,
            invoice_id: parse_optional_uuid(model.invoice_id.as_deref(), "invoice")?,
            student_id: parse_optional_uuid(model.student_id.as_deref(), "student")?,
            vendor_id: parse_optional_uuid(model.vendor_id.as_deref(), "vendor")?,
            created_by: model.created_by,
            created_at: model.created_at,
        })
    }
}
