//! Command structs for engine operations.
//!
//! These types group parameters for write operations (invoices, payments,
//! expenses, raw ledger entries), keeping call sites readable and avoiding
//! long argument lists.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{PaymentMethod, TransactionKind, TransactionStatus};

/// One billed line of a new invoice.
#[derive(Clone, Debug)]
pub struct LineItemInput {
    pub description: String,
    pub amount_minor: i64,
    pub quantity: i64,
}

impl LineItemInput {
    #[must_use]
    pub fn new(description: impl Into<String>, amount_minor: i64, quantity: i64) -> Self {
        Self {
            description: description.into(),
            amount_minor,
            quantity,
        }
    }
}

/// Issue an invoice to a student.
#[derive(Clone, Debug)]
pub struct CreateInvoiceCmd {
    pub student_id: Uuid,
    pub line_items: Vec<LineItemInput>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub user_id: String,
}

impl CreateInvoiceCmd {
    #[must_use]
    pub fn new(
        student_id: Uuid,
        user_id: impl Into<String>,
        issue_date: NaiveDate,
        due_date: NaiveDate,
    ) -> Self {
        Self {
            student_id,
            line_items: Vec::new(),
            issue_date,
            due_date,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn line_item(mut self, description: impl Into<String>, amount_minor: i64, quantity: i64) -> Self {
        self.line_items
            .push(LineItemInput::new(description, amount_minor, quantity));
        self
    }
}

/// Pay (part of) an invoice.
#[derive(Clone, Debug)]
pub struct RecordPaymentCmd {
    pub invoice_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub user_id: String,
}

impl RecordPaymentCmd {
    #[must_use]
    pub fn new(
        invoice_id: Uuid,
        user_id: impl Into<String>,
        amount_minor: i64,
        payment_method: PaymentMethod,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            invoice_id,
            amount_minor,
            payment_method,
            reference: None,
            occurred_at,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Record money received from a student outside any invoice.
#[derive(Clone, Debug)]
pub struct DirectPaymentCmd {
    pub student_id: Uuid,
    pub amount_minor: i64,
    pub payment_method: PaymentMethod,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub user_id: String,
}

impl DirectPaymentCmd {
    #[must_use]
    pub fn new(
        student_id: Uuid,
        user_id: impl Into<String>,
        amount_minor: i64,
        payment_method: PaymentMethod,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            student_id,
            amount_minor,
            payment_method,
            reference: None,
            description: None,
            occurred_at,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Record money spent by the school.
#[derive(Clone, Debug)]
pub struct RecordExpenseCmd {
    pub description: String,
    pub amount_minor: i64,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
    pub vendor_name: Option<String>,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub receipt_url: Option<String>,
    pub user_id: String,
}

impl RecordExpenseCmd {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        description: impl Into<String>,
        amount_minor: i64,
        category: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            description: description.into(),
            amount_minor,
            category: category.into(),
            occurred_at,
            vendor_name: None,
            payment_method: PaymentMethod::Cash,
            status: TransactionStatus::Completed,
            receipt_url: None,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn vendor(mut self, vendor_name: impl Into<String>) -> Self {
        self.vendor_name = Some(vendor_name.into());
        self
    }

    #[must_use]
    pub fn payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn receipt_url(mut self, receipt_url: impl Into<String>) -> Self {
        self.receipt_url = Some(receipt_url.into());
        self
    }
}

/// Patch an existing expense. `None` leaves a field untouched.
///
/// Kind, category and status are not editable here; status moves through
/// `update_transaction_status`.
#[derive(Clone, Debug)]
pub struct UpdateExpenseCmd {
    pub transaction_id: Uuid,
    pub amount_minor: Option<i64>,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub vendor_name: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub receipt_url: Option<String>,
    pub user_id: String,
}

impl UpdateExpenseCmd {
    #[must_use]
    pub fn new(transaction_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            transaction_id,
            amount_minor: None,
            description: None,
            occurred_at: None,
            vendor_name: None,
            payment_method: None,
            receipt_url: None,
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn amount_minor(mut self, amount_minor: i64) -> Self {
        self.amount_minor = Some(amount_minor);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    #[must_use]
    pub fn vendor(mut self, vendor_name: impl Into<String>) -> Self {
        self.vendor_name = Some(vendor_name.into());
        self
    }

    #[must_use]
    pub fn payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = Some(payment_method);
        self
    }

    #[must_use]
    pub fn receipt_url(mut self, receipt_url: impl Into<String>) -> Self {
        self.receipt_url = Some(receipt_url.into());
        self
    }
}

/// Optional weak references carried by a ledger entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactionLinks {
    pub invoice_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub vendor_id: Option<Uuid>,
}

/// Append a raw ledger entry.
#[derive(Clone, Debug)]
pub struct RecordTransactionCmd {
    pub kind: TransactionKind,
    pub category: String,
    pub amount_minor: i64,
    pub payment_method: PaymentMethod,
    pub status: TransactionStatus,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub links: TransactionLinks,
    pub user_id: String,
}

impl RecordTransactionCmd {
    #[must_use]
    pub fn new(
        kind: TransactionKind,
        category: impl Into<String>,
        amount_minor: i64,
        user_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            category: category.into(),
            amount_minor,
            payment_method: PaymentMethod::Cash,
            status: TransactionStatus::Completed,
            reference: None,
            description: None,
            receipt_url: None,
            occurred_at,
            links: TransactionLinks::default(),
            user_id: user_id.into(),
        }
    }

    #[must_use]
    pub fn payment_method(mut self, payment_method: PaymentMethod) -> Self {
        self.payment_method = payment_method;
        self
    }

    #[must_use]
    pub fn status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn invoice(mut self, invoice_id: Uuid) -> Self {
        self.links.invoice_id = Some(invoice_id);
        self
    }

    #[must_use]
    pub fn student(mut self, student_id: Uuid) -> Self {
        self.links.student_id = Some(student_id);
        self
    }

    #[must_use]
    pub fn vendor(mut self, vendor_id: Uuid) -> Self {
        self.links.vendor_id = Some(vendor_id);
        self
    }
}
