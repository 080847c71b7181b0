pub use commands::{
    CreateInvoiceCmd, DirectPaymentCmd, LineItemInput, RecordExpenseCmd, RecordPaymentCmd,
    RecordTransactionCmd, TransactionLinks, UpdateExpenseCmd,
};
pub use error::{EngineError, ErrorKind};
pub use invoice_line_items::InvoiceLineItem;
pub use invoices::{Invoice, InvoiceStatus, derive_status, next_invoice_number};
pub use money::Money;
pub use ops::{
    DEFAULT_CONFLICT_RETRIES, Engine, EngineBuilder, FinanceReplay, InvoiceListFilter,
    TransactionListFilter,
};
pub use reports::{
    CategoryAmount, CollectionReport, ExpenseReport, FinancialReport, MonthlyTrend,
    OverdueInvoice, PaymentMethodAmount, ReportWindow, TopStudent, VendorSpend,
};
pub use school_finance::SchoolFinance;
pub use student_finances::StudentFinance;
pub use students::Student;
pub use transactions::{
    DIRECT_PAYMENT, PaymentMethod, TUITION_PAYMENT, Transaction, TransactionKind,
    TransactionStatus,
};
pub use users::UserRole;
pub use util::MAX_AMOUNT_MINOR;
pub use vendors::Vendor;

mod commands;
mod error;
pub mod export;
mod invoice_line_items;
mod invoices;
mod money;
mod ops;
mod reports;
mod school_finance;
mod student_finances;
mod students;
mod transactions;
mod users;
mod util;
mod vendors;

pub type ResultEngine<T> = Result<T, EngineError>;
