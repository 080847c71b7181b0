//! Read-side aggregation over the ledger and the invoices.
//!
//! The builders in this module are pure: the engine loads the rows of a
//! [`ReportWindow`] and hands them over, so every figure can be tested without
//! a database.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, Invoice, Money, PaymentMethod, ResultEngine, Student, Transaction,
    TransactionKind, TransactionStatus, Vendor,
};

const TREND_MONTHS: usize = 6;
const TOP_STUDENTS: usize = 10;
const TOP_VENDORS: usize = 10;
const UNKNOWN_NAME: &str = "Unknown";

/// Inclusive `[start, end]` range a report covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    /// Fills missing bounds with the start of `now`'s year and `now`.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        let start = match start {
            Some(start) => start,
            None => Utc
                .with_ymd_and_hms(now.year(), 1, 1, 0, 0, 0)
                .single()
                .ok_or_else(|| EngineError::Validation("invalid report start".to_string()))?,
        };
        let end = end.unwrap_or(now);
        if start > end {
            return Err(EngineError::Validation(
                "report start must not be after its end".to_string(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CategoryAmount {
    pub category: String,
    pub amount_minor: i64,
    pub percentage: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// `YYYY-MM`
    pub month: String,
    pub revenue_minor: i64,
    pub expenses_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopStudent {
    pub student_id: Uuid,
    pub name: String,
    pub grade: Option<String>,
    pub total_paid_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialReport {
    pub window: ReportWindow,
    pub total_revenue_minor: i64,
    pub total_expenses_minor: i64,
    pub net_profit_minor: i64,
    pub fee_collection_rate: f64,
    pub outstanding_fees_minor: i64,
    pub expense_breakdown: Vec<CategoryAmount>,
    pub revenue_trends: Vec<MonthlyTrend>,
    pub top_students: Vec<TopStudent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodAmount {
    pub method: PaymentMethod,
    pub count: u64,
    pub amount_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueInvoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub student_id: Uuid,
    pub student_name: String,
    pub total_minor: i64,
    pub paid_minor: i64,
    pub outstanding_minor: i64,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub summary: FinancialReport,
    pub payment_methods: Vec<PaymentMethodAmount>,
    pub overdue_invoices: Vec<OverdueInvoice>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorSpend {
    pub vendor_id: Uuid,
    pub name: String,
    pub amount_minor: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseReport {
    pub summary: FinancialReport,
    pub top_vendors: Vec<VendorSpend>,
    pub pending_expenses_count: u64,
    pub pending_expenses_minor: i64,
}

fn is_completed(tx: &Transaction, kind: TransactionKind) -> bool {
    tx.kind == kind && tx.status == TransactionStatus::Completed
}

fn month_key(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

/// Completed expenses grouped by category, largest first.
fn expense_breakdown(transactions: &[Transaction], total_expenses: i64) -> Vec<CategoryAmount> {
    let mut by_category: HashMap<&str, Money> = HashMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Expense))
    {
        *by_category.entry(tx.category.as_str()).or_default() += Money::new(tx.amount_minor);
    }
    let mut breakdown: Vec<CategoryAmount> = by_category
        .into_iter()
        .map(|(category, amount)| CategoryAmount {
            category: category.to_string(),
            amount_minor: amount.minor(),
            percentage: amount.percentage_of(Money::new(total_expenses)),
        })
        .collect();
    breakdown.sort_by(|a, b| {
        b.amount_minor
            .cmp(&a.amount_minor)
            .then_with(|| a.category.cmp(&b.category))
    });
    breakdown
}

/// Revenue and expenses per month with activity, oldest first, keeping the
/// latest six months.
fn revenue_trends(transactions: &[Transaction]) -> Vec<MonthlyTrend> {
    let mut months: BTreeMap<String, (Money, Money)> = BTreeMap::new();
    for tx in transactions.iter().filter(|tx| tx.status.is_completed()) {
        let bucket = months.entry(month_key(tx.occurred_at)).or_default();
        match tx.kind {
            TransactionKind::Income => bucket.0 += Money::new(tx.amount_minor),
            TransactionKind::Expense => bucket.1 += Money::new(tx.amount_minor),
        }
    }
    let skip = months.len().saturating_sub(TREND_MONTHS);
    months
        .into_iter()
        .skip(skip)
        .map(|(month, (revenue, expenses))| MonthlyTrend {
            month,
            revenue_minor: revenue.minor(),
            expenses_minor: expenses.minor(),
        })
        .collect()
}

fn top_students(
    transactions: &[Transaction],
    students: &HashMap<Uuid, Student>,
) -> Vec<TopStudent> {
    let mut paid: HashMap<Uuid, Money> = HashMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Income))
    {
        if let Some(student_id) = tx.student_id {
            *paid.entry(student_id).or_default() += Money::new(tx.amount_minor);
        }
    }
    let mut ranked: Vec<TopStudent> = paid
        .into_iter()
        .map(|(student_id, total_paid)| {
            let student = students.get(&student_id);
            TopStudent {
                student_id,
                name: student.map_or_else(|| UNKNOWN_NAME.to_string(), Student::display_name),
                grade: student.and_then(|s| s.grade.clone()),
                total_paid_minor: total_paid.minor(),
            }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.total_paid_minor
            .cmp(&a.total_paid_minor)
            .then_with(|| a.name.cmp(&b.name))
    });
    ranked.truncate(TOP_STUDENTS);
    ranked
}

/// Builds the summary report.
///
/// `transactions` are the entries dated inside the window, in any status.
/// `billed_minor` is the total of the invoices created inside the window.
pub fn financial_report(
    window: ReportWindow,
    transactions: &[Transaction],
    billed_minor: i64,
    students: &HashMap<Uuid, Student>,
) -> FinancialReport {
    let total_revenue: Money = transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Income))
        .map(|tx| Money::new(tx.amount_minor))
        .sum();
    let total_expenses: Money = transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Expense))
        .map(|tx| Money::new(tx.amount_minor))
        .sum();
    let billed = Money::new(billed_minor);

    FinancialReport {
        window,
        total_revenue_minor: total_revenue.minor(),
        total_expenses_minor: total_expenses.minor(),
        net_profit_minor: (total_revenue - total_expenses).minor(),
        fee_collection_rate: total_revenue.percentage_of(billed),
        outstanding_fees_minor: (billed - total_revenue).minor(),
        expense_breakdown: expense_breakdown(transactions, total_expenses.minor()),
        revenue_trends: revenue_trends(transactions),
        top_students: top_students(transactions, students),
    }
}

fn payment_methods(transactions: &[Transaction]) -> Vec<PaymentMethodAmount> {
    let mut by_method: HashMap<PaymentMethod, (u64, Money)> = HashMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Income))
    {
        let entry = by_method.entry(tx.payment_method).or_default();
        entry.0 += 1;
        entry.1 += Money::new(tx.amount_minor);
    }
    let mut methods: Vec<PaymentMethodAmount> = by_method
        .into_iter()
        .map(|(method, (count, amount))| PaymentMethodAmount {
            method,
            count,
            amount_minor: amount.minor(),
        })
        .collect();
    methods.sort_by(|a, b| {
        b.amount_minor
            .cmp(&a.amount_minor)
            .then_with(|| a.method.as_str().cmp(b.method.as_str()))
    });
    methods
}

/// Days between the due date and `today`, rounded down.
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days()
}

fn overdue_invoices(
    invoices: &[Invoice],
    students: &HashMap<Uuid, Student>,
    today: NaiveDate,
) -> Vec<OverdueInvoice> {
    let mut overdue: Vec<OverdueInvoice> = invoices
        .iter()
        .filter(|invoice| invoice.status == crate::InvoiceStatus::Overdue)
        .map(|invoice| OverdueInvoice {
            invoice_id: invoice.id,
            invoice_number: invoice.invoice_number.clone(),
            student_id: invoice.student_id,
            student_name: students
                .get(&invoice.student_id)
                .map_or_else(|| UNKNOWN_NAME.to_string(), Student::display_name),
            total_minor: invoice.total_minor,
            paid_minor: invoice.paid_minor,
            outstanding_minor: invoice.outstanding_minor(),
            due_date: invoice.due_date,
            days_overdue: days_overdue(invoice.due_date, today),
        })
        .collect();
    overdue.sort_by(|a, b| {
        b.days_overdue
            .cmp(&a.days_overdue)
            .then_with(|| a.invoice_number.cmp(&b.invoice_number))
    });
    overdue
}

/// Extends the summary with the payment-method split and every invoice that
/// is overdue as of `today`.
///
/// `open_invoices` are all invoices regardless of creation date, with their
/// status derived as of `today`.
pub fn collection_report(
    summary: FinancialReport,
    transactions: &[Transaction],
    open_invoices: &[Invoice],
    students: &HashMap<Uuid, Student>,
    today: NaiveDate,
) -> CollectionReport {
    CollectionReport {
        summary,
        payment_methods: payment_methods(transactions),
        overdue_invoices: overdue_invoices(open_invoices, students, today),
    }
}

/// Extends the summary with the biggest vendors and the expenses still
/// pending inside the window.
pub fn expense_report(
    summary: FinancialReport,
    transactions: &[Transaction],
    vendors: &HashMap<Uuid, Vendor>,
) -> ExpenseReport {
    let mut spend: HashMap<Uuid, Money> = HashMap::new();
    for tx in transactions
        .iter()
        .filter(|tx| is_completed(tx, TransactionKind::Expense))
    {
        if let Some(vendor_id) = tx.vendor_id {
            *spend.entry(vendor_id).or_default() += Money::new(tx.amount_minor);
        }
    }
    let mut top_vendors: Vec<VendorSpend> = spend
        .into_iter()
        .map(|(vendor_id, amount)| VendorSpend {
            vendor_id,
            name: vendors
                .get(&vendor_id)
                .map_or_else(|| UNKNOWN_NAME.to_string(), |v| v.name.clone()),
            amount_minor: amount.minor(),
        })
        .collect();
    top_vendors.sort_by(|a, b| {
        b.amount_minor
            .cmp(&a.amount_minor)
            .then_with(|| a.name.cmp(&b.name))
    });
    top_vendors.truncate(TOP_VENDORS);

    let pending: Vec<&Transaction> = transactions
        .iter()
        .filter(|tx| tx.kind == TransactionKind::Expense && tx.status == TransactionStatus::Pending)
        .collect();

    ExpenseReport {
        summary,
        top_vendors,
        pending_expenses_count: pending.len() as u64,
        pending_expenses_minor: pending
            .iter()
            .map(|tx| Money::new(tx.amount_minor))
            .sum::<Money>()
            .minor(),
    }
}
