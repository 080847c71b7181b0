use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::{DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    CollectionReport, ExpenseReport, FinancialReport, Invoice, InvoiceStatus, Money, ReportWindow,
    ResultEngine, Student, Transaction, Vendor, invoices,
    reports::{collection_report, expense_report, financial_report},
    students, transactions, vendors,
};

use super::{
    Engine,
    invoices::{line_items_of, paid_by_invoice},
    with_tx,
};

/// Rows a report is built from.
struct ReportInputs {
    window: ReportWindow,
    transactions: Vec<Transaction>,
    billed_minor: i64,
    students: HashMap<Uuid, Student>,
}

impl ReportInputs {
    fn summary(&self) -> FinancialReport {
        financial_report(
            self.window,
            &self.transactions,
            self.billed_minor,
            &self.students,
        )
    }
}

async fn load_inputs(
    db: &DatabaseTransaction,
    window: ReportWindow,
) -> ResultEngine<ReportInputs> {
    let transactions = transactions::Entity::find()
        .filter(transactions::Column::OccurredAt.gte(window.start))
        .filter(transactions::Column::OccurredAt.lte(window.end))
        .order_by_asc(transactions::Column::OccurredAt)
        .all(db)
        .await?
        .into_iter()
        .map(Transaction::try_from)
        .collect::<ResultEngine<Vec<_>>>()?;

    let billed_minor = invoices::Entity::find()
        .filter(invoices::Column::CreatedAt.gte(window.start))
        .filter(invoices::Column::CreatedAt.lte(window.end))
        .all(db)
        .await?
        .iter()
        .filter(|invoice| window.contains(invoice.created_at))
        .map(|invoice| Money::new(invoice.total_minor))
        .sum::<Money>()
        .minor();

    let students = students::Entity::find()
        .all(db)
        .await?
        .into_iter()
        .map(|model| Student::try_from(model).map(|student| (student.id, student)))
        .collect::<ResultEngine<HashMap<_, _>>>()?;

    Ok(ReportInputs {
        window,
        transactions,
        billed_minor,
        students,
    })
}

/// Every non-cancelled invoice with its status derived as of `now`.
async fn open_invoices(db: &DatabaseTransaction, now: DateTime<Utc>) -> ResultEngine<Vec<Invoice>> {
    let paid = paid_by_invoice(db).await?;
    let models = invoices::Entity::find()
        .filter(invoices::Column::Status.ne(InvoiceStatus::Cancelled.as_str()))
        .order_by_asc(invoices::Column::DueDate)
        .all(db)
        .await?;
    let mut out = Vec::with_capacity(models.len());
    for model in models {
        let paid_minor = paid.get(&model.id).copied().unwrap_or(0);
        let line_items = line_items_of(db, &model.id).await?;
        out.push(Invoice::from_parts(
            model,
            line_items,
            paid_minor,
            now.date_naive(),
        )?);
    }
    Ok(out)
}

impl Engine {
    /// Revenue, expenses, collection rate, breakdowns and trends for the
    /// window. Defaults to the start of the current year up to now.
    pub async fn generate_financial_report(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ResultEngine<FinancialReport> {
        let window = ReportWindow::resolve(start, end, Utc::now())?;
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let inputs = load_inputs(&db_tx, window).await?;
            Ok(inputs.summary())
        })
    }

    /// The financial report plus the payment-method split and the invoices
    /// overdue today.
    pub async fn generate_collection_report(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ResultEngine<CollectionReport> {
        let now = Utc::now();
        let window = ReportWindow::resolve(start, end, now)?;
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let inputs = load_inputs(&db_tx, window).await?;
            let open = open_invoices(&db_tx, now).await?;
            Ok(collection_report(
                inputs.summary(),
                &inputs.transactions,
                &open,
                &inputs.students,
                now.date_naive(),
            ))
        })
    }

    /// The financial report plus the top vendors and the pending expenses of
    /// the window.
    pub async fn generate_expense_report(
        &self,
        user_id: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> ResultEngine<ExpenseReport> {
        let window = ReportWindow::resolve(start, end, Utc::now())?;
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let inputs = load_inputs(&db_tx, window).await?;
            let vendors = vendors::Entity::find()
                .all(&db_tx)
                .await?
                .into_iter()
                .map(|model| Vendor::try_from(model).map(|vendor| (vendor.id, vendor)))
                .collect::<ResultEngine<HashMap<_, _>>>()?;
            Ok(expense_report(
                inputs.summary(),
                &inputs.transactions,
                &vendors,
            ))
        })
    }
}
