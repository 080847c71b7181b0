//! Serialization of already-computed reports.
//!
//! Nothing here touches the ledger. CSV output has the header
//! `section,label,amount,extra`, quotes every field and doubles embedded
//! quotes; amounts are rendered in major units.

use std::string::FromUtf8Error;

use serde::Serialize;
use thiserror::Error;

use crate::{CollectionReport, ExpenseReport, FinancialReport, Money};

const CSV_HEADER: [&str; 4] = ["section", "label", "amount", "extra"];

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("CSV buffer error: {0}")]
    Buffer(String),
    #[error("output is not UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One CSV line of a report.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportRow {
    pub section: &'static str,
    pub label: String,
    pub amount: Option<Money>,
    pub extra: String,
}

impl ExportRow {
    fn new(section: &'static str, label: impl Into<String>, amount: Option<Money>) -> Self {
        Self {
            section,
            label: label.into(),
            amount,
            extra: String::new(),
        }
    }

    fn extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = extra.into();
        self
    }
}

/// Flattens a report into CSV rows.
pub trait ExportRows {
    fn export_rows(&self) -> Vec<ExportRow>;
}

impl ExportRows for FinancialReport {
    fn export_rows(&self) -> Vec<ExportRow> {
        let mut rows = vec![
            ExportRow::new("window", "start", None).extra(self.window.start.to_rfc3339()),
            ExportRow::new("window", "end", None).extra(self.window.end.to_rfc3339()),
            ExportRow::new(
                "summary",
                "total_revenue",
                Some(Money::new(self.total_revenue_minor)),
            ),
            ExportRow::new(
                "summary",
                "total_expenses",
                Some(Money::new(self.total_expenses_minor)),
            ),
            ExportRow::new("summary", "net_profit", Some(Money::new(self.net_profit_minor))),
            ExportRow::new("summary", "fee_collection_rate", None)
                .extra(format!("{:.2}", self.fee_collection_rate)),
            ExportRow::new(
                "summary",
                "outstanding_fees",
                Some(Money::new(self.outstanding_fees_minor)),
            ),
        ];
        rows.extend(self.expense_breakdown.iter().map(|entry| {
            ExportRow::new(
                "expense_breakdown",
                entry.category.clone(),
                Some(Money::new(entry.amount_minor)),
            )
            .extra(format!("{:.2}", entry.percentage))
        }));
        for trend in &self.revenue_trends {
            rows.push(
                ExportRow::new(
                    "revenue_trend",
                    trend.month.clone(),
                    Some(Money::new(trend.revenue_minor)),
                )
                .extra("revenue"),
            );
            rows.push(
                ExportRow::new(
                    "revenue_trend",
                    trend.month.clone(),
                    Some(Money::new(trend.expenses_minor)),
                )
                .extra("expenses"),
            );
        }
        rows.extend(self.top_students.iter().map(|student| {
            ExportRow::new(
                "top_student",
                student.name.clone(),
                Some(Money::new(student.total_paid_minor)),
            )
            .extra(student.grade.clone().unwrap_or_default())
        }));
        rows
    }
}

impl ExportRows for CollectionReport {
    fn export_rows(&self) -> Vec<ExportRow> {
        let mut rows = self.summary.export_rows();
        rows.extend(self.payment_methods.iter().map(|method| {
            ExportRow::new(
                "payment_method",
                method.method.as_str(),
                Some(Money::new(method.amount_minor)),
            )
            .extra(method.count.to_string())
        }));
        rows.extend(self.overdue_invoices.iter().map(|invoice| {
            ExportRow::new(
                "overdue_invoice",
                format!("{} {}", invoice.invoice_number, invoice.student_name),
                Some(Money::new(invoice.outstanding_minor)),
            )
            .extra(format!("{} days", invoice.days_overdue))
        }));
        rows
    }
}

impl ExportRows for ExpenseReport {
    fn export_rows(&self) -> Vec<ExportRow> {
        let mut rows = self.summary.export_rows();
        rows.extend(self.top_vendors.iter().map(|vendor| {
            ExportRow::new(
                "top_vendor",
                vendor.name.clone(),
                Some(Money::new(vendor.amount_minor)),
            )
        }));
        rows.push(
            ExportRow::new(
                "pending_expenses",
                "total",
                Some(Money::new(self.pending_expenses_minor)),
            )
            .extra(self.pending_expenses_count.to_string()),
        );
        rows
    }
}

/// Renders a report as CSV with every field quoted.
pub fn to_csv<R: ExportRows + ?Sized>(report: &R) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;
    for row in report.export_rows() {
        let amount = row.amount.map(|amount| amount.to_string()).unwrap_or_default();
        writer.write_record([row.section, row.label.as_str(), amount.as_str(), row.extra.as_str()])?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

/// Renders a report as pretty-printed JSON.
pub fn to_json<R: Serialize + ?Sized>(report: &R) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(report)?)
}
