use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod student {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct StudentNew {
        pub first_name: String,
        pub last_name: String,
        pub grade: Option<String>,
    }
}

pub mod invoice {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct LineItemNew {
        pub description: String,
        pub amount_minor: i64,
        #[serde(default = "default_quantity")]
        pub quantity: i64,
    }

    fn default_quantity() -> i64 {
        1
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct InvoiceNew {
        pub student_id: Uuid,
        pub line_items: Vec<LineItemNew>,
        pub issue_date: NaiveDate,
        pub due_date: NaiveDate,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct InvoiceList {
        pub student_id: Option<Uuid>,
        /// `PENDING`, `PAID`, `OVERDUE` or `CANCELLED`.
        pub status: Option<String>,
    }
}

pub mod payment {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PaymentNew {
        pub invoice_id: Uuid,
        pub amount_minor: i64,
        /// `CASH`, `BANK_TRANSFER`, `CARD`, `MOBILE_MONEY` or `OTHER`.
        pub payment_method: String,
        pub reference: Option<String>,
        pub occurred_at: DateTime<FixedOffset>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DirectPaymentNew {
        pub student_id: Uuid,
        pub amount_minor: i64,
        pub payment_method: String,
        pub reference: Option<String>,
        pub description: Option<String>,
        pub occurred_at: DateTime<FixedOffset>,
    }
}

pub mod expense {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExpenseNew {
        pub description: String,
        pub amount_minor: i64,
        pub category: String,
        pub occurred_at: DateTime<FixedOffset>,
        pub vendor: Option<String>,
        pub payment_method: Option<String>,
        /// Defaults to `COMPLETED`.
        pub status: Option<String>,
        pub receipt_url: Option<String>,
    }

    /// Fields left out are not changed.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ExpenseUpdate {
        pub amount_minor: Option<i64>,
        pub description: Option<String>,
        pub occurred_at: Option<DateTime<FixedOffset>>,
        pub vendor: Option<String>,
        pub payment_method: Option<String>,
        pub receipt_url: Option<String>,
    }
}

pub mod transaction {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct StatusUpdate {
        pub status: String,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionList {
        pub from: Option<DateTime<FixedOffset>>,
        pub to: Option<DateTime<FixedOffset>>,
        pub kind: Option<String>,
        pub status: Option<String>,
        pub student_id: Option<Uuid>,
        pub invoice_id: Option<Uuid>,
    }
}

pub mod report {
    use super::*;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum ReportFormat {
        #[default]
        Json,
        Csv,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ReportQuery {
        pub start: Option<DateTime<FixedOffset>>,
        pub end: Option<DateTime<FixedOffset>>,
        #[serde(default)]
        pub format: ReportFormat,
    }
}

pub mod result {
    use super::*;

    /// Outcome of a call across the HTTP boundary.
    ///
    /// Failures carry `error_kind` (`VALIDATION`, `OVERPAYMENT_REJECTED`,
    /// `NOT_FOUND`, `CONFLICT`, `PERSISTENCE`, `AUTHORIZATION`) and a
    /// message meant for the user; `data` is only set on success.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ActionResult<T> {
        pub success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub error_kind: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub data: Option<T>,
    }

    impl<T> ActionResult<T> {
        pub fn ok(data: T) -> Self {
            Self {
                success: true,
                error_kind: None,
                message: None,
                data: Some(data),
            }
        }

        pub fn failed(error_kind: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                success: false,
                error_kind: Some(error_kind.into()),
                message: Some(message.into()),
                data: None,
            }
        }
    }

    impl ActionResult<()> {
        /// Success with no payload.
        pub fn done() -> Self {
            Self {
                success: true,
                error_kind: None,
                message: None,
                data: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_item_quantity_defaults_to_one() {
        let item: invoice::LineItemNew =
            serde_json::from_str(r#"{"description":"Tuition","amount_minor":1000}"#).unwrap();
        assert_eq!(item.quantity, 1);
    }

    #[test]
    fn failed_result_omits_data() {
        let body = serde_json::to_value(result::ActionResult::<()>::failed(
            "NOT_FOUND",
            "missing",
        ))
        .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "NOT_FOUND");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn report_query_defaults_to_json() {
        let query: report::ReportQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.format, report::ReportFormat::Json);
    }
}
