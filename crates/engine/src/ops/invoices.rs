use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use sea_orm::{
    ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::Expr,
};
use uuid::Uuid;

use crate::{
    CreateInvoiceCmd, EngineError, Invoice, InvoiceLineItem, InvoiceStatus, LineItemInput, Money,
    ResultEngine, TransactionKind, TransactionStatus, derive_status, invoice_line_items, invoices,
    next_invoice_number, transactions,
    util::{ensure_positive_amount, normalize_required_text},
};

use super::{Engine, finances, retry_on_conflict, with_tx};

/// Filters for listing invoices. Status matches the derived status.
#[derive(Clone, Debug, Default)]
pub struct InvoiceListFilter {
    pub student_id: Option<Uuid>,
    pub status: Option<InvoiceStatus>,
    /// Day used to derive `OVERDUE`; today (UTC) when absent.
    pub as_of: Option<NaiveDate>,
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn build_line_items(inputs: &[LineItemInput]) -> ResultEngine<(Vec<InvoiceLineItem>, i64)> {
    if inputs.is_empty() {
        return Err(EngineError::Validation(
            "an invoice needs at least one line item".to_string(),
        ));
    }
    let mut total = Money::ZERO;
    let mut items = Vec::with_capacity(inputs.len());
    for input in inputs {
        let description = normalize_required_text(&input.description, "line item description")?;
        ensure_positive_amount(input.amount_minor, "line item amount")?;
        ensure_positive_amount(input.quantity, "line item quantity")?;
        let item = InvoiceLineItem {
            id: Uuid::new_v4(),
            description,
            amount_minor: input.amount_minor,
            quantity: input.quantity,
        };
        let line_total = Money::new(input.amount_minor)
            .checked_mul(input.quantity)
            .ok_or_else(|| EngineError::Validation("line item total overflows".to_string()))?;
        total = total
            .checked_add(line_total)
            .ok_or_else(|| EngineError::Validation("invoice total overflows".to_string()))?;
        items.push(item);
    }
    ensure_positive_amount(total.minor(), "invoice total")?;
    Ok((items, total.minor()))
}

/// Sum of the completed payments linked to one invoice.
pub(super) async fn paid_minor<C: ConnectionTrait>(db: &C, invoice_id: &str) -> ResultEngine<i64> {
    let payments: Vec<transactions::Model> = transactions::Entity::find()
        .filter(transactions::Column::InvoiceId.eq(invoice_id))
        .filter(transactions::Column::Kind.eq(TransactionKind::Income.as_str()))
        .filter(transactions::Column::Status.eq(TransactionStatus::Completed.as_str()))
        .all(db)
        .await?;
    let paid: Money = payments.iter().map(|tx| Money::new(tx.amount_minor)).sum();
    Ok(paid.minor())
}

/// Completed payments of every invoice, keyed by invoice id.
pub(super) async fn paid_by_invoice<C: ConnectionTrait>(
    db: &C,
) -> ResultEngine<HashMap<String, i64>> {
    let payments: Vec<transactions::Model> = transactions::Entity::find()
        .filter(transactions::Column::InvoiceId.is_not_null())
        .filter(transactions::Column::Kind.eq(TransactionKind::Income.as_str()))
        .filter(transactions::Column::Status.eq(TransactionStatus::Completed.as_str()))
        .all(db)
        .await?;
    let mut paid: HashMap<String, Money> = HashMap::new();
    for tx in payments {
        if let Some(invoice_id) = tx.invoice_id {
            *paid.entry(invoice_id).or_default() += Money::new(tx.amount_minor);
        }
    }
    Ok(paid
        .into_iter()
        .map(|(invoice_id, amount)| (invoice_id, amount.minor()))
        .collect())
}

pub(super) async fn line_items_of<C: ConnectionTrait>(
    db: &C,
    invoice_id: &str,
) -> ResultEngine<Vec<InvoiceLineItem>> {
    invoice_line_items::Entity::find()
        .filter(invoice_line_items::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(invoice_line_items::Column::Position)
        .all(db)
        .await?
        .into_iter()
        .map(InvoiceLineItem::try_from)
        .collect()
}

pub(super) async fn load_invoice<C: ConnectionTrait>(
    db: &C,
    model: invoices::Model,
    today: NaiveDate,
) -> ResultEngine<Invoice> {
    let paid = paid_minor(db, &model.id).await?;
    let line_items = line_items_of(db, &model.id).await?;
    Invoice::from_parts(model, line_items, paid, today)
}

/// Compare-and-set write of an invoice status. The version always moves, so
/// any other unit of work that read the old version fails with `Conflict`.
pub(super) async fn write_invoice_status<C: ConnectionTrait>(
    db: &C,
    model: &invoices::Model,
    status: InvoiceStatus,
) -> ResultEngine<()> {
    let result = invoices::Entity::update_many()
        .col_expr(invoices::Column::Status, Expr::value(status.as_str()))
        .col_expr(
            invoices::Column::Version,
            Expr::col(invoices::Column::Version).add(1),
        )
        .filter(invoices::Column::Id.eq(model.id.as_str()))
        .filter(invoices::Column::Version.eq(model.version))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(EngineError::Conflict(format!(
            "invoice {} was modified concurrently",
            model.invoice_number
        )));
    }
    Ok(())
}

/// Re-derives the status after the invoice's payment set changed and
/// persists it.
pub(super) async fn persist_derived_status<C: ConnectionTrait>(
    db: &C,
    model: &invoices::Model,
) -> ResultEngine<InvoiceStatus> {
    let current = InvoiceStatus::try_from(model.status.as_str())?;
    let paid = paid_minor(db, &model.id).await?;
    let status = derive_status(current, paid, model.total_minor, model.due_date, today());
    write_invoice_status(db, model, status).await?;
    Ok(status)
}

impl Engine {
    /// Issues an invoice: allocates the next number, stores the invoice with
    /// its line items and books the total on both aggregates.
    pub async fn create_invoice(&self, cmd: CreateInvoiceCmd) -> ResultEngine<Invoice> {
        let (line_items, total_minor) = build_line_items(&cmd.line_items)?;
        if cmd.due_date < cmd.issue_date {
            return Err(EngineError::Validation(
                "due date must not precede issue date".to_string(),
            ));
        }

        let invoice = retry_on_conflict!(
            self,
            "create_invoice",
            self.create_invoice_once(&cmd, &line_items, total_minor).await
        )?;
        tracing::info!(
            invoice_id = %invoice.id,
            invoice_number = %invoice.invoice_number,
            student_id = %invoice.student_id,
            total_minor = invoice.total_minor,
            "invoice created"
        );
        Ok(invoice)
    }

    async fn create_invoice_once(
        &self,
        cmd: &CreateInvoiceCmd,
        line_items: &[InvoiceLineItem],
        total_minor: i64,
    ) -> ResultEngine<Invoice> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;
            self.require_student(&db_tx, cmd.student_id).await?;

            let now = Utc::now();
            let last = invoices::Entity::find()
                .order_by_desc(invoices::Column::CreatedAt)
                .order_by_desc(invoices::Column::InvoiceNumber)
                .one(&db_tx)
                .await?;
            let invoice_number =
                next_invoice_number(last.as_ref().map(|m| m.invoice_number.as_str()), now.year());

            let invoice = Invoice {
                id: Uuid::new_v4(),
                invoice_number,
                student_id: cmd.student_id,
                total_minor,
                paid_minor: 0,
                issue_date: cmd.issue_date,
                due_date: cmd.due_date,
                status: InvoiceStatus::Pending,
                line_items: line_items.to_vec(),
                created_by: cmd.user_id.clone(),
                created_at: now,
            };
            invoices::ActiveModel::from(&invoice).insert(&db_tx).await?;

            let item_models = invoice
                .line_items
                .iter()
                .enumerate()
                .map(|(position, item)| {
                    let position = i32::try_from(position).map_err(|_| {
                        EngineError::Validation("too many line items".to_string())
                    })?;
                    Ok(invoice_line_items::ActiveModel::for_invoice(
                        invoice.id, position, item,
                    ))
                })
                .collect::<ResultEngine<Vec<_>>>()?;
            invoice_line_items::Entity::insert_many(item_models)
                .exec_without_returning(&db_tx)
                .await?;

            finances::apply_invoice_issued(&db_tx, invoice.student_id, invoice.total_minor)
                .await?;
            Ok(invoice)
        })
    }

    /// Returns one invoice with its paid amount and derived status.
    pub async fn invoice(&self, invoice_id: Uuid, user_id: &str) -> ResultEngine<Invoice> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            load_invoice(&db_tx, model, today()).await
        })
    }

    /// Lists invoices, newest first, with their paid amounts joined in. The
    /// status is derived for the read only.
    pub async fn list_invoices(
        &self,
        user_id: &str,
        filter: &InvoiceListFilter,
    ) -> ResultEngine<Vec<Invoice>> {
        let as_of = filter.as_of.unwrap_or_else(today);
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;

            let mut query = invoices::Entity::find();
            if let Some(student_id) = filter.student_id {
                query = query.filter(invoices::Column::StudentId.eq(student_id.to_string()));
            }
            let models = query
                .order_by_desc(invoices::Column::CreatedAt)
                .order_by_desc(invoices::Column::InvoiceNumber)
                .all(&db_tx)
                .await?;
            let paid = paid_by_invoice(&db_tx).await?;

            let mut out = Vec::with_capacity(models.len());
            for model in models {
                let paid_minor = paid.get(&model.id).copied().unwrap_or(0);
                let line_items = line_items_of(&db_tx, &model.id).await?;
                let invoice = Invoice::from_parts(model, line_items, paid_minor, as_of)?;
                if filter.status.is_none_or(|status| status == invoice.status) {
                    out.push(invoice);
                }
            }
            Ok(out)
        })
    }

    /// Cancels an invoice, or persists its derived status for any other
    /// requested status. A cancelled invoice stays cancelled.
    pub async fn update_invoice_status(
        &self,
        invoice_id: Uuid,
        status: InvoiceStatus,
        user_id: &str,
    ) -> ResultEngine<Invoice> {
        let invoice = retry_on_conflict!(
            self,
            "update_invoice_status",
            self.update_invoice_status_once(invoice_id, status, user_id)
                .await
        )?;
        tracing::info!(
            invoice_id = %invoice.id,
            status = invoice.status.as_str(),
            "invoice status updated"
        );
        Ok(invoice)
    }

    async fn update_invoice_status_once(
        &self,
        invoice_id: Uuid,
        requested: InvoiceStatus,
        user_id: &str,
    ) -> ResultEngine<Invoice> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            let model = self.require_invoice(&db_tx, invoice_id).await?;
            let current = InvoiceStatus::try_from(model.status.as_str())?;

            let next = match (current, requested) {
                (InvoiceStatus::Cancelled, InvoiceStatus::Cancelled) => None,
                (InvoiceStatus::Cancelled, _) => {
                    return Err(EngineError::Validation(
                        "a cancelled invoice cannot be reopened".to_string(),
                    ));
                }
                (_, InvoiceStatus::Cancelled) => Some(InvoiceStatus::Cancelled),
                (_, _) => {
                    let paid = paid_minor(&db_tx, &model.id).await?;
                    let derived =
                        derive_status(current, paid, model.total_minor, model.due_date, today());
                    (derived != current).then_some(derived)
                }
            };
            if let Some(next) = next {
                write_invoice_status(&db_tx, &model, next).await?;
            }

            let model = self.require_invoice(&db_tx, invoice_id).await?;
            load_invoice(&db_tx, model, today()).await
        })
    }

    /// Persists the derived status of every non-cancelled invoice whose
    /// stored status is stale. Returns how many invoices changed.
    pub async fn refresh_invoice_statuses(&self, user_id: &str) -> ResultEngine<u64> {
        let changed = retry_on_conflict!(
            self,
            "refresh_invoice_statuses",
            self.refresh_invoice_statuses_once(user_id).await
        )?;
        if changed > 0 {
            tracing::info!(changed, "invoice statuses refreshed");
        }
        Ok(changed)
    }

    async fn refresh_invoice_statuses_once(&self, user_id: &str) -> ResultEngine<u64> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            let models = invoices::Entity::find()
                .filter(invoices::Column::Status.ne(InvoiceStatus::Cancelled.as_str()))
                .all(&db_tx)
                .await?;
            let paid = paid_by_invoice(&db_tx).await?;
            let today = today();

            let mut changed: u64 = 0;
            for model in models {
                let current = InvoiceStatus::try_from(model.status.as_str())?;
                let paid_minor = paid.get(&model.id).copied().unwrap_or(0);
                let derived =
                    derive_status(current, paid_minor, model.total_minor, model.due_date, today);
                if derived != current {
                    write_invoice_status(&db_tx, &model, derived).await?;
                    changed += 1;
                }
            }
            Ok(changed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_items_are_validated_and_totalled() {
        let (items, total) = build_line_items(&[
            LineItemInput::new("Tuition", 400, 2),
            LineItemInput::new("Books", 200, 1),
        ])
        .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(total, 1000);

        assert!(build_line_items(&[]).is_err());
        assert!(build_line_items(&[LineItemInput::new(" ", 100, 1)]).is_err());
        assert!(build_line_items(&[LineItemInput::new("Fee", 0, 1)]).is_err());
        assert!(build_line_items(&[LineItemInput::new("Fee", 100, 0)]).is_err());
        assert!(build_line_items(&[LineItemInput::new("Fee", i64::MAX, 2)]).is_err());
        assert!(build_line_items(&[LineItemInput::new("Fee", 1_000_000_000_000, 1_000_000)]).is_err());
    }
}
