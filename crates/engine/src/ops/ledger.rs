use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::{
    EngineError, RecordTransactionCmd, ResultEngine, Transaction, TransactionKind,
    TransactionStatus, invoices, transactions,
    util::{ensure_positive_amount, normalize_optional_text, normalize_required_text},
    vendors,
};

use super::{
    Engine,
    finances::{self, FinanceEffect},
    invoices::{paid_minor, persist_derived_status},
    retry_on_conflict, with_tx,
};

/// Filters for listing ledger entries.
///
/// `from` and `to` are both inclusive, in UTC.
#[derive(Clone, Debug, Default)]
pub struct TransactionListFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub kind: Option<TransactionKind>,
    pub status: Option<TransactionStatus>,
    pub student_id: Option<Uuid>,
    pub invoice_id: Option<Uuid>,
}

fn validate_list_filter(filter: &TransactionListFilter) -> ResultEngine<()> {
    if let (Some(from), Some(to)) = (filter.from, filter.to)
        && from > to
    {
        return Err(EngineError::Validation(
            "invalid range: from must be <= to".to_string(),
        ));
    }
    Ok(())
}

trait ApplyTxFilters: QueryFilter + Sized {
    fn apply_tx_filters(self, filter: &TransactionListFilter) -> Self;
}

impl<T> ApplyTxFilters for T
where
    T: QueryFilter + Sized,
{
    fn apply_tx_filters(mut self, filter: &TransactionListFilter) -> Self {
        if let Some(from) = filter.from {
            self = self.filter(transactions::Column::OccurredAt.gte(from));
        }
        if let Some(to) = filter.to {
            self = self.filter(transactions::Column::OccurredAt.lte(to));
        }
        if let Some(kind) = filter.kind {
            self = self.filter(transactions::Column::Kind.eq(kind.as_str()));
        }
        if let Some(status) = filter.status {
            self = self.filter(transactions::Column::Status.eq(status.as_str()));
        }
        if let Some(student_id) = filter.student_id {
            self = self.filter(transactions::Column::StudentId.eq(student_id.to_string()));
        }
        if let Some(invoice_id) = filter.invoice_id {
            self = self.filter(transactions::Column::InvoiceId.eq(invoice_id.to_string()));
        }
        self
    }
}

/// Rejects a payment that would push the invoice's completed payments over
/// its total.
pub(super) async fn guard_overpayment(
    db: &DatabaseTransaction,
    invoice: &invoices::Model,
    amount_minor: i64,
) -> ResultEngine<()> {
    let paid = paid_minor(db, &invoice.id).await?;
    let exceeds = paid
        .checked_add(amount_minor)
        .is_none_or(|after| after > invoice.total_minor);
    if exceeds {
        tracing::warn!(
            invoice_number = %invoice.invoice_number,
            total_minor = invoice.total_minor,
            paid_minor = paid,
            attempted_minor = amount_minor,
            "overpayment rejected"
        );
        return Err(EngineError::OverpaymentRejected {
            invoice_id: crate::util::parse_uuid(&invoice.id, "invoice")?,
            total_minor: invoice.total_minor,
            paid_minor: paid,
            attempted_minor: amount_minor,
        });
    }
    Ok(())
}

/// Writes a new ledger entry, applies its aggregate effect and, for invoice
/// payments, persists the invoice's derived status.
///
/// Callers have already authorized the user and resolved every link.
pub(super) async fn append_transaction(
    db: &DatabaseTransaction,
    tx: &Transaction,
    invoice: Option<&invoices::Model>,
) -> ResultEngine<()> {
    if let Some(invoice) = invoice
        && tx.kind == TransactionKind::Income
        && tx.status.is_completed()
    {
        guard_overpayment(db, invoice, tx.amount_minor).await?;
    }

    transactions::ActiveModel::from(tx).insert(db).await?;
    let effect = FinanceEffect::of(tx.kind, tx.status, tx.amount_minor, tx.student_id);
    finances::apply_effect(db, effect, 1).await?;

    if let Some(invoice) = invoice {
        persist_derived_status(db, invoice).await?;
    }
    Ok(())
}

async fn linked_invoice(
    db: &DatabaseTransaction,
    model: &transactions::Model,
) -> ResultEngine<Option<invoices::Model>> {
    match &model.invoice_id {
        Some(invoice_id) => Ok(invoices::Entity::find_by_id(invoice_id.clone())
            .one(db)
            .await?),
        None => Ok(None),
    }
}

impl Engine {
    /// Appends a raw ledger entry with optional links and applies its
    /// aggregate effect.
    pub async fn record_transaction(&self, cmd: RecordTransactionCmd) -> ResultEngine<Transaction> {
        ensure_positive_amount(cmd.amount_minor, "amount")?;
        let category = normalize_required_text(&cmd.category, "category")?;

        let tx = retry_on_conflict!(
            self,
            "record_transaction",
            self.record_transaction_once(&cmd, &category).await
        )?;
        tracing::info!(
            transaction_id = %tx.id,
            kind = tx.kind.as_str(),
            category = %tx.category,
            amount_minor = tx.amount_minor,
            status = tx.status.as_str(),
            "transaction recorded"
        );
        Ok(tx)
    }

    async fn record_transaction_once(
        &self,
        cmd: &RecordTransactionCmd,
        category: &str,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;

            let invoice = match cmd.links.invoice_id {
                Some(invoice_id) => Some(self.require_invoice(&db_tx, invoice_id).await?),
                None => None,
            };
            if invoice.is_some() && cmd.kind != TransactionKind::Income {
                return Err(EngineError::Validation(
                    "only income can be linked to an invoice".to_string(),
                ));
            }
            let student_id = match (cmd.links.student_id, &invoice) {
                (Some(student_id), Some(invoice)) => {
                    if invoice.student_id != student_id.to_string() {
                        return Err(EngineError::Validation(
                            "student does not match the invoice's student".to_string(),
                        ));
                    }
                    Some(student_id)
                }
                (Some(student_id), None) => {
                    self.require_student(&db_tx, student_id).await?;
                    Some(student_id)
                }
                (None, Some(invoice)) => {
                    Some(crate::util::parse_uuid(&invoice.student_id, "student")?)
                }
                (None, None) => None,
            };
            if let Some(vendor_id) = cmd.links.vendor_id {
                vendors::Entity::find_by_id(vendor_id.to_string())
                    .one(&db_tx)
                    .await?
                    .ok_or_else(|| EngineError::not_found("vendor"))?;
            }

            let now = Utc::now();
            let tx = Transaction {
                id: Uuid::new_v4(),
                kind: cmd.kind,
                category: category.to_string(),
                amount_minor: cmd.amount_minor,
                occurred_at: cmd.occurred_at,
                payment_method: cmd.payment_method,
                status: cmd.status,
                reference: normalize_optional_text(cmd.reference.as_deref()),
                description: normalize_optional_text(cmd.description.as_deref()),
                receipt_url: normalize_optional_text(cmd.receipt_url.as_deref()),
                invoice_id: cmd.links.invoice_id,
                student_id,
                vendor_id: cmd.links.vendor_id,
                created_by: cmd.user_id.clone(),
                created_at: now,
            };
            append_transaction(&db_tx, &tx, invoice.as_ref()).await?;
            Ok(tx)
        })
    }

    /// Moves a ledger entry to another status.
    ///
    /// Aggregates only change when the transition crosses the `Completed`
    /// boundary; a same-status transition is a no-op.
    pub async fn update_transaction_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        user_id: &str,
    ) -> ResultEngine<Transaction> {
        self.change_transaction_status(transaction_id, None, status, user_id)
            .await
    }

    pub(super) async fn change_transaction_status(
        &self,
        transaction_id: Uuid,
        kind: Option<TransactionKind>,
        status: TransactionStatus,
        user_id: &str,
    ) -> ResultEngine<Transaction> {
        let (tx, changed) = retry_on_conflict!(
            self,
            "update_transaction_status",
            self.change_transaction_status_once(transaction_id, kind, status, user_id)
                .await
        )?;
        if changed {
            tracing::info!(
                transaction_id = %tx.id,
                status = tx.status.as_str(),
                "transaction status updated"
            );
        }
        Ok(tx)
    }

    async fn change_transaction_status_once(
        &self,
        transaction_id: Uuid,
        kind: Option<TransactionKind>,
        status: TransactionStatus,
        user_id: &str,
    ) -> ResultEngine<(Transaction, bool)> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            let model = self
                .require_transaction_of_kind(&db_tx, transaction_id, kind)
                .await?;
            let current = TransactionStatus::try_from(model.status.as_str())?;
            if current == status {
                return Ok((Transaction::try_from(model)?, false));
            }

            let invoice = linked_invoice(&db_tx, &model).await?;
            if let Some(invoice) = &invoice
                && !current.is_completed()
                && status.is_completed()
            {
                guard_overpayment(&db_tx, invoice, model.amount_minor).await?;
            }

            let before = FinanceEffect::of_model(&model)?;
            let mut active: transactions::ActiveModel = model.into();
            active.status = ActiveValue::Set(status.as_str().to_string());
            let updated = active.update(&db_tx).await?;
            let after = FinanceEffect::of_model(&updated)?;

            finances::apply_effect(&db_tx, before, -1).await?;
            finances::apply_effect(&db_tx, after, 1).await?;
            if let Some(invoice) = &invoice {
                persist_derived_status(&db_tx, invoice).await?;
            }
            Ok((Transaction::try_from(updated)?, true))
        })
    }

    /// Compensating delete: reverses the entry's aggregate effect, then
    /// removes it.
    pub async fn delete_transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<()> {
        self.remove_transaction(transaction_id, None, user_id).await
    }

    pub(super) async fn remove_transaction(
        &self,
        transaction_id: Uuid,
        kind: Option<TransactionKind>,
        user_id: &str,
    ) -> ResultEngine<()> {
        let removed = retry_on_conflict!(
            self,
            "delete_transaction",
            self.remove_transaction_once(transaction_id, kind, user_id)
                .await
        )?;
        tracing::info!(
            transaction_id = %removed.id,
            kind = removed.kind.as_str(),
            amount_minor = removed.amount_minor,
            status = removed.status.as_str(),
            "transaction deleted"
        );
        Ok(())
    }

    async fn remove_transaction_once(
        &self,
        transaction_id: Uuid,
        kind: Option<TransactionKind>,
        user_id: &str,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            let model = self
                .require_transaction_of_kind(&db_tx, transaction_id, kind)
                .await?;
            let invoice = linked_invoice(&db_tx, &model).await?;

            finances::apply_effect(&db_tx, FinanceEffect::of_model(&model)?, -1).await?;
            transactions::Entity::delete_by_id(model.id.clone())
                .exec(&db_tx)
                .await?;
            if let Some(invoice) = &invoice {
                persist_derived_status(&db_tx, invoice).await?;
            }
            Transaction::try_from(model)
        })
    }

    /// Returns one ledger entry.
    pub async fn transaction(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            let model = self.require_transaction(&db_tx, transaction_id).await?;
            Transaction::try_from(model)
        })
    }

    /// Lists ledger entries, newest first.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionListFilter,
    ) -> ResultEngine<Vec<Transaction>> {
        validate_list_filter(filter)?;
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            transactions::Entity::find()
                .apply_tx_filters(filter)
                .order_by_desc(transactions::Column::OccurredAt)
                .order_by_desc(transactions::Column::Id)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Transaction::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn inverted_window_is_rejected() {
        let filter = TransactionListFilter {
            from: Some(Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()),
            ..TransactionListFilter::default()
        };
        assert!(validate_list_filter(&filter).is_err());

        let same_instant = TransactionListFilter {
            from: filter.to,
            to: filter.to,
            ..TransactionListFilter::default()
        };
        assert!(validate_list_filter(&same_instant).is_ok());
    }
}
