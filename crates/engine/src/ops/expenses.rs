use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ActiveValue, DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait,
    prelude::*,
};
use uuid::Uuid;

use crate::{
    RecordExpenseCmd, ResultEngine, Transaction, TransactionKind, UpdateExpenseCmd, Vendor,
    transactions,
    util::{ensure_positive_amount, normalize_optional_text, normalize_required_text, parse_uuid},
    vendors,
};

use super::{
    Engine,
    finances::{self, FinanceEffect},
    ledger::append_transaction,
    retry_on_conflict, with_tx,
};

/// Finds a vendor by exact name or creates it.
async fn resolve_vendor(
    db: &DatabaseTransaction,
    name: &str,
    category: &str,
) -> ResultEngine<Uuid> {
    if let Some(existing) = vendors::Entity::find()
        .filter(vendors::Column::Name.eq(name))
        .order_by_asc(vendors::Column::Id)
        .one(db)
        .await?
    {
        return parse_uuid(&existing.id, "vendor");
    }

    let id = Uuid::new_v4();
    vendors::ActiveModel {
        id: ActiveValue::Set(id.to_string()),
        name: ActiveValue::Set(name.to_string()),
        category: ActiveValue::Set(Some(category.to_string())),
    }
    .insert(db)
    .await?;
    tracing::debug!(vendor_id = %id, name, "vendor created");
    Ok(id)
}

impl Engine {
    /// Records money spent by the school, resolving the vendor by name.
    pub async fn record_expense(&self, cmd: RecordExpenseCmd) -> ResultEngine<Transaction> {
        ensure_positive_amount(cmd.amount_minor, "expense amount")?;
        let description = normalize_required_text(&cmd.description, "description")?;
        let category = normalize_required_text(&cmd.category, "category")?;

        let tx = retry_on_conflict!(
            self,
            "record_expense",
            self.record_expense_once(&cmd, &description, &category)
                .await
        )?;
        tracing::info!(
            transaction_id = %tx.id,
            category = %tx.category,
            amount_minor = tx.amount_minor,
            status = tx.status.as_str(),
            "expense recorded"
        );
        Ok(tx)
    }

    async fn record_expense_once(
        &self,
        cmd: &RecordExpenseCmd,
        description: &str,
        category: &str,
    ) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;

            let vendor_id = match normalize_optional_text(cmd.vendor_name.as_deref()) {
                Some(name) => Some(resolve_vendor(&db_tx, &name, category).await?),
                None => None,
            };
            let tx = Transaction {
                id: Uuid::new_v4(),
                kind: TransactionKind::Expense,
                category: category.to_string(),
                amount_minor: cmd.amount_minor,
                occurred_at: cmd.occurred_at,
                payment_method: cmd.payment_method,
                status: cmd.status,
                reference: None,
                description: Some(description.to_string()),
                receipt_url: normalize_optional_text(cmd.receipt_url.as_deref()),
                invoice_id: None,
                student_id: None,
                vendor_id,
                created_by: cmd.user_id.clone(),
                created_at: Utc::now(),
            };
            append_transaction(&db_tx, &tx, None).await?;
            Ok(tx)
        })
    }

    /// Edits an expense. A changed amount moves the school totals by the
    /// difference only, inside the same unit of work as the row update.
    pub async fn update_expense(&self, cmd: UpdateExpenseCmd) -> ResultEngine<Transaction> {
        if let Some(amount) = cmd.amount_minor {
            ensure_positive_amount(amount, "expense amount")?;
        }
        if let Some(description) = &cmd.description {
            normalize_required_text(description, "description")?;
        }

        let tx = retry_on_conflict!(
            self,
            "update_expense",
            self.update_expense_once(&cmd).await
        )?;
        tracing::info!(
            transaction_id = %tx.id,
            amount_minor = tx.amount_minor,
            "expense updated"
        );
        Ok(tx)
    }

    async fn update_expense_once(&self, cmd: &UpdateExpenseCmd) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;
            let model = self
                .require_transaction_of_kind(
                    &db_tx,
                    cmd.transaction_id,
                    Some(TransactionKind::Expense),
                )
                .await?;
            let before = FinanceEffect::of_model(&model)?;
            let category = model.category.clone();

            let mut active: transactions::ActiveModel = model.into();
            if let Some(amount) = cmd.amount_minor {
                active.amount_minor = ActiveValue::Set(amount);
            }
            if let Some(description) = &cmd.description {
                active.description =
                    ActiveValue::Set(Some(normalize_required_text(description, "description")?));
            }
            if let Some(occurred_at) = cmd.occurred_at {
                active.occurred_at = ActiveValue::Set(occurred_at);
            }
            if let Some(payment_method) = cmd.payment_method {
                active.payment_method = ActiveValue::Set(payment_method.as_str().to_string());
            }
            if let Some(receipt_url) = &cmd.receipt_url {
                active.receipt_url =
                    ActiveValue::Set(normalize_optional_text(Some(receipt_url.as_str())));
            }
            if let Some(name) = normalize_optional_text(cmd.vendor_name.as_deref()) {
                let vendor_id = resolve_vendor(&db_tx, &name, &category).await?;
                active.vendor_id = ActiveValue::Set(Some(vendor_id.to_string()));
            }
            let updated = active.update(&db_tx).await?;
            let after = FinanceEffect::of_model(&updated)?;

            finances::apply_school_delta(&db_tx, 0, after.expenses - before.expenses).await?;
            Transaction::try_from(updated)
        })
    }

    /// Compensating delete of an expense.
    pub async fn delete_expense(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<()> {
        self.remove_transaction(transaction_id, Some(TransactionKind::Expense), user_id)
            .await
    }

    /// Lists known vendors by name.
    pub async fn vendors(&self, user_id: &str) -> ResultEngine<Vec<Vendor>> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            vendors::Entity::find()
                .order_by_asc(vendors::Column::Name)
                .all(&db_tx)
                .await?
                .into_iter()
                .map(Vendor::try_from)
                .collect::<ResultEngine<Vec<_>>>()
        })
    }
}
