use chrono::Utc;
use sea_orm::TransactionTrait;
use uuid::Uuid;

use crate::{
    DIRECT_PAYMENT, DirectPaymentCmd, PaymentMethod, RecordPaymentCmd, ResultEngine,
    TUITION_PAYMENT, Transaction, TransactionKind, TransactionStatus,
    util::{ensure_positive_amount, normalize_optional_text, parse_uuid},
};

use super::{Engine, ledger::append_transaction, retry_on_conflict, with_tx};

fn completed_income(
    category: &str,
    amount_minor: i64,
    payment_method: PaymentMethod,
    occurred_at: chrono::DateTime<Utc>,
    user_id: &str,
) -> Transaction {
    Transaction {
        id: Uuid::new_v4(),
        kind: TransactionKind::Income,
        category: category.to_string(),
        amount_minor,
        occurred_at,
        payment_method,
        status: TransactionStatus::Completed,
        reference: None,
        description: None,
        receipt_url: None,
        invoice_id: None,
        student_id: None,
        vendor_id: None,
        created_by: user_id.to_string(),
        created_at: Utc::now(),
    }
}

impl Engine {
    /// Records a completed tuition payment against an invoice.
    ///
    /// The overpayment guard, the ledger write, both aggregate updates and
    /// the invoice status write form one unit of work. The invoice version
    /// read by the guard must still be current when the status is written,
    /// otherwise the unit of work is retried.
    pub async fn record_payment(&self, cmd: RecordPaymentCmd) -> ResultEngine<Transaction> {
        ensure_positive_amount(cmd.amount_minor, "payment amount")?;
        let tx = retry_on_conflict!(self, "record_payment", self.record_payment_once(&cmd).await)?;
        tracing::info!(
            transaction_id = %tx.id,
            invoice_id = %cmd.invoice_id,
            amount_minor = tx.amount_minor,
            "payment recorded"
        );
        Ok(tx)
    }

    async fn record_payment_once(&self, cmd: &RecordPaymentCmd) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;
            let invoice = self.require_invoice(&db_tx, cmd.invoice_id).await?;

            let mut tx = completed_income(
                TUITION_PAYMENT,
                cmd.amount_minor,
                cmd.payment_method,
                cmd.occurred_at,
                &cmd.user_id,
            );
            tx.reference = normalize_optional_text(cmd.reference.as_deref());
            tx.invoice_id = Some(cmd.invoice_id);
            tx.student_id = Some(parse_uuid(&invoice.student_id, "student")?);

            append_transaction(&db_tx, &tx, Some(&invoice)).await?;
            Ok(tx)
        })
    }

    /// Records money received from a student outside any invoice.
    pub async fn create_direct_payment(&self, cmd: DirectPaymentCmd) -> ResultEngine<Transaction> {
        ensure_positive_amount(cmd.amount_minor, "payment amount")?;
        let tx = retry_on_conflict!(
            self,
            "create_direct_payment",
            self.create_direct_payment_once(&cmd).await
        )?;
        tracing::info!(
            transaction_id = %tx.id,
            student_id = %cmd.student_id,
            amount_minor = tx.amount_minor,
            "direct payment recorded"
        );
        Ok(tx)
    }

    async fn create_direct_payment_once(&self, cmd: &DirectPaymentCmd) -> ResultEngine<Transaction> {
        with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, &cmd.user_id).await?;
            self.require_student(&db_tx, cmd.student_id).await?;

            let mut tx = completed_income(
                DIRECT_PAYMENT,
                cmd.amount_minor,
                cmd.payment_method,
                cmd.occurred_at,
                &cmd.user_id,
            );
            tx.reference = normalize_optional_text(cmd.reference.as_deref());
            tx.description = normalize_optional_text(cmd.description.as_deref());
            tx.student_id = Some(cmd.student_id);

            append_transaction(&db_tx, &tx, None).await?;
            Ok(tx)
        })
    }

    /// Moves a payment to another status, applying or reversing its effect
    /// on the aggregates when the `Completed` boundary is crossed.
    pub async fn update_payment_status(
        &self,
        transaction_id: Uuid,
        status: TransactionStatus,
        user_id: &str,
    ) -> ResultEngine<Transaction> {
        self.change_transaction_status(
            transaction_id,
            Some(TransactionKind::Income),
            status,
            user_id,
        )
        .await
    }

    /// Compensating delete of a payment.
    pub async fn delete_payment(&self, transaction_id: Uuid, user_id: &str) -> ResultEngine<()> {
        self.remove_transaction(transaction_id, Some(TransactionKind::Income), user_id)
            .await
    }
}
