use std::collections::BTreeMap;

use sea_orm::{ActiveValue, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ResultEngine, SchoolFinance, StudentFinance, TransactionStatus, invoices,
    school_finance::{self, SCHOOL_FINANCE_ID},
    student_finances, transactions,
    util::parse_uuid,
};

use super::{
    Engine,
    finances::{self, FinanceEffect},
    with_tx,
};

/// What the aggregates must hold according to the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinanceReplay {
    pub school: SchoolFinance,
    /// One entry per student with any invoice or payment, ordered by id.
    pub students: Vec<StudentFinance>,
}

/// Replays invoice issuance and every completed transaction from zero.
fn replay(
    invoice_models: &[invoices::Model],
    completed: &[transactions::Model],
) -> ResultEngine<FinanceReplay> {
    let mut school = SchoolFinance::default();
    let mut students: BTreeMap<Uuid, StudentFinance> = BTreeMap::new();

    for invoice in invoice_models {
        let student_id = parse_uuid(&invoice.student_id, "student")?;
        school.total_income_minor = school.total_income_minor.saturating_add(invoice.total_minor);
        let finance = students
            .entry(student_id)
            .or_insert_with(|| StudentFinance::empty(student_id));
        finance.total_due_minor = finance.total_due_minor.saturating_add(invoice.total_minor);
    }

    for tx in completed {
        let effect = FinanceEffect::of_model(tx)?;
        school.total_income_minor = school.total_income_minor.saturating_add(effect.income);
        school.total_expenses_minor = school.total_expenses_minor.saturating_add(effect.expenses);
        if let Some((student_id, amount)) = effect.student {
            let finance = students
                .entry(student_id)
                .or_insert_with(|| StudentFinance::empty(student_id));
            finance.total_paid_minor = finance.total_paid_minor.saturating_add(amount);
            finance.total_due_minor = finance.total_due_minor.saturating_sub(amount);
        }
    }

    school.balance_minor = school
        .total_income_minor
        .saturating_sub(school.total_expenses_minor);
    let students = students
        .into_values()
        .map(|mut finance| {
            finance.balance_minor = finance.total_paid_minor.saturating_sub(finance.total_due_minor);
            finance
        })
        .collect();
    Ok(FinanceReplay { school, students })
}

async fn replay_from_ledger(db: &DatabaseTransaction) -> ResultEngine<FinanceReplay> {
    let invoice_models = invoices::Entity::find().all(db).await?;
    let completed = transactions::Entity::find()
        .filter(transactions::Column::Status.eq(TransactionStatus::Completed.as_str()))
        .all(db)
        .await?;
    replay(&invoice_models, &completed)
}

impl Engine {
    /// Computes, without writing anything, what the aggregates must be.
    ///
    /// Comparing the result with [`Engine::school_finance`] and
    /// [`Engine::student_finance`] detects drift.
    pub async fn replay_finances(&self, user_id: &str) -> ResultEngine<FinanceReplay> {
        with_tx!(self, |db_tx| {
            self.require_reader(&db_tx, user_id).await?;
            replay_from_ledger(&db_tx).await
        })
    }

    /// Overwrites both aggregates with the replayed values in one unit of
    /// work.
    pub async fn recompute_finances(&self, user_id: &str) -> ResultEngine<FinanceReplay> {
        let result: ResultEngine<FinanceReplay> = with_tx!(self, |db_tx| {
            self.require_writer(&db_tx, user_id).await?;
            let replayed = replay_from_ledger(&db_tx).await?;

            student_finances::Entity::delete_many().exec(&db_tx).await?;
            if !replayed.students.is_empty() {
                let rows = replayed
                    .students
                    .iter()
                    .map(|finance| student_finances::ActiveModel {
                        student_id: ActiveValue::Set(finance.student_id.to_string()),
                        total_paid: ActiveValue::Set(finance.total_paid_minor),
                        total_due: ActiveValue::Set(finance.total_due_minor),
                        balance: ActiveValue::Set(finance.balance_minor),
                    });
                student_finances::Entity::insert_many(rows)
                    .exec_without_returning(&db_tx)
                    .await?;
            }

            finances::load_school_finance(&db_tx).await?;
            school_finance::ActiveModel {
                id: ActiveValue::Set(SCHOOL_FINANCE_ID.to_string()),
                balance: ActiveValue::Set(replayed.school.balance_minor),
                total_income: ActiveValue::Set(replayed.school.total_income_minor),
                total_expenses: ActiveValue::Set(replayed.school.total_expenses_minor),
            }
            .update(&db_tx)
            .await?;
            Ok(replayed)
        });
        let replayed = result?;
        tracing::info!(
            balance_minor = replayed.school.balance_minor,
            students = replayed.students.len(),
            "finances recomputed from ledger"
        );
        Ok(replayed)
    }
}
