//! Incremental maintenance of the `SchoolFinance` and `StudentFinance`
//! aggregates.
//!
//! Every helper here runs against the caller's open DB transaction and uses
//! `col = col + delta` updates, so concurrent units of work never overwrite
//! each other's increments.

use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, prelude::*,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use crate::{
    EngineError, ResultEngine, SchoolFinance, StudentFinance, TransactionKind, TransactionStatus,
    school_finance::{self, SCHOOL_FINANCE_ID},
    student_finances, transactions,
};

/// Aggregate deltas caused by one ledger entry in its current state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct FinanceEffect {
    pub income: i64,
    pub expenses: i64,
    pub student: Option<(Uuid, i64)>,
}

impl FinanceEffect {
    /// Effect of an entry. Only `Completed` entries move the aggregates.
    pub(crate) fn of(
        kind: TransactionKind,
        status: TransactionStatus,
        amount_minor: i64,
        student_id: Option<Uuid>,
    ) -> Self {
        if !status.is_completed() {
            return Self::default();
        }
        match kind {
            TransactionKind::Income => Self {
                income: amount_minor,
                expenses: 0,
                student: student_id.map(|id| (id, amount_minor)),
            },
            TransactionKind::Expense => Self {
                income: 0,
                expenses: amount_minor,
                student: None,
            },
        }
    }

    pub(crate) fn of_model(model: &transactions::Model) -> ResultEngine<Self> {
        let kind = TransactionKind::try_from(model.kind.as_str())?;
        let status = TransactionStatus::try_from(model.status.as_str())?;
        let student_id = model
            .student_id
            .as_deref()
            .map(|raw| crate::util::parse_uuid(raw, "student"))
            .transpose()?;
        Ok(Self::of(kind, status, model.amount_minor, student_id))
    }
}

fn balance_delta(credit: i64, debit: i64) -> ResultEngine<i64> {
    credit
        .checked_sub(debit)
        .ok_or_else(|| EngineError::Validation("amount out of range".to_string()))
}

fn signed(sign: i64, amount: i64) -> ResultEngine<i64> {
    sign.checked_mul(amount)
        .ok_or_else(|| EngineError::Validation("amount out of range".to_string()))
}

async fn ensure_school_row<C: ConnectionTrait>(db: &C) -> ResultEngine<()> {
    let model = school_finance::ActiveModel {
        id: ActiveValue::Set(SCHOOL_FINANCE_ID.to_string()),
        balance: ActiveValue::Set(0),
        total_income: ActiveValue::Set(0),
        total_expenses: ActiveValue::Set(0),
    };
    school_finance::Entity::insert(model)
        .on_conflict(
            OnConflict::column(school_finance::Column::Id)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

async fn ensure_student_row<C: ConnectionTrait>(db: &C, student_id: Uuid) -> ResultEngine<()> {
    let model = student_finances::ActiveModel {
        student_id: ActiveValue::Set(student_id.to_string()),
        total_paid: ActiveValue::Set(0),
        total_due: ActiveValue::Set(0),
        balance: ActiveValue::Set(0),
    };
    student_finances::Entity::insert(model)
        .on_conflict(
            OnConflict::column(student_finances::Column::StudentId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

/// Returns the singleton, creating the zeroed row on first access.
pub(crate) async fn load_school_finance<C: ConnectionTrait>(db: &C) -> ResultEngine<SchoolFinance> {
    ensure_school_row(db).await?;
    let model = school_finance::Entity::find_by_id(SCHOOL_FINANCE_ID.to_string())
        .one(db)
        .await?
        .ok_or_else(|| EngineError::not_found("school finance"))?;
    Ok(SchoolFinance::from(model))
}

/// Returns the student's running totals, or an all-zero view if the student
/// has no ledger activity yet.
pub(crate) async fn load_student_finance<C: ConnectionTrait>(
    db: &C,
    student_id: Uuid,
) -> ResultEngine<StudentFinance> {
    match student_finances::Entity::find_by_id(student_id.to_string())
        .one(db)
        .await?
    {
        Some(model) => StudentFinance::try_from(model),
        None => Ok(StudentFinance::empty(student_id)),
    }
}

/// `balance` moves by `income_delta - expenses_delta`.
pub(crate) async fn apply_school_delta<C: ConnectionTrait>(
    db: &C,
    income_delta: i64,
    expenses_delta: i64,
) -> ResultEngine<()> {
    if income_delta == 0 && expenses_delta == 0 {
        return Ok(());
    }
    let balance = balance_delta(income_delta, expenses_delta)?;
    ensure_school_row(db).await?;
    school_finance::Entity::update_many()
        .col_expr(
            school_finance::Column::TotalIncome,
            Expr::col(school_finance::Column::TotalIncome).add(income_delta),
        )
        .col_expr(
            school_finance::Column::TotalExpenses,
            Expr::col(school_finance::Column::TotalExpenses).add(expenses_delta),
        )
        .col_expr(
            school_finance::Column::Balance,
            Expr::col(school_finance::Column::Balance).add(balance),
        )
        .filter(school_finance::Column::Id.eq(SCHOOL_FINANCE_ID))
        .exec(db)
        .await?;
    Ok(())
}

/// `balance` moves by `paid_delta - due_delta`, which keeps
/// `balance == total_paid - total_due`.
pub(crate) async fn apply_student_delta<C: ConnectionTrait>(
    db: &C,
    student_id: Uuid,
    paid_delta: i64,
    due_delta: i64,
) -> ResultEngine<()> {
    if paid_delta == 0 && due_delta == 0 {
        return Ok(());
    }
    let balance = balance_delta(paid_delta, due_delta)?;
    ensure_student_row(db, student_id).await?;
    student_finances::Entity::update_many()
        .col_expr(
            student_finances::Column::TotalPaid,
            Expr::col(student_finances::Column::TotalPaid).add(paid_delta),
        )
        .col_expr(
            student_finances::Column::TotalDue,
            Expr::col(student_finances::Column::TotalDue).add(due_delta),
        )
        .col_expr(
            student_finances::Column::Balance,
            Expr::col(student_finances::Column::Balance).add(balance),
        )
        .filter(student_finances::Column::StudentId.eq(student_id.to_string()))
        .exec(db)
        .await?;
    Ok(())
}

/// Applies `effect` scaled by `sign` (`1` to apply, `-1` to reverse).
///
/// A completed student payment counts as paid and also settles the same
/// amount of what the student owes.
pub(crate) async fn apply_effect<C: ConnectionTrait>(
    db: &C,
    effect: FinanceEffect,
    sign: i64,
) -> ResultEngine<()> {
    apply_school_delta(db, signed(sign, effect.income)?, signed(sign, effect.expenses)?).await?;
    if let Some((student_id, amount)) = effect.student {
        let paid = signed(sign, amount)?;
        apply_student_delta(db, student_id, paid, signed(-1, paid)?).await?;
    }
    Ok(())
}

/// Aggregate changes of issuing an invoice: the school books the total as
/// income and the student owes it.
pub(crate) async fn apply_invoice_issued<C: ConnectionTrait>(
    db: &C,
    student_id: Uuid,
    total_minor: i64,
) -> ResultEngine<()> {
    apply_school_delta(db, total_minor, 0).await?;
    apply_student_delta(db, student_id, 0, total_minor).await
}
