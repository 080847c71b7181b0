//! The school-wide running totals.
//!
//! There is exactly one row, keyed by [`SCHOOL_FINANCE_ID`]. It is only ever
//! reached through the engine's get-or-create accessor, never a global.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Well-known key of the singleton row.
pub const SCHOOL_FINANCE_ID: &str = "school";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolFinance {
    pub balance_minor: i64,
    pub total_income_minor: i64,
    pub total_expenses_minor: i64,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "school_finance")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub balance: i64,
    pub total_income: i64,
    pub total_expenses: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for SchoolFinance {
    fn from(model: Model) -> Self {
        Self {
            balance_minor: model.balance,
            total_income_minor: model.total_income,
            total_expenses_minor: model.total_expenses,
        }
    }
}
