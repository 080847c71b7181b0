//! Per-student running totals, a cache derived from the ledger.
//!
//! `balance == total_paid_minor - total_due_minor` holds by construction: every
//! write goes through a single increment that moves `balance` by
//! `delta_paid - delta_due`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentFinance {
    pub student_id: Uuid,
    pub total_paid_minor: i64,
    pub total_due_minor: i64,
    pub balance_minor: i64,
}

impl StudentFinance {
    /// The view of a student with no ledger activity yet.
    pub fn empty(student_id: Uuid) -> Self {
        Self {
            student_id,
            total_paid_minor: 0,
            total_due_minor: 0,
            balance_minor: 0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "student_finances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub student_id: String,
    pub total_paid: i64,
    pub total_due: i64,
    pub balance: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for StudentFinance {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            student_id: parse_uuid(&model.student_id, "student")?,
            total_paid_minor: model.total_paid,
            total_due_minor: model.total_due,
            balance_minor: model.balance,
        })
    }
}
