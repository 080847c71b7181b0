//! Invoice line items, owned exclusively by their invoice and immutable once
//! written.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{EngineError, util::parse_uuid};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub description: String,
    pub amount_minor: i64,
    pub quantity: i64,
}

impl InvoiceLineItem {
    pub fn line_total_minor(&self) -> i64 {
        self.amount_minor * self.quantity
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoice_line_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub invoice_id: String,
    pub position: i32,
    pub description: String,
    pub amount_minor: i64,
    pub quantity: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invoices::Entity",
        from = "Column::InvoiceId",
        to = "super::invoices::Column::Id"
    )]
    Invoices,
}

impl Related<super::invoices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Invoices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    pub(crate) fn for_invoice(invoice_id: Uuid, position: i32, item: &InvoiceLineItem) -> Self {
        Self {
            id: ActiveValue::Set(item.id.to_string()),
            invoice_id: ActiveValue::Set(invoice_id.to_string()),
            position: ActiveValue::Set(position),
            description: ActiveValue::Set(item.description.clone()),
            amount_minor: ActiveValue::Set(item.amount_minor),
            quantity: ActiveValue::Set(item.quantity),
        }
    }
}

impl TryFrom<Model> for InvoiceLineItem {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&model.id, "line item")?,
            description: model.description,
            amount_minor: model.amount_minor,
            quantity: model.quantity,
        })
    }
}
