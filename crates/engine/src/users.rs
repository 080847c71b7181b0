//! Users table (minimal entity).
//!
//! Ledger writes record `created_by` as the username.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Accountant,
    Viewer,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Accountant => "ACCOUNTANT",
            Self::Viewer => "VIEWER",
        }
    }

    /// Whether the role may mutate the ledger.
    pub fn can_write(self) -> bool {
        matches!(self, Self::Admin | Self::Accountant)
    }
}

impl TryFrom<&str> for UserRole {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "ADMIN" => Ok(Self::Admin),
            "ACCOUNTANT" => Ok(Self::Accountant),
            "VIEWER" => Ok(Self::Viewer),
            other => Err(EngineError::Validation(format!("invalid user role: {other}"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub username: String,
    pub password: String,
    pub role: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
