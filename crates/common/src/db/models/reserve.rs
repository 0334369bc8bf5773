//! Reserve entity: a discrepancy recorded at loading or delivery

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveSide {
    Loading,
    Delivery,
}

impl ReserveSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReserveSide::Loading => "loading",
            ReserveSide::Delivery => "delivery",
        }
    }
}

impl fmt::Display for ReserveSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReserveSide {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loading" => Ok(ReserveSide::Loading),
            "delivery" => Ok(ReserveSide::Delivery),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown reserve side '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cmr_reserves")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub side: String,

    /// Category label, e.g. "Colis endommagé"
    #[sea_orm(column_type = "Text")]
    pub reserve_type: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub comment: Option<String>,

    /// Object path inside the reserves bucket
    #[sea_orm(column_type = "Text", nullable)]
    pub photo_path: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn reserve_side(&self) -> Result<ReserveSide, AppError> {
        self.side.parse()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
