//! Vehicle entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vehicles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub plate_number: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub trailer_plate: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub label: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// "AB-123-CD / TR-456" style registration line
    pub fn registration(&self) -> String {
        match self.trailer_plate.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(trailer) => format!("{} / {}", self.plate_number, trailer),
            None => self.plate_number.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
