//! Lifecycle event entity (append-only)

use super::document::DocumentStatus;
use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What happened, with the payload specific to each transition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    LoadingStart,
    LoadingEnd,
    DeliveryStart,
    DeliveryEnd {
        status: DocumentStatus,
        has_reserves: bool,
    },
}

impl EventKind {
    /// Value of the `event_type` column
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::LoadingStart => "loading_start",
            EventKind::LoadingEnd => "loading_end",
            EventKind::DeliveryStart => "delivery_start",
            EventKind::DeliveryEnd { .. } => "delivery_end",
        }
    }

    /// Value of the `metadata` column
    pub fn metadata(&self) -> serde_json::Value {
        match self {
            EventKind::DeliveryEnd {
                status,
                has_reserves,
            } => serde_json::json!({
                "status": status.as_str(),
                "has_reserves": has_reserves,
            }),
            _ => serde_json::json!({}),
        }
    }

    /// Rebuild the kind from its stored columns
    pub fn from_columns(event_type: &str, metadata: &serde_json::Value) -> Result<Self, AppError> {
        match event_type {
            "loading_start" => Ok(EventKind::LoadingStart),
            "loading_end" => Ok(EventKind::LoadingEnd),
            "delivery_start" => Ok(EventKind::DeliveryStart),
            "delivery_end" => {
                #[derive(Deserialize)]
                struct Payload {
                    status: DocumentStatus,
                    has_reserves: bool,
                }
                let payload: Payload = serde_json::from_value(metadata.clone())?;
                Ok(EventKind::DeliveryEnd {
                    status: payload.status,
                    has_reserves: payload.has_reserves,
                })
            }
            other => Err(AppError::InvalidFormat {
                message: format!("unknown event type '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cmr_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Actor who triggered the transition
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub event_type: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: serde_json::Value,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn kind(&self) -> Result<EventKind, AppError> {
        EventKind::from_columns(&self.event_type, &self.metadata)
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
