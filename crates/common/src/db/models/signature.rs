//! Signature entity, unique per (document, party)

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signing role
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureParty {
    /// Originating party, signs at loading
    Shipper,
    /// Receiving party, signs at delivery
    Consignee,
}

impl SignatureParty {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureParty::Shipper => "shipper",
            SignatureParty::Consignee => "consignee",
        }
    }
}

impl fmt::Display for SignatureParty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureParty {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shipper" => Ok(SignatureParty::Shipper),
            "consignee" => Ok(SignatureParty::Consignee),
            other => Err(AppError::InvalidFormat {
                message: format!("unknown signature party '{}'", other),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cmr_signatures")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub party: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub signer_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub signer_role: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub signer_email: Option<String>,

    /// Object path inside the signatures bucket
    #[sea_orm(column_type = "Text")]
    pub image_path: String,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn signature_party(&self) -> Result<SignatureParty, AppError> {
        self.party.parse()
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
