//! CMR document entity

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document status
///
/// Statuses only move forward. The two terminal states share the same rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    ReadyToLoad,
    Loading,
    InTransit,
    ReadyToDeliver,
    Completed,
    CompletedWithReserves,
}

impl DocumentStatus {
    pub const ALL: [DocumentStatus; 7] = [
        DocumentStatus::Draft,
        DocumentStatus::ReadyToLoad,
        DocumentStatus::Loading,
        DocumentStatus::InTransit,
        DocumentStatus::ReadyToDeliver,
        DocumentStatus::Completed,
        DocumentStatus::CompletedWithReserves,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::ReadyToLoad => "ready_to_load",
            DocumentStatus::Loading => "loading",
            DocumentStatus::InTransit => "in_transit",
            DocumentStatus::ReadyToDeliver => "ready_to_deliver",
            DocumentStatus::Completed => "completed",
            DocumentStatus::CompletedWithReserves => "completed_with_reserves",
        }
    }

    /// Position in the lifecycle order
    pub fn rank(&self) -> u8 {
        match self {
            DocumentStatus::Draft => 0,
            DocumentStatus::ReadyToLoad => 1,
            DocumentStatus::Loading => 2,
            DocumentStatus::InTransit => 3,
            DocumentStatus::ReadyToDeliver => 4,
            DocumentStatus::Completed | DocumentStatus::CompletedWithReserves => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::CompletedWithReserves
        )
    }

    /// Human readable label printed on exported documents
    pub fn label(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "Brouillon",
            DocumentStatus::ReadyToLoad => "Prêt au chargement",
            DocumentStatus::Loading => "Chargement en cours",
            DocumentStatus::InTransit => "En transit",
            DocumentStatus::ReadyToDeliver => "Prêt à livrer",
            DocumentStatus::Completed => "Livré",
            DocumentStatus::CompletedWithReserves => "Livré avec réserves",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| AppError::InvalidFormat {
                message: format!("unknown document status '{}'", s),
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cmr_documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owner
    pub user_id: Uuid,

    pub vehicle_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub cmr_number: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub is_international: bool,

    // Parties
    #[sea_orm(column_type = "Text", nullable)]
    pub shipper_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub shipper_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub consignee_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub consignee_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub principal_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub principal_address: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub delivery_carrier_name: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub delivery_carrier_address: Option<String>,

    // Places and planning
    #[sea_orm(column_type = "Text", nullable)]
    pub loading_place: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub delivery_place: Option<String>,
    pub loading_date: Option<DateTimeWithTimeZone>,
    pub requested_delivery_at: Option<DateTimeWithTimeZone>,
    pub loading_arrival_at: Option<DateTimeWithTimeZone>,
    pub loading_departure_at: Option<DateTimeWithTimeZone>,
    pub delivery_arrival_at: Option<DateTimeWithTimeZone>,
    pub delivery_departure_at: Option<DateTimeWithTimeZone>,

    // Goods
    #[sea_orm(column_type = "Text", nullable)]
    pub goods_description: Option<String>,
    pub package_count: Option<i32>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub gross_weight_kg: Option<Decimal>,
    #[sea_orm(column_type = "Text", nullable)]
    pub packaging_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub marks: Option<String>,

    // Dangerous goods
    #[sea_orm(column_type = "Text", nullable)]
    pub dangerous_class: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub dangerous_un_number: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub dangerous_adr_letter: Option<String>,

    // Temperature control, degrees Celsius
    #[sea_orm(column_type = "Decimal(Some((6, 1)))", nullable)]
    pub temperature_min: Option<Decimal>,
    #[sea_orm(column_type = "Decimal(Some((6, 1)))", nullable)]
    pub temperature_max: Option<Decimal>,

    // Pallets
    pub pallets_euro: Option<i32>,
    pub pallets_standard: Option<i32>,
    pub pallets_half: Option<i32>,
    pub pallets_quarter: Option<i32>,
    pub pallets_chep: Option<i32>,
    pub pallets_other: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub pallet_origin: Option<String>,
    pub pallets_loaded: Option<i32>,
    pub pallets_returned: Option<i32>,
    pub pallets_exchanged: Option<i32>,
    pub pallets_due: Option<i32>,
    #[sea_orm(column_type = "Text", nullable)]
    pub pallet_deposit_location: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub pallet_balance: Option<String>,

    // Financial
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub cod_amount: Option<Decimal>,
    #[sea_orm(column_type = "Text", nullable)]
    pub cod_currency: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))", nullable)]
    pub freight_amount: Option<Decimal>,
    #[sea_orm(column_type = "Text", nullable)]
    pub freight_currency: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub freight_terms: Option<String>,

    // Free text
    #[sea_orm(column_type = "Text", nullable)]
    pub instructions: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub customs_instructions: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub attached_documents: Option<String>,

    pub archived: bool,
    pub archived_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

/// Dangerous goods declaration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DangerousGoods<'a> {
    pub class: Option<&'a str>,
    pub un_number: Option<&'a str>,
    pub adr_letter: Option<&'a str>,
}

/// Temperature-controlled transport range
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TemperatureRange {
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

/// Pallet counts by type, in print order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PalletExchange<'a> {
    pub counts: Vec<(&'static str, i32)>,
    pub origin: Option<&'a str>,
    pub exchange: Vec<(&'static str, i32)>,
    pub deposit_location: Option<&'a str>,
    pub balance: Option<&'a str>,
}

/// A monetary amount with its optional currency code
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Amount<'a> {
    pub value: Decimal,
    pub currency: Option<&'a str>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Financials<'a> {
    pub cash_on_delivery: Option<Amount<'a>>,
    pub freight: Option<Amount<'a>>,
    pub freight_terms: Option<&'a str>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Model {
    /// Get the document status as an enum
    pub fn document_status(&self) -> Result<DocumentStatus, AppError> {
        self.status.parse()
    }

    /// Number printed on the document, falling back to the first 8 chars of the id
    pub fn display_number(&self) -> String {
        match non_empty(&self.cmr_number) {
            Some(number) => number.to_string(),
            None => self.id.simple().to_string()[..8].to_uppercase(),
        }
    }

    pub fn dangerous_goods(&self) -> Option<DangerousGoods<'_>> {
        let goods = DangerousGoods {
            class: non_empty(&self.dangerous_class),
            un_number: non_empty(&self.dangerous_un_number),
            adr_letter: non_empty(&self.dangerous_adr_letter),
        };
        if goods.class.is_none() && goods.un_number.is_none() && goods.adr_letter.is_none() {
            None
        } else {
            Some(goods)
        }
    }

    pub fn temperature(&self) -> Option<TemperatureRange> {
        if self.temperature_min.is_none() && self.temperature_max.is_none() {
            return None;
        }
        Some(TemperatureRange {
            min: self.temperature_min,
            max: self.temperature_max,
        })
    }

    pub fn pallets(&self) -> Option<PalletExchange<'_>> {
        let counts: Vec<(&'static str, i32)> = [
            ("Europe", self.pallets_euro),
            ("Standard", self.pallets_standard),
            ("Demi", self.pallets_half),
            ("Quart", self.pallets_quarter),
            ("CHEP", self.pallets_chep),
            ("Autres", self.pallets_other),
        ]
        .into_iter()
        .filter_map(|(label, count)| count.filter(|c| *c > 0).map(|c| (label, c)))
        .collect();

        let exchange: Vec<(&'static str, i32)> = [
            ("Chargées", self.pallets_loaded),
            ("Rendues", self.pallets_returned),
            ("Échangées", self.pallets_exchanged),
            ("Dues", self.pallets_due),
        ]
        .into_iter()
        .filter_map(|(label, count)| count.map(|c| (label, c)))
        .collect();

        let pallets = PalletExchange {
            counts,
            origin: non_empty(&self.pallet_origin),
            exchange,
            deposit_location: non_empty(&self.pallet_deposit_location),
            balance: non_empty(&self.pallet_balance),
        };

        let empty = pallets.counts.is_empty()
            && pallets.exchange.is_empty()
            && pallets.origin.is_none()
            && pallets.deposit_location.is_none()
            && pallets.balance.is_none();
        (!empty).then_some(pallets)
    }

    pub fn financials(&self) -> Option<Financials<'_>> {
        let financials = Financials {
            cash_on_delivery: self.cod_amount.map(|value| Amount {
                value,
                currency: non_empty(&self.cod_currency),
            }),
            freight: self.freight_amount.map(|value| Amount {
                value,
                currency: non_empty(&self.freight_currency),
            }),
            freight_terms: non_empty(&self.freight_terms),
        };
        if financials.cash_on_delivery.is_none()
            && financials.freight.is_none()
            && financials.freight_terms.is_none()
        {
            None
        } else {
            Some(financials)
        }
    }

    pub fn instructions_text(&self) -> Option<&str> {
        non_empty(&self.instructions)
    }

    pub fn customs_instructions_text(&self) -> Option<&str> {
        non_empty(&self.customs_instructions)
    }

    pub fn attached_documents_text(&self) -> Option<&str> {
        non_empty(&self.attached_documents)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::UserId",
        to = "super::profile::Column::Id"
    )]
    Profile,

    #[sea_orm(
        belongs_to = "super::vehicle::Entity",
        from = "Column::VehicleId",
        to = "super::vehicle::Column::Id"
    )]
    Vehicle,

    #[sea_orm(has_many = "super::event::Entity")]
    Events,

    #[sea_orm(has_many = "super::reserve::Entity")]
    Reserves,

    #[sea_orm(has_many = "super::photo::Entity")]
    Photos,

    #[sea_orm(has_many = "super::signature::Entity")]
    Signatures,
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::vehicle::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vehicle.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::reserve::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reserves.def()
    }
}

impl Related<super::photo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Photos.def()
    }
}

impl Related<super::signature::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Signatures.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
