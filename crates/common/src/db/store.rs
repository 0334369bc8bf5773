//! Persistence interfaces consumed by the lifecycle engine and services
//!
//! Every call is scoped to an owner. Implementations must never return or
//! mutate rows belonging to another user.

use crate::db::models::*;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter for document listings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Empty means any status
    #[serde(default)]
    pub statuses: Vec<DocumentStatus>,

    /// `None` means archived and active documents alike
    #[serde(default)]
    pub archived: Option<bool>,
}

impl DocumentFilter {
    pub fn matches(&self, document: &CmrDocument) -> bool {
        let status_ok = self.statuses.is_empty()
            || self
                .statuses
                .iter()
                .any(|s| s.as_str() == document.status);
        let archived_ok = self.archived.map_or(true, |a| a == document.archived);
        status_ok && archived_ok
    }
}

#[derive(Debug, Clone)]
pub struct NewReserve {
    pub document_id: Uuid,
    pub side: ReserveSide,
    pub reserve_type: String,
    pub comment: Option<String>,
    pub photo_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewSignature {
    pub document_id: Uuid,
    pub party: SignatureParty,
    pub signer_name: Option<String>,
    pub signer_role: Option<String>,
    pub signer_email: Option<String>,
    pub image_path: String,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub document_id: Uuid,
    pub actor_id: Uuid,
    pub kind: EventKind,
}

/// Fields a form may not set on a document
const PROTECTED_FIELDS: &[&str] = &[
    "id",
    "user_id",
    "status",
    "archived",
    "archived_at",
    "created_at",
    "updated_at",
];

/// Build a new `ready_to_load` document from form fields
///
/// Unknown keys are rejected; lifecycle and ownership fields are ignored.
pub fn document_from_form(
    owner: Uuid,
    fields: serde_json::Map<String, serde_json::Value>,
) -> Result<CmrDocument> {
    let now: DateTime<FixedOffset> = Utc::now().into();
    apply_form(blank_document(Uuid::new_v4(), owner, now), fields)
}

/// Merge edited form fields into an existing document
///
/// Same rules as creation: unknown keys fail, protected keys are skipped, so
/// status, ownership and archival only change through their own operations.
pub fn apply_form(
    document: CmrDocument,
    fields: serde_json::Map<String, serde_json::Value>,
) -> Result<CmrDocument> {
    let mut base = serde_json::to_value(document)?;

    let object = base.as_object_mut().ok_or_else(|| AppError::Internal {
        message: "document did not serialize to an object".to_string(),
    })?;

    for (key, value) in fields {
        if PROTECTED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if !object.contains_key(&key) {
            return Err(AppError::Validation {
                message: format!("unknown document field '{}'", key),
                field: Some(key),
            });
        }
        object.insert(key, value);
    }

    serde_json::from_value(base).map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })
}

/// A document with every optional field empty
pub fn blank_document(id: Uuid, owner: Uuid, now: DateTime<FixedOffset>) -> CmrDocument {
    CmrDocument {
        id,
        user_id: owner,
        vehicle_id: None,
        cmr_number: None,
        status: DocumentStatus::ReadyToLoad.as_str().to_string(),
        is_international: true,
        shipper_name: None,
        shipper_address: None,
        consignee_name: None,
        consignee_address: None,
        principal_name: None,
        principal_address: None,
        delivery_carrier_name: None,
        delivery_carrier_address: None,
        loading_place: None,
        delivery_place: None,
        loading_date: None,
        requested_delivery_at: None,
        loading_arrival_at: None,
        loading_departure_at: None,
        delivery_arrival_at: None,
        delivery_departure_at: None,
        goods_description: None,
        package_count: None,
        gross_weight_kg: None,
        packaging_type: None,
        marks: None,
        dangerous_class: None,
        dangerous_un_number: None,
        dangerous_adr_letter: None,
        temperature_min: None,
        temperature_max: None,
        pallets_euro: None,
        pallets_standard: None,
        pallets_half: None,
        pallets_quarter: None,
        pallets_chep: None,
        pallets_other: None,
        pallet_origin: None,
        pallets_loaded: None,
        pallets_returned: None,
        pallets_exchanged: None,
        pallets_due: None,
        pallet_deposit_location: None,
        pallet_balance: None,
        cod_amount: None,
        cod_currency: None,
        freight_amount: None,
        freight_currency: None,
        freight_terms: None,
        instructions: None,
        customs_instructions: None,
        attached_documents: None,
        archived: false,
        archived_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Owner-scoped document store
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_document(&self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>>;

    async fn list_documents(&self, owner: Uuid, filter: &DocumentFilter) -> Result<Vec<CmrDocument>>;

    /// Persist a document built by the form layer; owner and status are forced
    async fn insert_document(&self, owner: Uuid, document: CmrDocument) -> Result<CmrDocument>;

    /// Apply a field-level edit through `apply_form`; status, owner and
    /// archival columns are left as stored
    async fn update_document(
        &self,
        owner: Uuid,
        id: Uuid,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CmrDocument>;

    /// Toggle archival, independent of status
    async fn set_archived(&self, owner: Uuid, id: Uuid, archived: bool) -> Result<CmrDocument>;

    async fn find_profile(&self, owner: Uuid) -> Result<Option<Profile>>;

    async fn find_vehicle(&self, owner: Uuid, id: Uuid) -> Result<Option<Vehicle>>;

    /// Events in creation order
    async fn list_events(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Event>>;

    async fn list_reserves(
        &self,
        owner: Uuid,
        document_id: Uuid,
        side: Option<ReserveSide>,
    ) -> Result<Vec<Reserve>>;

    async fn insert_reserve(&self, owner: Uuid, reserve: NewReserve) -> Result<Reserve>;

    /// Returns the deleted row so the caller can clean up its stored photo
    async fn delete_reserve(&self, owner: Uuid, id: Uuid) -> Result<Option<Reserve>>;

    async fn list_photos(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Photo>>;

    async fn insert_photo(&self, owner: Uuid, document_id: Uuid, path: String) -> Result<Photo>;

    async fn delete_photo(&self, owner: Uuid, id: Uuid) -> Result<Option<Photo>>;

    async fn list_signatures(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Signature>>;

    /// Fails with `DuplicateSignature` when the party already signed
    async fn insert_signature(&self, owner: Uuid, signature: NewSignature) -> Result<Signature>;

    /// Open a unit of work for one lifecycle action
    async fn begin_lifecycle(&self) -> Result<Box<dyn LifecycleUnit>>;
}

/// One lifecycle action's reads and writes, applied atomically on `commit`
///
/// Dropping a unit without committing discards every write made through it.
#[async_trait]
pub trait LifecycleUnit: Send {
    /// Read the document and hold it against concurrent lifecycle actions
    async fn lock_document(&mut self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>>;

    async fn has_signature(&mut self, document_id: Uuid, party: SignatureParty) -> Result<bool>;

    /// Any reserve, either side
    async fn has_reserves(&mut self, document_id: Uuid) -> Result<bool>;

    async fn set_status(&mut self, document_id: Uuid, status: DocumentStatus) -> Result<()>;

    async fn append_event(&mut self, event: NewEvent) -> Result<Event>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
