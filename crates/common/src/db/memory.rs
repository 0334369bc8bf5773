//! In-process document store
//!
//! Mirrors the relational store: owner scoping, the signature unique
//! constraint, and all-or-nothing lifecycle units. Lifecycle units hold the
//! store lock until they commit or drop, so concurrent actions serialize.

use crate::db::models::*;
use crate::db::store::{apply_form, DocumentFilter, DocumentStore, LifecycleUnit, NewEvent, NewReserve, NewSignature};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::DbErr;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    documents: BTreeMap<Uuid, CmrDocument>,
    events: Vec<Event>,
    reserves: Vec<Reserve>,
    photos: Vec<Photo>,
    signatures: Vec<Signature>,
    profiles: BTreeMap<Uuid, Profile>,
    vehicles: BTreeMap<Uuid, Vehicle>,
}

impl MemoryState {
    fn owned_document(&self, owner: Uuid, id: Uuid) -> Option<&CmrDocument> {
        self.documents.get(&id).filter(|d| d.user_id == owner)
    }

    fn require_document(&self, owner: Uuid, id: Uuid) -> Result<&CmrDocument> {
        self.owned_document(owner, id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }
}

fn now() -> DateTime<FixedOffset> {
    Utc::now().into()
}

/// Store backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_event: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the carrier profile of a user
    pub async fn put_profile(&self, profile: Profile) {
        self.state.lock().await.profiles.insert(profile.id, profile);
    }

    pub async fn put_vehicle(&self, vehicle: Vehicle) {
        self.state.lock().await.vehicles.insert(vehicle.id, vehicle);
    }

    /// Make the next event append fail, to exercise rollback
    pub fn fail_next_event_append(&self) {
        self.fail_next_event.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_document(&self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>> {
        Ok(self.state.lock().await.owned_document(owner, id).cloned())
    }

    async fn list_documents(&self, owner: Uuid, filter: &DocumentFilter) -> Result<Vec<CmrDocument>> {
        let state = self.state.lock().await;
        let mut documents: Vec<CmrDocument> = state
            .documents
            .values()
            .filter(|d| d.user_id == owner && filter.matches(d))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn insert_document(&self, owner: Uuid, mut document: CmrDocument) -> Result<CmrDocument> {
        let mut state = self.state.lock().await;
        if state.documents.contains_key(&document.id) {
            return Err(DbErr::RecordNotInserted.into());
        }
        document.user_id = owner;
        document.status = DocumentStatus::ReadyToLoad.as_str().to_string();
        state.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn update_document(
        &self,
        owner: Uuid,
        id: Uuid,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CmrDocument> {
        let mut state = self.state.lock().await;
        let current = state.require_document(owner, id)?.clone();
        let mut edited = apply_form(current, fields)?;
        edited.updated_at = now();
        state.documents.insert(id, edited.clone());
        Ok(edited)
    }

    async fn set_archived(&self, owner: Uuid, id: Uuid, archived: bool) -> Result<CmrDocument> {
        let mut state = self.state.lock().await;
        state.require_document(owner, id)?;
        let document = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;
        let at = now();
        document.archived = archived;
        document.archived_at = archived.then_some(at);
        document.updated_at = at;
        Ok(document.clone())
    }

    async fn find_profile(&self, owner: Uuid) -> Result<Option<Profile>> {
        Ok(self.state.lock().await.profiles.get(&owner).cloned())
    }

    async fn find_vehicle(&self, owner: Uuid, id: Uuid) -> Result<Option<Vehicle>> {
        Ok(self
            .state
            .lock()
            .await
            .vehicles
            .get(&id)
            .filter(|v| v.user_id == owner)
            .cloned())
    }

    async fn list_events(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Event>> {
        let state = self.state.lock().await;
        state.require_document(owner, document_id)?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn list_reserves(
        &self,
        owner: Uuid,
        document_id: Uuid,
        side: Option<ReserveSide>,
    ) -> Result<Vec<Reserve>> {
        let state = self.state.lock().await;
        state.require_document(owner, document_id)?;
        Ok(state
            .reserves
            .iter()
            .filter(|r| r.document_id == document_id)
            .filter(|r| side.map_or(true, |s| r.side == s.as_str()))
            .cloned()
            .collect())
    }

    async fn insert_reserve(&self, owner: Uuid, reserve: NewReserve) -> Result<Reserve> {
        let mut state = self.state.lock().await;
        state.require_document(owner, reserve.document_id)?;
        let row = Reserve {
            id: Uuid::new_v4(),
            document_id: reserve.document_id,
            user_id: owner,
            side: reserve.side.as_str().to_string(),
            reserve_type: reserve.reserve_type,
            comment: reserve.comment,
            photo_path: reserve.photo_path,
            created_at: now(),
        };
        state.reserves.push(row.clone());
        Ok(row)
    }

    async fn delete_reserve(&self, owner: Uuid, id: Uuid) -> Result<Option<Reserve>> {
        let mut state = self.state.lock().await;
        let position = state
            .reserves
            .iter()
            .position(|r| r.id == id && r.user_id == owner);
        Ok(position.map(|i| state.reserves.remove(i)))
    }

    async fn list_photos(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Photo>> {
        let state = self.state.lock().await;
        state.require_document(owner, document_id)?;
        Ok(state
            .photos
            .iter()
            .filter(|p| p.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn insert_photo(&self, owner: Uuid, document_id: Uuid, path: String) -> Result<Photo> {
        let mut state = self.state.lock().await;
        state.require_document(owner, document_id)?;
        let row = Photo {
            id: Uuid::new_v4(),
            document_id,
            user_id: owner,
            path,
            created_at: now(),
        };
        state.photos.push(row.clone());
        Ok(row)
    }

    async fn delete_photo(&self, owner: Uuid, id: Uuid) -> Result<Option<Photo>> {
        let mut state = self.state.lock().await;
        let position = state
            .photos
            .iter()
            .position(|p| p.id == id && p.user_id == owner);
        Ok(position.map(|i| state.photos.remove(i)))
    }

    async fn list_signatures(&self, owner: Uuid, document_id: Uuid) -> Result<Vec<Signature>> {
        let state = self.state.lock().await;
        state.require_document(owner, document_id)?;
        Ok(state
            .signatures
            .iter()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn insert_signature(&self, owner: Uuid, signature: NewSignature) -> Result<Signature> {
        let mut state = self.state.lock().await;
        state.require_document(owner, signature.document_id)?;

        let party = signature.party.as_str();
        let duplicate = state
            .signatures
            .iter()
            .any(|s| s.document_id == signature.document_id && s.party == party);
        if duplicate {
            return Err(AppError::DuplicateSignature {
                document_id: signature.document_id.to_string(),
                party: party.to_string(),
            });
        }

        let row = Signature {
            id: Uuid::new_v4(),
            document_id: signature.document_id,
            user_id: owner,
            party: party.to_string(),
            signer_name: signature.signer_name,
            signer_role: signature.signer_role,
            signer_email: signature.signer_email,
            image_path: signature.image_path,
            created_at: now(),
        };
        state.signatures.push(row.clone());
        Ok(row)
    }

    async fn begin_lifecycle(&self) -> Result<Box<dyn LifecycleUnit>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            staged,
            fail_next_event: self.fail_next_event.clone(),
        }))
    }
}

/// Works on a copy of the state; `commit` swaps it in
struct MemoryUnit {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_next_event: Arc<AtomicBool>,
}

#[async_trait]
impl LifecycleUnit for MemoryUnit {
    async fn lock_document(&mut self, owner: Uuid, id: Uuid) -> Result<Option<CmrDocument>> {
        Ok(self.staged.owned_document(owner, id).cloned())
    }

    async fn has_signature(&mut self, document_id: Uuid, party: SignatureParty) -> Result<bool> {
        Ok(self
            .staged
            .signatures
            .iter()
            .any(|s| s.document_id == document_id && s.party == party.as_str()))
    }

    async fn has_reserves(&mut self, document_id: Uuid) -> Result<bool> {
        Ok(self.staged.reserves.iter().any(|r| r.document_id == document_id))
    }

    async fn set_status(&mut self, document_id: Uuid, status: DocumentStatus) -> Result<()> {
        let document = self
            .staged
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;
        document.status = status.as_str().to_string();
        document.updated_at = now();
        Ok(())
    }

    async fn append_event(&mut self, event: NewEvent) -> Result<Event> {
        if self.fail_next_event.swap(false, Ordering::SeqCst) {
            return Err(DbErr::Custom("injected event insert failure".to_string()).into());
        }
        let row = Event {
            id: Uuid::new_v4(),
            document_id: event.document_id,
            user_id: event.actor_id,
            event_type: event.kind.event_type().to_string(),
            metadata: event.kind.metadata(),
            created_at: now(),
        };
        self.staged.events.push(row.clone());
        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnit {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::blank_document;

    async fn seeded() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let doc = store
            .insert_document(owner, blank_document(Uuid::new_v4(), owner, now()))
            .await
            .unwrap();
        (store, owner, doc.id)
    }

    fn shipper_signature(document_id: Uuid) -> NewSignature {
        NewSignature {
            document_id,
            party: SignatureParty::Shipper,
            signer_name: Some("J. Dupont".into()),
            signer_role: None,
            signer_email: None,
            image_path: "sig.png".into(),
        }
    }

    #[tokio::test]
    async fn test_signature_unique_per_party() {
        let (store, owner, doc) = seeded().await;

        store.insert_signature(owner, shipper_signature(doc)).await.unwrap();
        let err = store
            .insert_signature(owner, shipper_signature(doc))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DuplicateSignature { .. }));
        assert_eq!(store.list_signatures(owner, doc).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rows_are_owner_scoped() {
        let (store, _owner, doc) = seeded().await;
        let stranger = Uuid::new_v4();

        assert!(store.find_document(stranger, doc).await.unwrap().is_none());
        assert!(matches!(
            store.list_reserves(stranger, doc, None).await,
            Err(AppError::DocumentNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_uncommitted_unit_is_discarded() {
        let (store, owner, doc) = seeded().await;

        {
            let mut unit = store.begin_lifecycle().await.unwrap();
            unit.set_status(doc, DocumentStatus::Loading).await.unwrap();
        }

        let current = store.find_document(owner, doc).await.unwrap().unwrap();
        assert_eq!(current.status, "ready_to_load");
    }

    #[tokio::test]
    async fn test_update_is_owner_scoped() {
        let (store, owner, doc) = seeded().await;
        let fields = serde_json::json!({ "goods_description": "Palettes de lait UHT" });
        let fields = fields.as_object().cloned().unwrap();

        let err = store
            .update_document(Uuid::new_v4(), doc, fields.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DocumentNotFound { .. }));

        let updated = store.update_document(owner, doc, fields).await.unwrap();
        assert_eq!(updated.goods_description.as_deref(), Some("Palettes de lait UHT"));
        let stored = store.find_document(owner, doc).await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_archive_toggle_keeps_status() {
        let (store, owner, doc) = seeded().await;

        let archived = store.set_archived(owner, doc, true).await.unwrap();
        assert!(archived.archived);
        assert!(archived.archived_at.is_some());
        assert_eq!(archived.status, "ready_to_load");

        let restored = store.set_archived(owner, doc, false).await.unwrap();
        assert!(!restored.archived);
        assert!(restored.archived_at.is_none());
    }
}
