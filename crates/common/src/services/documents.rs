use crate::auth::AuthContext;
use crate::db::models::{CmrDocument, Event, Photo, Reserve, Signature, SignatureParty};
use crate::db::{document_from_form, DocumentFilter, DocumentStore};
use crate::errors::{AppError, Result};
use crate::lifecycle::{allowed_actions, LifecycleAction};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// A document with everything attached to it
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    pub document: CmrDocument,
    pub events: Vec<Event>,
    pub signatures: Vec<Signature>,
    pub reserves: Vec<Reserve>,
    pub photos: Vec<Photo>,
    pub allowed_actions: Vec<LifecycleAction>,
}

#[derive(Clone)]
pub struct DocumentService {
    store: Arc<dyn DocumentStore>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Create a `ready_to_load` document from submitted form fields
    pub async fn create(
        &self,
        ctx: &AuthContext,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CmrDocument> {
        let document = document_from_form(ctx.user_id, fields)?;

        if let Some(vehicle_id) = document.vehicle_id {
            self.require_vehicle(ctx, vehicle_id).await?;
        }

        let document = self.store.insert_document(ctx.user_id, document).await?;
        info!(document_id = %document.id, request_id = %ctx.request_id, "Document created");
        Ok(document)
    }

    pub async fn list(&self, ctx: &AuthContext, filter: &DocumentFilter) -> Result<Vec<CmrDocument>> {
        self.store.list_documents(ctx.user_id, filter).await
    }

    pub async fn get(&self, ctx: &AuthContext, id: Uuid) -> Result<DocumentDetail> {
        let document = self
            .store
            .find_document(ctx.user_id, id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let events = self.store.list_events(ctx.user_id, id).await?;
        let signatures = self.store.list_signatures(ctx.user_id, id).await?;
        let reserves = self.store.list_reserves(ctx.user_id, id, None).await?;
        let photos = self.store.list_photos(ctx.user_id, id).await?;
        // delivery_end normally follows the consignee signature; once that
        // signature exists it is offered directly so a failed completion can
        // be retried
        let consignee_signed = signatures
            .iter()
            .any(|s| s.party == SignatureParty::Consignee.as_str());
        let allowed_actions = allowed_actions(document.document_status()?)
            .into_iter()
            .filter(|a| a.is_user_facing() || consignee_signed)
            .collect();

        Ok(DocumentDetail {
            document,
            events,
            signatures,
            reserves,
            photos,
            allowed_actions,
        })
    }

    /// Edit document fields; status and archival are not editable here
    pub async fn update(
        &self,
        ctx: &AuthContext,
        id: Uuid,
        fields: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CmrDocument> {
        if let Some(vehicle_id) = fields.get("vehicle_id").filter(|v| !v.is_null()) {
            let vehicle_id: Uuid = serde_json::from_value(vehicle_id.clone()).map_err(|e| {
                AppError::Validation {
                    message: e.to_string(),
                    field: Some("vehicle_id".to_string()),
                }
            })?;
            self.require_vehicle(ctx, vehicle_id).await?;
        }

        let document = self.store.update_document(ctx.user_id, id, fields).await?;
        info!(document_id = %id, request_id = %ctx.request_id, "Document updated");
        Ok(document)
    }

    async fn require_vehicle(&self, ctx: &AuthContext, vehicle_id: Uuid) -> Result<()> {
        if self.store.find_vehicle(ctx.user_id, vehicle_id).await?.is_none() {
            return Err(AppError::Validation {
                message: format!("vehicle {} does not exist", vehicle_id),
                field: Some("vehicle_id".to_string()),
            });
        }
        Ok(())
    }

    /// Hide or restore a document; its status is untouched
    pub async fn set_archived(&self, ctx: &AuthContext, id: Uuid, archived: bool) -> Result<CmrDocument> {
        self.store.set_archived(ctx.user_id, id, archived).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn service() -> (DocumentService, AuthContext) {
        (
            DocumentService::new(Arc::new(MemoryStore::new())),
            AuthContext::for_user(Uuid::new_v4()),
        )
    }

    fn form(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (service, ctx) = service();
        let created = service
            .create(
                &ctx,
                form(serde_json::json!({
                    "cmr_number": "CMR-2026-0042",
                    "shipper_name": "Laiterie du Val",
                    "consignee_name": "Frischmarkt GmbH"
                })),
            )
            .await
            .unwrap();
        assert_eq!(created.status, "ready_to_load");

        let detail = service.get(&ctx, created.id).await.unwrap();
        assert_eq!(detail.document.cmr_number.as_deref(), Some("CMR-2026-0042"));
        assert!(detail.events.is_empty());
        assert_eq!(detail.allowed_actions, vec![LifecycleAction::LoadingStart]);
    }

    #[tokio::test]
    async fn test_unknown_vehicle_rejected() {
        let (service, ctx) = service();
        let err = service
            .create(&ctx, form(serde_json::json!({ "vehicle_id": Uuid::new_v4() })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(f), .. } if f == "vehicle_id"));
    }

    #[tokio::test]
    async fn test_update_fields_after_creation() {
        let (service, ctx) = service();
        let created = service.create(&ctx, form(serde_json::json!({}))).await.unwrap();

        let updated = service
            .update(
                &ctx,
                created.id,
                form(serde_json::json!({
                    "cmr_number": "CMR-2026-0077",
                    "delivery_arrival_at": "2026-03-15T14:05:00+01:00",
                    "status": "completed"
                })),
            )
            .await
            .unwrap();

        assert_eq!(updated.status, "ready_to_load");
        assert_eq!(updated.cmr_number.as_deref(), Some("CMR-2026-0077"));
        assert!(updated.delivery_arrival_at.is_some());
        assert!(service.get(&ctx, created.id).await.unwrap().events.is_empty());

        let err = service
            .update(&ctx, created.id, form(serde_json::json!({ "vehicle_id": Uuid::new_v4() })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { field: Some(f), .. } if f == "vehicle_id"));
    }

    #[tokio::test]
    async fn test_archived_documents_filtered() {
        let (service, ctx) = service();
        let a = service.create(&ctx, form(serde_json::json!({}))).await.unwrap();
        let _b = service.create(&ctx, form(serde_json::json!({}))).await.unwrap();
        service.set_archived(&ctx, a.id, true).await.unwrap();

        let active = service
            .list(
                &ctx,
                &DocumentFilter {
                    statuses: vec![],
                    archived: Some(false),
                },
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, a.id);
    }
}
