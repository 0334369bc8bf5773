use super::{delete_best_effort, upload_image};
use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::db::models::{DocumentStatus, Reserve, ReserveSide};
use crate::db::{DocumentStore, NewReserve};
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input for a new reserve
#[derive(Debug, Clone)]
pub struct CreateReserve {
    pub side: ReserveSide,
    pub reserve_type: String,
    pub comment: Option<String>,
    pub photo: Option<Vec<u8>>,
}

/// Side the document is currently collecting reserves for
fn phase_of(status: DocumentStatus) -> Option<ReserveSide> {
    match status {
        DocumentStatus::ReadyToLoad | DocumentStatus::Loading => Some(ReserveSide::Loading),
        DocumentStatus::InTransit | DocumentStatus::ReadyToDeliver => Some(ReserveSide::Delivery),
        _ => None,
    }
}

#[derive(Clone)]
pub struct ReserveService {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    max_upload_bytes: usize,
}

impl ReserveService {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        Self {
            store,
            objects,
            bucket: config.storage.reserves_bucket.clone(),
            max_upload_bytes: config.limits.max_upload_bytes,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Record a reserve, uploading its photo first when one is given
    pub async fn create(&self, ctx: &AuthContext, document_id: Uuid, input: CreateReserve) -> Result<Reserve> {
        let reserve_type = input.reserve_type.trim().to_string();
        if reserve_type.is_empty() {
            return Err(AppError::Validation {
                message: "reserve type is required".to_string(),
                field: Some("reserve_type".to_string()),
            });
        }

        let document = self
            .store
            .find_document(ctx.user_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let status = document.document_status()?;
        if phase_of(status) != Some(input.side) {
            warn!(
                document_id = %document_id,
                status = %status,
                side = %input.side,
                "Reserve side does not match the document phase"
            );
        }

        let photo = match input.photo {
            Some(bytes) => Some(
                upload_image(
                    self.objects.as_ref(),
                    &self.bucket,
                    ctx.user_id,
                    document_id,
                    &format!("reserve-{}", input.side),
                    bytes,
                    self.max_upload_bytes,
                )
                .await?,
            ),
            None => None,
        };

        let inserted = self
            .store
            .insert_reserve(
                ctx.user_id,
                NewReserve {
                    document_id,
                    side: input.side,
                    reserve_type,
                    comment: input.comment.filter(|c| !c.trim().is_empty()),
                    photo_path: photo.as_ref().map(|p| p.path.clone()),
                },
            )
            .await;

        match inserted {
            Ok(reserve) => {
                info!(document_id = %document_id, reserve_id = %reserve.id, side = %input.side, "Reserve recorded");
                Ok(reserve)
            }
            Err(e) => {
                if let Some(photo) = photo {
                    delete_best_effort(self.objects.as_ref(), &self.bucket, &photo.path).await;
                }
                Err(e)
            }
        }
    }

    /// Delete a reserve; its photo is removed best-effort afterwards
    pub async fn delete(&self, ctx: &AuthContext, reserve_id: Uuid) -> Result<Reserve> {
        let reserve = self
            .store
            .delete_reserve(ctx.user_id, reserve_id)
            .await?
            .ok_or_else(|| AppError::ReserveNotFound {
                id: reserve_id.to_string(),
            })?;

        if let Some(path) = &reserve.photo_path {
            delete_best_effort(self.objects.as_ref(), &self.bucket, path).await;
        }

        info!(document_id = %reserve.document_id, reserve_id = %reserve_id, "Reserve deleted");
        Ok(reserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{blank_document, MemoryStore};
    use crate::storage::tests::tiny_png;
    use crate::storage::MemoryObjectStore;
    use chrono::Utc;

    async fn setup() -> (ReserveService, MemoryStore, MemoryObjectStore, AuthContext, Uuid) {
        let store = MemoryStore::new();
        let objects = MemoryObjectStore::new();
        let ctx = AuthContext::for_user(Uuid::new_v4());
        let doc = store
            .insert_document(ctx.user_id, blank_document(Uuid::new_v4(), ctx.user_id, Utc::now().into()))
            .await
            .unwrap();
        let service = ReserveService::new(
            Arc::new(store.clone()),
            Arc::new(objects.clone()),
            &AppConfig::default(),
        );
        (service, store, objects, ctx, doc.id)
    }

    fn damaged(photo: Option<Vec<u8>>) -> CreateReserve {
        CreateReserve {
            side: ReserveSide::Loading,
            reserve_type: "Damaged packaging".into(),
            comment: Some("Two crates crushed on the left side".into()),
            photo,
        }
    }

    #[tokio::test]
    async fn test_create_with_photo() {
        let (service, _store, objects, ctx, doc) = setup().await;

        let reserve = service.create(&ctx, doc, damaged(Some(tiny_png()))).await.unwrap();
        let path = reserve.photo_path.clone().unwrap();

        assert!(path.starts_with(&format!("{}/{}/reserve-loading-", ctx.user_id, doc)));
        assert!(objects.get(service.bucket(), &path).await.is_some());
    }

    #[tokio::test]
    async fn test_side_mismatch_is_allowed() {
        let (service, store, _objects, ctx, doc) = setup().await;
        let mut input = damaged(None);
        input.side = ReserveSide::Delivery;

        service.create(&ctx, doc, input).await.unwrap();
        let reserves = store
            .list_reserves(ctx.user_id, doc, Some(ReserveSide::Delivery))
            .await
            .unwrap();
        assert_eq!(reserves.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_photo_creates_nothing() {
        let (service, store, objects, ctx, doc) = setup().await;

        let err = service
            .create(&ctx, doc, damaged(Some(b"not an image".to_vec())))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidFormat { .. }));
        assert!(store.list_reserves(ctx.user_id, doc, None).await.unwrap().is_empty());
        assert!(objects.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_survives_storage_failure() {
        let (service, store, objects, ctx, doc) = setup().await;
        let reserve = service.create(&ctx, doc, damaged(Some(tiny_png()))).await.unwrap();

        objects.set_fail_deletes(true);
        service.delete(&ctx, reserve.id).await.unwrap();

        assert!(store.list_reserves(ctx.user_id, doc, None).await.unwrap().is_empty());
        assert_eq!(objects.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_reserve() {
        let (service, _store, _objects, ctx, _doc) = setup().await;
        let err = service.delete(&ctx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::ReserveNotFound { .. }));
    }
}
