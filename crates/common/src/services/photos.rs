use super::{delete_best_effort, upload_image};
use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::db::models::Photo;
use crate::db::DocumentStore;
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// General photos attached to a document, capped per document
#[derive(Clone)]
pub struct PhotoService {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    bucket: String,
    max_photos: usize,
    max_upload_bytes: usize,
}

impl PhotoService {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        Self {
            store,
            objects,
            bucket: config.storage.photos_bucket.clone(),
            max_photos: config.limits.max_photos_per_document,
            max_upload_bytes: config.limits.max_upload_bytes,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn add(&self, ctx: &AuthContext, document_id: Uuid, bytes: Vec<u8>) -> Result<Photo> {
        let existing = self.store.list_photos(ctx.user_id, document_id).await?;
        if existing.len() >= self.max_photos {
            return Err(AppError::PhotoLimitExceeded {
                limit: self.max_photos,
            });
        }

        let stored = upload_image(
            self.objects.as_ref(),
            &self.bucket,
            ctx.user_id,
            document_id,
            "photo",
            bytes,
            self.max_upload_bytes,
        )
        .await?;

        match self
            .store
            .insert_photo(ctx.user_id, document_id, stored.path.clone())
            .await
        {
            Ok(photo) => {
                info!(document_id = %document_id, photo_id = %photo.id, "Photo added");
                Ok(photo)
            }
            Err(e) => {
                delete_best_effort(self.objects.as_ref(), &self.bucket, &stored.path).await;
                Err(e)
            }
        }
    }

    pub async fn delete(&self, ctx: &AuthContext, photo_id: Uuid) -> Result<Photo> {
        let photo = self
            .store
            .delete_photo(ctx.user_id, photo_id)
            .await?
            .ok_or_else(|| AppError::PhotoNotFound {
                id: photo_id.to_string(),
            })?;

        delete_best_effort(self.objects.as_ref(), &self.bucket, &photo.path).await;
        info!(document_id = %photo.document_id, photo_id = %photo_id, "Photo deleted");
        Ok(photo)
    }
}
