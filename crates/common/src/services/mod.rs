//! Document services
//!
//! Orchestrate the document store and the object store for the flows the
//! gateway exposes: document CRUD, reserves, photos and signatures.

mod documents;
mod photos;
mod reserves;
mod signatures;

pub use documents::{DocumentDetail, DocumentService};
pub use photos::PhotoService;
pub use reserves::{CreateReserve, ReserveService};
pub use signatures::{CapturedSignature, SignatureService, Signer};

use crate::errors::{AppError, Result};
use crate::storage::{object_path, validate_image, ObjectStore, StoredObject};
use chrono::Utc;
use uuid::Uuid;

/// Size-check, validate and upload one image under the document's prefix
pub(crate) async fn upload_image(
    objects: &dyn ObjectStore,
    bucket: &str,
    owner: Uuid,
    document_id: Uuid,
    kind: &str,
    bytes: Vec<u8>,
    max_bytes: usize,
) -> Result<StoredObject> {
    if bytes.is_empty() {
        return Err(AppError::Validation {
            message: "image is empty".to_string(),
            field: Some("image".to_string()),
        });
    }
    if bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = validate_image(&bytes)?;
    let path = object_path(owner, document_id, kind, format.extension(), Utc::now());
    objects
        .upload(bucket, &path, bytes, format.content_type())
        .await
}

/// Remove a stored object, logging instead of failing
pub(crate) async fn delete_best_effort(objects: &dyn ObjectStore, bucket: &str, path: &str) {
    if let Err(e) = objects.delete(bucket, path).await {
        tracing::warn!(bucket, path, error = %e, "Failed to delete stored object");
    }
}
