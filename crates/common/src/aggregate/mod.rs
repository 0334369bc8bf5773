//! Export aggregate
//!
//! Everything the PDF export needs in one value, with stored paths already
//! resolved to signed URLs. A path that cannot be signed resolves to `None`
//! and is rendered as a placeholder.

use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::db::models::{CmrDocument, Photo, Profile, Reserve, ReserveSide, Signature, SignatureParty, Vehicle};
use crate::db::DocumentStore;
use crate::errors::{AppError, Result};
use crate::storage::ObjectStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct SignatureEntry {
    pub signature: Signature,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReserveEntry {
    pub reserve: Reserve,
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhotoEntry {
    pub photo: Photo,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportAggregate {
    pub document: CmrDocument,
    pub profile: Option<Profile>,
    pub vehicle: Option<Vehicle>,
    pub shipper_signature: Option<SignatureEntry>,
    pub consignee_signature: Option<SignatureEntry>,
    /// Creation order
    pub reserves: Vec<ReserveEntry>,
    pub photos: Vec<PhotoEntry>,
}

impl ExportAggregate {
    /// An aggregate with nothing attached
    pub fn bare(document: CmrDocument) -> Self {
        Self {
            document,
            profile: None,
            vehicle: None,
            shipper_signature: None,
            consignee_signature: None,
            reserves: Vec::new(),
            photos: Vec::new(),
        }
    }

    pub fn reserves_on(&self, side: ReserveSide) -> Vec<&ReserveEntry> {
        self.reserves
            .iter()
            .filter(|r| r.reserve.side == side.as_str())
            .collect()
    }
}

/// Loads and resolves an [`ExportAggregate`]
#[derive(Clone)]
pub struct AggregateBuilder {
    store: Arc<dyn DocumentStore>,
    objects: Arc<dyn ObjectStore>,
    photos_bucket: String,
    signatures_bucket: String,
    reserves_bucket: String,
    ttl: Duration,
}

impl AggregateBuilder {
    pub fn new(store: Arc<dyn DocumentStore>, objects: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        Self {
            store,
            objects,
            photos_bucket: config.storage.photos_bucket.clone(),
            signatures_bucket: config.storage.signatures_bucket.clone(),
            reserves_bucket: config.storage.reserves_bucket.clone(),
            ttl: config.signed_url_ttl(),
        }
    }

    pub async fn build(&self, ctx: &AuthContext, document_id: Uuid) -> Result<ExportAggregate> {
        let document = self
            .store
            .find_document(ctx.user_id, document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let profile = self.store.find_profile(ctx.user_id).await?;
        let vehicle = match document.vehicle_id {
            Some(id) => self.store.find_vehicle(ctx.user_id, id).await?,
            None => None,
        };

        let mut shipper_signature = None;
        let mut consignee_signature = None;
        for signature in self.store.list_signatures(ctx.user_id, document_id).await? {
            let image_url = self.resolve(&self.signatures_bucket, &signature.image_path).await;
            let entry = SignatureEntry {
                signature,
                image_url,
            };
            match entry.signature.signature_party()? {
                SignatureParty::Shipper => shipper_signature = Some(entry),
                SignatureParty::Consignee => consignee_signature = Some(entry),
            }
        }

        let mut reserves = Vec::new();
        for reserve in self.store.list_reserves(ctx.user_id, document_id, None).await? {
            let photo_url = match &reserve.photo_path {
                Some(path) => self.resolve(&self.reserves_bucket, path).await,
                None => None,
            };
            reserves.push(ReserveEntry { reserve, photo_url });
        }

        let mut photos = Vec::new();
        for photo in self.store.list_photos(ctx.user_id, document_id).await? {
            let url = self.resolve(&self.photos_bucket, &photo.path).await;
            photos.push(PhotoEntry { photo, url });
        }

        Ok(ExportAggregate {
            document,
            profile,
            vehicle,
            shipper_signature,
            consignee_signature,
            reserves,
            photos,
        })
    }

    async fn resolve(&self, bucket: &str, path: &str) -> Option<String> {
        match self.objects.signed_url(bucket, path, self.ttl).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(bucket, path, error = %e, "Could not sign object URL");
                None
            }
        }
    }
}
