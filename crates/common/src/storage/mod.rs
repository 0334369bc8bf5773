//! Object storage for photos and signature images
//!
//! Buckets are private; readers get time-limited signed URLs. Paths are
//! opaque strings built by [`object_path`].

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Reference to an uploaded object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub path: String,
    pub size: usize,
    pub content_type: String,
}

/// Trait for bucket-based binary storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject>;

    /// Fetchable URL valid for `ttl`
    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String>;

    async fn delete(&self, bucket: &str, path: &str) -> Result<()>;
}

/// Image formats accepted for uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpg",
            ImageKind::Webp => "webp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Webp => "image/webp",
        }
    }
}

/// Sniff and decode `bytes`, rejecting anything that is not a readable image
pub fn validate_image(bytes: &[u8]) -> Result<ImageKind> {
    let format = image::guess_format(bytes).map_err(|_| AppError::InvalidFormat {
        message: "upload is not a recognized image".to_string(),
    })?;

    let kind = match format {
        image::ImageFormat::Png => ImageKind::Png,
        image::ImageFormat::Jpeg => ImageKind::Jpeg,
        image::ImageFormat::WebP => ImageKind::Webp,
        other => {
            return Err(AppError::InvalidFormat {
                message: format!("unsupported image format {:?}", other),
            })
        }
    };

    image::load_from_memory_with_format(bytes, format).map_err(|e| AppError::InvalidFormat {
        message: format!("image could not be decoded: {}", e),
    })?;

    Ok(kind)
}

/// `{owner}/{document}/{kind}-{millis}.{ext}`
pub fn object_path(owner: Uuid, document: Uuid, kind: &str, ext: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}/{}/{}-{}.{}",
        owner,
        document,
        kind,
        at.timestamp_millis(),
        ext
    )
}

/// Client for the storage service REST API
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    prefixes: [&'a str; 1],
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create storage client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => request.bearer_auth(key).header("apikey", key),
            None => request,
        }
    }

    async fn check(response: reqwest::Response, operation: &'static str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            metrics::record_storage(operation, true);
            return Ok(response);
        }
        metrics::record_storage(operation, false);
        let body = response.text().await.unwrap_or_default();
        Err(AppError::Storage {
            message: format!("{} failed with {}: {}", operation, status, body),
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let url = format!("{}/object/{}/{}", self.base_url, bucket, path);
        let size = bytes.len();

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;
        Self::check(response, "upload").await?;

        tracing::debug!(bucket, path, size, "Object uploaded");
        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String> {
        let url = format!("{}/object/sign/{}/{}", self.base_url, bucket, path);

        let response = self
            .authorized(self.client.post(&url))
            .json(&SignRequest {
                expires_in: ttl.as_secs(),
            })
            .send()
            .await?;
        let signed: SignResponse = Self::check(response, "sign").await?.json().await?;

        Ok(format!("{}{}", self.base_url, signed.signed_url))
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        let url = format!("{}/object/{}", self.base_url, bucket);

        let response = self
            .authorized(self.client.delete(&url))
            .json(&DeleteRequest { prefixes: [path] })
            .send()
            .await?;
        Self::check(response, "delete").await?;

        tracing::debug!(bucket, path, "Object deleted");
        Ok(())
    }
}

/// In-process object store for tests and local runs
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<BTreeMap<(String, String), Vec<u8>>>>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), path.to_string()))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make every delete fail until reset
    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let size = bytes.len();
        let mut objects = self.objects.write().await;
        let key = (bucket.to_string(), path.to_string());
        if objects.contains_key(&key) {
            return Err(AppError::Storage {
                message: format!("object {}/{} already exists", bucket, path),
            });
        }
        objects.insert(key, bytes);

        Ok(StoredObject {
            bucket: bucket.to_string(),
            path: path.to_string(),
            size,
            content_type: content_type.to_string(),
        })
    }

    async fn signed_url(&self, bucket: &str, path: &str, ttl: Duration) -> Result<String> {
        let key = (bucket.to_string(), path.to_string());
        if !self.objects.read().await.contains_key(&key) {
            return Err(AppError::Storage {
                message: format!("object {}/{} not found", bucket, path),
            });
        }
        Ok(format!("memory://{}/{}?expires_in={}", bucket, path, ttl.as_secs()))
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Storage {
                message: "delete refused".to_string(),
            });
        }
        self.objects
            .write()
            .await
            .remove(&(bucket.to_string(), path.to_string()));
        Ok(())
    }
}
