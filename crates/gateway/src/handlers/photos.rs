//! Document photo handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use super::decode_image;
use crate::AppState;
use cmr_common::{auth::AuthContext, db::models::Photo, errors::Result};

#[derive(Debug, Deserialize)]
pub struct AddPhotoRequest {
    /// Base64-encoded JPEG, PNG or WebP
    pub image: String,
}

pub async fn add_photo(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<AddPhotoRequest>,
) -> Result<(StatusCode, Json<Photo>)> {
    let bytes = decode_image("image", &request.image)?;
    let photo = state.photos.add(&auth, document_id, bytes).await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

pub async fn delete_photo(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(photo_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.photos.delete(&auth, photo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
