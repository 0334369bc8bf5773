//! Reserve handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::decode_image;
use crate::AppState;
use cmr_common::{
    auth::AuthContext,
    db::models::{Reserve, ReserveSide},
    errors::Result,
    services::CreateReserve,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReserveRequest {
    pub side: ReserveSide,

    #[validate(length(min = 1, max = 200))]
    pub reserve_type: String,

    #[validate(length(max = 2000))]
    pub comment: Option<String>,

    /// Optional photo, base64-encoded
    pub photo: Option<String>,
}

pub async fn create_reserve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<CreateReserveRequest>,
) -> Result<(StatusCode, Json<Reserve>)> {
    request.validate()?;

    let photo = request
        .photo
        .as_deref()
        .map(|encoded| decode_image("photo", encoded))
        .transpose()?;

    let input = CreateReserve {
        side: request.side,
        reserve_type: request.reserve_type,
        comment: request.comment,
        photo,
    };
    let reserve = state.reserves.create(&auth, document_id, input).await?;
    Ok((StatusCode::CREATED, Json(reserve)))
}

pub async fn delete_reserve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(reserve_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.reserves.delete(&auth, reserve_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
