//! Signature capture handler

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
    db::models::SignatureParty,
    errors::Result,
    services::{CapturedSignature, Signer},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CaptureSignatureRequest {
    pub party: SignatureParty,

    #[validate(length(max = 200))]
    pub signer_name: Option<String>,

    #[validate(length(max = 200))]
    pub signer_role: Option<String>,

    #[validate(email)]
    pub signer_email: Option<String>,

    /// Base64-encoded PNG from the signature pad
    pub image: String,
}

/// Store a signature; the consignee's completes the delivery
pub async fn capture_signature(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<CaptureSignatureRequest>,
) -> Result<(StatusCode, Json<CapturedSignature>)> {
    request.validate()?;
    let image = decode_image("image", &request.image)?;

    let signer = Signer {
        name: request.signer_name,
        role: request.signer_role,
        email: request.signer_email,
    };
    let captured = state
        .signatures
        .capture(&auth, document_id, request.party, signer, image)
        .await?;
    Ok((StatusCode::CREATED, Json(captured)))
}
