//! Document handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use cmr_common::{
    auth::AuthContext,
    db::{models::{CmrDocument, DocumentStatus}, DocumentFilter},
    errors::Result,
    services::DocumentDetail,
};

/// `?status=loading,in_transit&archived=false`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub archived: Option<bool>,
}

impl ListQuery {
    fn filter(&self) -> Result<DocumentFilter> {
        let statuses = self
            .status
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<DocumentStatus>)
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentFilter {
            statuses,
            archived: self.archived,
        })
    }
}

#[derive(Serialize)]
pub struct ListResponse {
    pub documents: Vec<CmrDocument>,
    pub count: usize,
}

pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>> {
    let filter = query.filter()?;
    let documents = state.documents.list(&auth, &filter).await?;

    Ok(Json(ListResponse {
        count: documents.len(),
        documents,
    }))
}

/// Create a document from the form fields; unknown fields are rejected
pub async fn create_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(fields): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<(StatusCode, Json<CmrDocument>)> {
    let document = state.documents.create(&auth, fields).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Document with its events, attachments and the actions the UI may offer
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentDetail>> {
    Ok(Json(state.documents.get(&auth, document_id).await?))
}

/// Field-level edit; lifecycle and archival keys in the body are ignored
pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(fields): Json<serde_json::Map<String, serde_json::Value>>,
) -> Result<Json<CmrDocument>> {
    Ok(Json(state.documents.update(&auth, document_id, fields).await?))
}

pub async fn archive_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<CmrDocument>> {
    Ok(Json(state.documents.set_archived(&auth, document_id, true).await?))
}

pub async fn unarchive_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<CmrDocument>> {
    Ok(Json(state.documents.set_archived(&auth, document_id, false).await?))
}
