//! PDF download handler

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use cmr_common::{auth::AuthContext, errors::Result};

/// `GET /documents/{id}/export.pdf`
pub async fn export_pdf(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Response> {
    let aggregate = state.aggregates.build(&auth, document_id).await?;

    let generated_at = Utc::now();
    let bytes = cmr_export::render_to_blob(
        &aggregate,
        state.fetcher.as_ref(),
        &state.export,
        generated_at,
    )
    .await?;

    let date = generated_at.with_timezone(&state.export.timezone).date_naive();
    let filename = cmr_export::download_filename(&aggregate.document, date);
    info!(
        document_id = %document_id,
        request_id = %auth.request_id,
        bytes = bytes.len(),
        "PDF exported"
    );

    let headers = [
        (header::CONTENT_TYPE, "application/pdf".to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        ),
    ];
    Ok((headers, bytes).into_response())
}
