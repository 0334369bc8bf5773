//! Lifecycle action handler

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::AppState;
use cmr_common::{
    auth::AuthContext,
    errors::Result,
    lifecycle::{LifecycleAction, Transition},
};

/// `POST /documents/{id}/actions/{action}`
///
/// An unknown action tag is rejected before the store is touched.
pub async fn dispatch_action(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((document_id, tag)): Path<(Uuid, String)>,
) -> Result<Json<Transition>> {
    let action: LifecycleAction = tag.parse()?;
    let transition = state.engine.dispatch(&auth, document_id, action).await?;
    Ok(Json(transition))
}
