use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use dach_core::errors::DachError;
use serde_json::Value;

use crate::{DachAxumError, DachAxumState};

/// Lifecycle endpoints for one add-on:
///
/// - `GET    /descriptor`          the add-on descriptor
/// - `POST   /install`             installation callback
/// - `DELETE /install/{oauth_id}`  uninstallation callback
pub fn addon_router(state: DachAxumState) -> Router<()> {
    Router::new()
        .route("/descriptor", get(descriptor))
        .route("/install", post(install))
        .route("/install/{oauth_id}", delete(uninstall))
        .with_state(state)
}

async fn descriptor(State(state): State<DachAxumState>) -> Result<Json<Value>, DachAxumError> {
    let template = state
        .installer
        .config()
        .descriptor_template(&state.app_name)
        .ok_or_else(|| DachError::not_found(format!("unknown add-on: {}", state.app_name)))?;

    let doc = state.descriptors.load(&template).await?;
    Ok(Json(doc))
}

async fn install(State(state): State<DachAxumState>, body: Bytes) -> Result<StatusCode, DachAxumError> {
    state.installer.install(&state.app_name, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn uninstall(
    State(state): State<DachAxumState>,
    Path(oauth_id): Path<String>,
) -> Result<StatusCode, DachAxumError> {
    state.installer.uninstall(&state.app_name, &oauth_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
