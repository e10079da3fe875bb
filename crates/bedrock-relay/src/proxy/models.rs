//! `/v1/models` handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use super::AppState;
use super::error::ProxyError;
use crate::models::ModelError;

pub async fn list(State(state): State<AppState>) -> Result<Response, ProxyError> {
	let models = state.models.list().await.map_err(ProxyError::from)?;
	// Built as a Value so keys serialize sorted.
	Ok(Json(json!({"data": models, "object": "list"})).into_response())
}

pub async fn get(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Response, ProxyError> {
	match state.models.get(&id).await {
		Ok(model) => Ok(Json(model).into_response()),
		Err(ModelError::NotFound) => {
			Err(ProxyError::model_not_found(format!("model {id} not found")))
		},
		Err(other) => Err(ProxyError::internal(other.to_string())),
	}
}
