//! The chat-completions orchestrator: validate, resolve, translate, sign,
//! dispatch, and shape the unary or streaming response.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Response as HttpResponse, StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use serde_json::Value;
use tracing::debug;

use super::AppState;
use super::error::ProxyError;
use super::stream::SseBody;
use crate::aws::sigv4::uri_encode_path;
use crate::llm::bedrock::streaming::StreamState;
use crate::llm::bedrock::{translate_request, translate_response};
use crate::llm::completions::Request;
use crate::models::ModelError;

/// Hard cap on the inbound body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_EVENT_STREAM: &str = "application/vnd.amazon.eventstream";

pub async fn handle(State(state): State<AppState>, body: Bytes) -> Result<Response, ProxyError> {
	if body.len() > MAX_BODY_BYTES {
		return Err(ProxyError::invalid_request(
			"request body exceeds the 10 MiB limit",
		));
	}

	let request: Request = serde_json::from_slice(&body)
		.map_err(|e| ProxyError::invalid_request(format!("invalid JSON body: {e}")))?;

	let model = match request.model.as_deref() {
		Some(m) if !m.is_empty() => m.to_string(),
		_ => return Err(ProxyError::invalid_request("model must be a non-empty string")),
	};
	if request.messages.is_empty() {
		return Err(ProxyError::invalid_request("messages must not be empty"));
	}

	let bedrock_id = state.models.resolve(&model).await.map_err(|e| match e {
		ModelError::NotFound => ProxyError::model_not_found(format!("model {model} not found")),
		other => ProxyError::internal(other.to_string()),
	})?;

	let translated = translate_request(&request, &bedrock_id)?;
	let body_bytes = serde_json::to_vec(&translated.body)
		.map_err(|e| ProxyError::internal(format!("failed to encode bedrock request: {e}")))?;

	debug!(
		model = %model,
		bedrock_id = %bedrock_id,
		streaming = translated.streaming,
		"dispatching completion"
	);

	let url = format!(
		"{}{}",
		state.config.runtime_endpoint(),
		uri_encode_path(&translated.path)
	);
	let accept = if translated.streaming {
		ACCEPT_EVENT_STREAM
	} else {
		ACCEPT_JSON
	};
	let upstream = state
		.client
		.post(&url, Bytes::from(body_bytes), accept, state.config.request_timeout())
		.await
		.map_err(|e| ProxyError::internal(e.to_string()))?;

	let status = upstream.status();
	if !status.is_success() {
		let bytes = upstream.bytes().await.unwrap_or_default();
		let message = extract_bedrock_message(&bytes)
			.unwrap_or_else(|| format!("bedrock returned status {}", status.as_u16()));
		debug!(status = status.as_u16(), "bedrock error response");
		return Err(ProxyError::from_bedrock_status(status.as_u16(), message));
	}

	if translated.streaming {
		let sse = SseBody::new(
			upstream.bytes_stream(),
			StreamState::new(translated.original_model, translated.include_usage),
		);
		HttpResponse::builder()
			.status(StatusCode::OK)
			.header(header::CONTENT_TYPE, "text/event-stream")
			.header(header::CACHE_CONTROL, "no-cache")
			.header(header::CONNECTION, "keep-alive")
			.body(Body::from_stream(sse))
			.map_err(|e| ProxyError::internal(e.to_string()))
	} else {
		let bytes = upstream
			.bytes()
			.await
			.map_err(|e| ProxyError::internal(format!("failed to read bedrock response: {e}")))?;
		let value: Value = serde_json::from_slice(&bytes)
			.map_err(|e| ProxyError::internal(format!("unreadable bedrock response: {e}")))?;
		let completion = translate_response(&value, &translated.original_model);
		let body = serde_json::to_vec(&completion)
			.map_err(|e| ProxyError::internal(e.to_string()))?;
		HttpResponse::builder()
			.status(StatusCode::OK)
			.header(header::CONTENT_TYPE, ACCEPT_JSON)
			.body(Body::from(body))
			.map_err(|e| ProxyError::internal(e.to_string()))
	}
}

/// First non-empty of the `message` / `Message` fields of an error body.
fn extract_bedrock_message(bytes: &[u8]) -> Option<String> {
	let value: Value = serde_json::from_slice(bytes).ok()?;
	["message", "Message"]
		.into_iter()
		.filter_map(|key| value.get(key))
		.filter_map(Value::as_str)
		.map(str::to_string)
		.find(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bedrock_message_extraction_prefers_lowercase() {
		assert_eq!(
			extract_bedrock_message(br#"{"message":"too fast"}"#).as_deref(),
			Some("too fast")
		);
		assert_eq!(
			extract_bedrock_message(br#"{"Message":"denied"}"#).as_deref(),
			Some("denied")
		);
		assert_eq!(
			extract_bedrock_message(br#"{"message":"","Message":"fallback"}"#).as_deref(),
			Some("fallback")
		);
		assert_eq!(extract_bedrock_message(b"not json"), None);
	}
}
