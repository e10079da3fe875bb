//! Static API-key gate for the northbound surface.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use super::AppState;
use super::error::ProxyError;

/// Accepts `Authorization: Bearer <key>` or `x-api-key: <key>`.
fn provided_key(headers: &HeaderMap) -> Option<&str> {
	if let Some(value) = headers.get(axum::http::header::AUTHORIZATION)
		&& let Ok(s) = value.to_str()
		&& let Some(key) = s.strip_prefix("Bearer ")
	{
		return Some(key);
	}
	headers.get("x-api-key").and_then(|v| v.to_str().ok())
}

pub async fn require_api_key(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Result<Response, ProxyError> {
	// Config validation guarantees a key is set before the server starts.
	let configured = state.config.api_key.as_deref().unwrap_or_default();
	match provided_key(request.headers()) {
		Some(key) if key == configured => Ok(next.run(request).await),
		Some(_) => Err(ProxyError::unauthorized("invalid API key")),
		None => Err(ProxyError::unauthorized("missing API key")),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bearer_and_header_forms_accepted() {
		let mut headers = HeaderMap::new();
		headers.insert("authorization", "Bearer sk-test".parse().unwrap());
		assert_eq!(provided_key(&headers), Some("sk-test"));

		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", "sk-test".parse().unwrap());
		assert_eq!(provided_key(&headers), Some("sk-test"));

		let mut headers = HeaderMap::new();
		headers.insert("authorization", "Basic dXNlcg==".parse().unwrap());
		assert_eq!(provided_key(&headers), None);
	}
}
