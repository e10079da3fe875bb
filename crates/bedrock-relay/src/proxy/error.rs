//! The single place OpenAI error envelopes are shaped and HTTP statuses
//! chosen. Translators and the model cache raise typed errors; handlers
//! convert them here.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::llm::AIError;
use crate::llm::completions::ErrorResponse;
use crate::models::ModelError;

#[derive(Debug)]
pub struct ProxyError {
	pub status: StatusCode,
	pub error_type: &'static str,
	pub code: &'static str,
	pub message: String,
}

impl ProxyError {
	pub fn invalid_request(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::BAD_REQUEST,
			error_type: "invalid_request_error",
			code: "invalid_request",
			message: message.into(),
		}
	}

	pub fn model_not_found(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::NOT_FOUND,
			error_type: "invalid_request_error",
			code: "model_not_found",
			message: message.into(),
		}
	}

	pub fn rate_limited(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::TOO_MANY_REQUESTS,
			error_type: "rate_limit_error",
			code: "rate_limit_exceeded",
			message: message.into(),
		}
	}

	pub fn timeout(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::REQUEST_TIMEOUT,
			error_type: "server_error",
			code: "timeout",
			message: message.into(),
		}
	}

	pub fn internal(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			error_type: "server_error",
			code: "server_error",
			message: message.into(),
		}
	}

	pub fn unauthorized(message: impl Into<String>) -> Self {
		Self {
			status: StatusCode::UNAUTHORIZED,
			error_type: "invalid_request_error",
			code: "invalid_api_key",
			message: message.into(),
		}
	}

	/// Map a non-2xx Bedrock status onto the northbound surface.
	pub fn from_bedrock_status(status: u16, message: String) -> Self {
		match status {
			404 => Self::model_not_found(message),
			429 => Self::rate_limited(message),
			408 => Self::timeout(message),
			// 403 and everything unexpected surface as a server error with
			// the upstream message preserved.
			_ => Self::internal(message),
		}
	}
}

impl From<ModelError> for ProxyError {
	fn from(e: ModelError) -> Self {
		match e {
			ModelError::NotFound => Self::model_not_found("model not found"),
			other => Self::internal(other.to_string()),
		}
	}
}

impl From<AIError> for ProxyError {
	fn from(e: AIError) -> Self {
		match e {
			AIError::RequestTooLarge
			| AIError::InvalidRequest(_)
			| AIError::MissingFunction(_) => Self::invalid_request(e.to_string()),
			AIError::ResponseParsing(_) | AIError::RequestMarshal(_) => Self::internal(e.to_string()),
		}
	}
}

impl IntoResponse for ProxyError {
	fn into_response(self) -> Response {
		let body = ErrorResponse::new(self.message, self.error_type, self.code);
		(self.status, Json(body)).into_response()
	}
}
