//! Protocol translation between OpenAI Chat Completions and
//! Anthropic-on-Bedrock.

pub mod bedrock;
pub mod completions;

/// Errors raised by the translators. The orchestrator is the only place
/// these are shaped into HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AIError {
	#[error("request body exceeds the maximum size")]
	RequestTooLarge,
	#[error("invalid request: {0}")]
	InvalidRequest(String),
	#[error("tools[{0}] is missing a function definition")]
	MissingFunction(usize),
	#[error("failed to parse upstream response: {0}")]
	ResponseParsing(#[source] serde_json::Error),
	#[error("failed to encode request: {0}")]
	RequestMarshal(#[source] serde_json::Error),
}
