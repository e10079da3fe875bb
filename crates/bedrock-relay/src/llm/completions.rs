//! OpenAI Chat Completions wire types.
//!
//! Request types are passthrough structs: typed fields for everything the
//! proxy reads, plus a flattened `rest` so unknown fields survive a
//! decode/encode round trip. Response types are fully owned by the proxy.

use serde::{Deserialize, Serialize};

/// A client chat-completions request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default)]
	pub messages: Vec<RequestMessage>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stream_options: Option<StreamOptions>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Tool>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop: Option<Stop>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub n: Option<u64>,

	#[serde(flatten, default)]
	pub rest: serde_json::Value,
}

impl Request {
	pub fn streaming(&self) -> bool {
		self.stream.unwrap_or_default()
	}

	pub fn include_usage(&self) -> bool {
		self
			.stream_options
			.as_ref()
			.map(|o| o.include_usage)
			.unwrap_or_default()
	}
}

/// Options for streaming responses. Only meaningful with `stream: true`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamOptions {
	#[serde(default)]
	pub include_usage: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestMessage {
	pub role: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<MessageContent>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCall>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(flatten, default)]
	pub rest: serde_json::Value,
}

impl RequestMessage {
	/// Flatten the message content to plain text. Array content keeps only
	/// `text` parts, joined with a newline.
	pub fn text(&self) -> Option<String> {
		match self.content.as_ref()? {
			MessageContent::Text(t) => Some(t.clone()),
			MessageContent::Parts(parts) => {
				let texts: Vec<&str> = parts
					.iter()
					.filter(|p| p.r#type == "text")
					.filter_map(|p| p.text.as_deref())
					.collect();
				if texts.is_empty() {
					None
				} else {
					Some(texts.join("\n"))
				}
			},
		}
	}
}

/// String-or-parts message content.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Parts(Vec<ContentPart>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentPart {
	pub r#type: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub text: Option<String>,
	#[serde(flatten, default)]
	pub rest: serde_json::Value,
}

/// `stop` accepts a bare string or an array of strings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Stop {
	One(String),
	Many(Vec<String>),
}

impl Stop {
	pub fn into_sequence(self) -> Vec<String> {
		match self {
			Stop::One(s) => vec![s],
			Stop::Many(v) => v,
		}
	}
}

/// Tool definition. `function` is optional at the wire level so the
/// translator can report the offending index instead of a decode failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tool {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub function: Option<FunctionDef>,
	#[serde(flatten, default)]
	pub rest: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionDef {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parameters: Option<serde_json::Value>,
	#[serde(flatten, default)]
	pub rest: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
	Mode(ToolChoiceMode),
	Named(NamedToolChoice),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoiceMode {
	Auto,
	None,
	Required,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NamedToolChoice {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	pub function: FunctionName,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionName {
	pub name: String,
}

/// An assistant tool call, in requests and responses alike.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
	pub id: String,
	pub r#type: String,
	pub function: FunctionCall,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
	pub name: String,
	/// JSON-encoded arguments, passed through verbatim.
	pub arguments: String,
}

pub const COMPLETION_OBJECT: &str = "chat.completion";
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// A unary chat completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<Choice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Choice {
	pub index: u32,
	pub message: ResponseMessage,
	pub finish_reason: Option<String>,
}

/// `content` and `tool_calls` serialize as explicit nulls when absent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseMessage {
	pub role: String,
	pub content: Option<String>,
	pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
	pub prompt_tokens: u64,
	pub completion_tokens: u64,
	pub total_tokens: u64,
}

/// One SSE chunk of a streamed completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChunk {
	pub id: String,
	pub object: String,
	pub created: i64,
	pub model: String,
	pub choices: Vec<StreamChoice>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub usage: Option<Usage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamChoice {
	pub index: u32,
	pub delta: Delta,
	pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Delta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub role: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub content: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallDelta {
	pub index: u32,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub r#type: Option<String>,
	pub function: FunctionCallDelta,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FunctionCallDelta {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub arguments: Option<String>,
}

/// The OpenAI error envelope. Fields are declared in sorted key order so a
/// plain serialize writes them sorted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: ErrorBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
	pub code: String,
	pub message: String,
	pub r#type: String,
}

impl ErrorResponse {
	pub fn new(
		message: impl Into<String>,
		r#type: impl Into<String>,
		code: impl Into<String>,
	) -> Self {
		Self {
			error: ErrorBody {
				code: code.into(),
				message: message.into(),
				r#type: r#type.into(),
			},
		}
	}
}
