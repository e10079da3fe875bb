//! Anthropic-on-Bedrock request body types for the InvokeModel API.
//!
//! Responses deliberately stay as `serde_json::Value`: Bedrock evolves the
//! response wire faster than the request wire, and a strict response schema
//! breaks the moment a new field or block kind ships. Requests are typed so
//! the serializer output is stable.

use serde::{Deserialize, Serialize};

/// Fixed wire version Bedrock requires for Anthropic payloads.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Applied when the client supplies neither `max_tokens` nor
/// `max_completion_tokens`.
pub const DEFAULT_MAX_TOKENS: u64 = 8192;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvokeRequest {
	pub anthropic_version: String,
	pub max_tokens: u64,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub system: Option<String>,
	pub messages: Vec<Message>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub top_p: Option<f64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stop_sequences: Option<Vec<String>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<ToolSpec>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<ToolChoice>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
	pub role: String,
	pub content: MessageContent,
}

/// Anthropic accepts either a bare string or a block sequence as message
/// content. The string form only appears for assistant messages that carry
/// neither text nor tool calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
	Text(String),
	Blocks(Vec<ContentBlock>),
}

impl MessageContent {
	pub fn blocks(&self) -> Option<&[ContentBlock]> {
		match self {
			MessageContent::Blocks(b) => Some(b),
			MessageContent::Text(_) => None,
		}
	}
}

/// Exactly one variant per block; the `type` tag picks it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
	Text {
		text: String,
	},
	ToolUse {
		id: String,
		name: String,
		input: serde_json::Value,
	},
	ToolResult {
		tool_use_id: String,
		content: String,
	},
}

impl ContentBlock {
	pub fn is_tool_result(&self) -> bool {
		matches!(self, ContentBlock::ToolResult { .. })
	}
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub input_schema: serde_json::Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolChoice {
	Auto,
	Any,
	Tool { name: String },
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn content_blocks_tag_on_type() {
		let block = ContentBlock::ToolUse {
			id: "toolu_1".into(),
			name: "weather".into(),
			input: json!({"city": "Paris"}),
		};
		assert_eq!(
			serde_json::to_value(&block).unwrap(),
			json!({"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Paris"}})
		);

		let result = ContentBlock::ToolResult {
			tool_use_id: "toolu_1".into(),
			content: "Sunny".into(),
		};
		assert_eq!(
			serde_json::to_value(&result).unwrap(),
			json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "Sunny"})
		);
	}

	#[test]
	fn tool_choice_wire_shapes() {
		assert_eq!(
			serde_json::to_value(ToolChoice::Auto).unwrap(),
			json!({"type": "auto"})
		);
		assert_eq!(
			serde_json::to_value(ToolChoice::Any).unwrap(),
			json!({"type": "any"})
		);
		assert_eq!(
			serde_json::to_value(ToolChoice::Tool {
				name: "weather".into()
			})
			.unwrap(),
			json!({"type": "tool", "name": "weather"})
		);
	}
}
