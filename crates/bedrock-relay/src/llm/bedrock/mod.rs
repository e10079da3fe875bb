//! OpenAI Chat Completions ⇄ Anthropic-on-Bedrock translation.
//!
//! The request side builds a typed [`types::InvokeRequest`] so that the same
//! client input always serializes to the same bytes. The response side works
//! on raw `serde_json::Value` and extracts only the fields it needs.

pub mod streaming;
pub mod types;

use itertools::Itertools;
use serde_json::Value;
use uuid::Uuid;

use crate::llm::AIError;
use crate::llm::completions::{
	self, Choice, Completion, FunctionCall, MessageContent as OaiContent, Request, ResponseMessage,
	ToolCall, ToolChoice as OaiToolChoice, ToolChoiceMode, Usage,
};
use types::{ContentBlock, InvokeRequest, Message, MessageContent, ToolChoice, ToolSpec};

/// Everything the orchestrator needs to dispatch one Bedrock invocation.
#[derive(Clone, Debug)]
pub struct TranslatedRequest {
	pub path: String,
	pub body: InvokeRequest,
	pub streaming: bool,
	pub include_usage: bool,
	/// The client's model string, echoed back in every response.
	pub original_model: String,
}

/// Bedrock runtime path for a model invocation.
pub fn invoke_path(model_id: &str, streaming: bool) -> String {
	if streaming {
		format!("/model/{model_id}/invoke-with-response-stream")
	} else {
		format!("/model/{model_id}/invoke")
	}
}

/// Anthropic stop reason → OpenAI finish reason. Unknown reasons pass
/// through unchanged so new upstream values degrade gracefully.
pub fn map_stop_reason(reason: &str) -> String {
	match reason {
		"end_turn" => "stop",
		"max_tokens" => "length",
		"tool_use" => "tool_calls",
		"stop_sequence" => "stop",
		other => other,
	}
	.to_string()
}

/// Translate a validated client request into a Bedrock invocation.
pub fn translate_request(req: &Request, bedrock_model_id: &str) -> Result<TranslatedRequest, AIError> {
	let streaming = req.streaming();
	let original_model = req.model.clone().unwrap_or_default();

	let system = req
		.messages
		.iter()
		.filter(|m| m.role == "system")
		.filter_map(|m| m.text())
		.join("\n");
	let system = if system.is_empty() { None } else { Some(system) };

	let mut messages: Vec<Message> = Vec::new();
	for msg in req.messages.iter().filter(|m| m.role != "system") {
		match msg.role.as_str() {
			"assistant" => {
				let mut blocks = Vec::new();
				match &msg.content {
					Some(OaiContent::Text(t)) if !t.is_empty() => {
						blocks.push(ContentBlock::Text { text: t.clone() });
					},
					Some(OaiContent::Parts(parts)) => {
						for p in parts {
							if p.r#type == "text"
								&& let Some(text) = &p.text
							{
								blocks.push(ContentBlock::Text { text: text.clone() });
							}
						}
					},
					_ => {},
				}
				for tc in msg.tool_calls.iter().flatten() {
					// A tool call carries its arguments as a JSON-encoded
					// string; if it does not parse, carry the raw string.
					let input = serde_json::from_str::<Value>(&tc.function.arguments)
						.unwrap_or_else(|_| Value::String(tc.function.arguments.clone()));
					blocks.push(ContentBlock::ToolUse {
						id: tc.id.clone(),
						name: tc.function.name.clone(),
						input,
					});
				}
				let content = if blocks.is_empty() {
					MessageContent::Text(String::new())
				} else {
					MessageContent::Blocks(blocks)
				};
				messages.push(Message {
					role: "assistant".to_string(),
					content,
				});
			},
			"tool" => {
				let block = ContentBlock::ToolResult {
					tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
					content: msg.text().unwrap_or_default(),
				};
				// Bedrock requires consecutive tool results grouped into one
				// user message.
				let open_run = messages.last().is_some_and(|prev| {
					prev.role == "user"
						&& prev
							.content
							.blocks()
							.is_some_and(|b| !b.is_empty() && b.iter().all(ContentBlock::is_tool_result))
				});
				if open_run
					&& let Some(Message {
						content: MessageContent::Blocks(blocks),
						..
					}) = messages.last_mut()
				{
					blocks.push(block);
				} else {
					messages.push(Message {
						role: "user".to_string(),
						content: MessageContent::Blocks(vec![block]),
					});
				}
			},
			role => {
				let blocks = text_blocks(&msg.content);
				messages.push(Message {
					role: role.to_string(),
					content: MessageContent::Blocks(blocks),
				});
			},
		}
	}

	let tools = match &req.tools {
		Some(tools) if !tools.is_empty() => {
			let mut specs = Vec::with_capacity(tools.len());
			for (i, tool) in tools.iter().enumerate() {
				let function = tool.function.as_ref().ok_or(AIError::MissingFunction(i))?;
				specs.push(ToolSpec {
					name: function.name.clone(),
					description: function.description.clone(),
					input_schema: function
						.parameters
						.clone()
						.unwrap_or_else(|| Value::Object(Default::default())),
				});
			}
			Some(specs)
		},
		_ => None,
	};

	let tool_choice = match &req.tool_choice {
		Some(OaiToolChoice::Mode(ToolChoiceMode::Auto)) => Some(ToolChoice::Auto),
		Some(OaiToolChoice::Mode(ToolChoiceMode::None)) => None,
		Some(OaiToolChoice::Mode(ToolChoiceMode::Required)) => Some(ToolChoice::Any),
		Some(OaiToolChoice::Named(named)) => Some(ToolChoice::Tool {
			name: named.function.name.clone(),
		}),
		None => None,
	};

	let body = InvokeRequest {
		anthropic_version: types::ANTHROPIC_VERSION.to_string(),
		max_tokens: req
			.max_tokens
			.or(req.max_completion_tokens)
			.unwrap_or(types::DEFAULT_MAX_TOKENS),
		system,
		messages,
		temperature: req.temperature,
		top_p: req.top_p,
		stop_sequences: req.stop.clone().map(|s| s.into_sequence()),
		tools,
		tool_choice,
	};

	Ok(TranslatedRequest {
		path: invoke_path(bedrock_model_id, streaming),
		body,
		streaming,
		include_usage: req.include_usage(),
		original_model,
	})
}

fn text_blocks(content: &Option<OaiContent>) -> Vec<ContentBlock> {
	match content {
		Some(OaiContent::Text(t)) => vec![ContentBlock::Text { text: t.clone() }],
		Some(OaiContent::Parts(parts)) => parts
			.iter()
			.filter(|p| p.r#type == "text")
			.filter_map(|p| p.text.as_ref())
			.map(|text| ContentBlock::Text { text: text.clone() })
			.collect(),
		None => Vec::new(),
	}
}

/// Translate a unary Bedrock response into an OpenAI chat completion. The
/// response is a raw JSON value; fields the proxy does not understand are
/// ignored rather than rejected.
pub fn translate_response(resp: &Value, original_model: &str) -> Completion {
	let id = resp
		.get("id")
		.and_then(Value::as_str)
		.map(|id| format!("chatcmpl-{id}"))
		.unwrap_or_else(|| format!("chatcmpl-{}", Uuid::new_v4()));

	let empty = Vec::new();
	let blocks = resp
		.get("content")
		.and_then(Value::as_array)
		.unwrap_or(&empty);

	let mut text = String::new();
	let mut has_text = false;
	let mut tool_calls = Vec::new();
	for block in blocks {
		match block.get("type").and_then(Value::as_str) {
			Some("text") => {
				if let Some(t) = block.get("text").and_then(Value::as_str) {
					has_text = true;
					text.push_str(t);
				}
			},
			Some("tool_use") => {
				let input = block.get("input").cloned().unwrap_or(Value::Null);
				tool_calls.push(ToolCall {
					id: block
						.get("id")
						.and_then(Value::as_str)
						.unwrap_or_default()
						.to_string(),
					r#type: "function".to_string(),
					function: FunctionCall {
						name: block
							.get("name")
							.and_then(Value::as_str)
							.unwrap_or_default()
							.to_string(),
						arguments: serde_json::to_string(&input).unwrap_or_default(),
					},
				});
			},
			_ => {},
		}
	}

	let finish_reason = resp
		.get("stop_reason")
		.and_then(Value::as_str)
		.map(map_stop_reason);

	let usage = match (
		resp.pointer("/usage/input_tokens").and_then(Value::as_u64),
		resp.pointer("/usage/output_tokens").and_then(Value::as_u64),
	) {
		(Some(input), Some(output)) => Some(Usage {
			prompt_tokens: input,
			completion_tokens: output,
			total_tokens: input + output,
		}),
		_ => None,
	};

	Completion {
		id,
		object: completions::COMPLETION_OBJECT.to_string(),
		created: chrono::Utc::now().timestamp(),
		model: original_model.to_string(),
		choices: vec![Choice {
			index: 0,
			message: ResponseMessage {
				role: "assistant".to_string(),
				content: if has_text { Some(text) } else { None },
				tool_calls: if tool_calls.is_empty() {
					None
				} else {
					Some(tool_calls)
				},
			},
			finish_reason,
		}],
		usage,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn request(body: serde_json::Value) -> Request {
		serde_json::from_value(body).unwrap()
	}

	#[test]
	fn invoke_path_follows_streaming_flag() {
		let unary = request(json!({
			"model": "claude-sonnet-4-5",
			"messages": [{"role": "user", "content": "hi"}]
		}));
		let out = translate_request(&unary, "anthropic.claude-sonnet-4-5-v1:0").unwrap();
		assert!(out.path.ends_with("/invoke"));
		assert!(!out.streaming);

		let streamed = request(json!({
			"model": "claude-sonnet-4-5",
			"messages": [{"role": "user", "content": "hi"}],
			"stream": true
		}));
		let out = translate_request(&streamed, "anthropic.claude-sonnet-4-5-v1:0").unwrap();
		assert_eq!(
			out.path,
			"/model/anthropic.claude-sonnet-4-5-v1:0/invoke-with-response-stream"
		);
		assert!(out.streaming);
	}

	#[test]
	fn anthropic_version_is_pinned() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}]
		}));
		let out = translate_request(&req, "anthropic.m-v1:0").unwrap();
		assert_eq!(out.body.anthropic_version, "bedrock-2023-05-31");
	}

	#[test]
	fn max_tokens_prefers_client_then_completion_then_default() {
		let both = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"max_tokens": 100,
			"max_completion_tokens": 200
		}));
		assert_eq!(translate_request(&both, "id").unwrap().body.max_tokens, 100);

		let completion_only = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"max_completion_tokens": 200
		}));
		assert_eq!(
			translate_request(&completion_only, "id").unwrap().body.max_tokens,
			200
		);

		let neither = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}]
		}));
		assert_eq!(translate_request(&neither, "id").unwrap().body.max_tokens, 8192);
	}

	#[test]
	fn system_messages_extracted_and_joined() {
		let req = request(json!({
			"model": "m",
			"messages": [
				{"role": "system", "content": "first"},
				{"role": "user", "content": "hi"},
				{"role": "system", "content": "second"}
			]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(out.body.system.as_deref(), Some("first\nsecond"));
		assert!(out.body.messages.iter().all(|m| m.role != "system"));
		assert_eq!(out.body.messages.len(), 1);
	}

	#[test]
	fn system_tool_call_roundtrip() {
		let req = request(json!({
			"model": "m",
			"messages": [
				{"role": "system", "content": "You are helpful."},
				{"role": "user", "content": "Weather?"},
				{"role": "assistant", "content": "", "tool_calls": [{
					"id": "call_1",
					"type": "function",
					"function": {"name": "weather", "arguments": "{\"city\":\"Paris\"}"}
				}]},
				{"role": "tool", "tool_call_id": "call_1", "content": "Sunny 25C"}
			]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(out.body.system.as_deref(), Some("You are helpful."));
		assert_eq!(out.body.messages.len(), 3);

		let assistant = &out.body.messages[1];
		assert_eq!(assistant.role, "assistant");
		assert_eq!(
			assistant.content.blocks().unwrap(),
			&[ContentBlock::ToolUse {
				id: "call_1".into(),
				name: "weather".into(),
				input: json!({"city": "Paris"}),
			}]
		);

		let last = &out.body.messages[2];
		assert_eq!(last.role, "user");
		assert_eq!(
			last.content.blocks().unwrap(),
			&[ContentBlock::ToolResult {
				tool_use_id: "call_1".into(),
				content: "Sunny 25C".into(),
			}]
		);
	}

	#[test]
	fn consecutive_tool_results_merge_into_one_user_message() {
		let req = request(json!({
			"model": "m",
			"messages": [
				{"role": "user", "content": "go"},
				{"role": "assistant", "content": "", "tool_calls": [
					{"id": "a", "type": "function", "function": {"name": "f", "arguments": "{}"}},
					{"id": "b", "type": "function", "function": {"name": "g", "arguments": "{}"}}
				]},
				{"role": "tool", "tool_call_id": "a", "content": "one"},
				{"role": "tool", "tool_call_id": "b", "content": "two"}
			]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(out.body.messages.len(), 3);
		let merged = out.body.messages.last().unwrap();
		assert_eq!(merged.role, "user");
		let blocks = merged.content.blocks().unwrap();
		assert_eq!(blocks.len(), 2);
		assert!(blocks.iter().all(ContentBlock::is_tool_result));
	}

	#[test]
	fn tool_result_after_plain_user_message_starts_fresh() {
		let req = request(json!({
			"model": "m",
			"messages": [
				{"role": "tool", "tool_call_id": "a", "content": "one"},
				{"role": "user", "content": "aside"},
				{"role": "tool", "tool_call_id": "b", "content": "two"}
			]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(out.body.messages.len(), 3);
	}

	#[test]
	fn assistant_without_content_or_calls_is_empty_string() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "assistant"}]
		}));
		let out = translate_request(&req, "id").unwrap();
		match &out.body.messages[0].content {
			MessageContent::Text(t) => assert_eq!(t, ""),
			_ => panic!("expected string content"),
		}
	}

	#[test]
	fn unparseable_tool_arguments_carried_as_string() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "assistant", "tool_calls": [{
				"id": "c",
				"type": "function",
				"function": {"name": "f", "arguments": "not json"}
			}]}]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(
			out.body.messages[0].content.blocks().unwrap(),
			&[ContentBlock::ToolUse {
				id: "c".into(),
				name: "f".into(),
				input: json!("not json"),
			}]
		);
	}

	#[test]
	fn non_text_user_parts_dropped() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": [
				{"type": "text", "text": "look"},
				{"type": "image_url", "image_url": {"url": "https://example.com/x.png"}}
			]}]
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(
			out.body.messages[0].content.blocks().unwrap(),
			&[ContentBlock::Text { text: "look".into() }]
		);
	}

	#[test]
	fn tools_translate_and_missing_function_names_index() {
		let ok = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"tools": [{"type": "function", "function": {
				"name": "weather",
				"description": "look up weather",
				"parameters": {"type": "object"}
			}}]
		}));
		let out = translate_request(&ok, "id").unwrap();
		let tools = out.body.tools.unwrap();
		assert_eq!(tools[0].name, "weather");
		assert_eq!(tools[0].input_schema, json!({"type": "object"}));

		let bad = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"tools": [
				{"type": "function", "function": {"name": "ok"}},
				{"type": "function"}
			]
		}));
		match translate_request(&bad, "id") {
			Err(AIError::MissingFunction(1)) => {},
			other => panic!("expected MissingFunction(1), got {other:?}"),
		}
	}

	#[test]
	fn empty_tools_omitted() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"tools": []
		}));
		assert!(translate_request(&req, "id").unwrap().body.tools.is_none());
	}

	#[test]
	fn tool_choice_mappings() {
		let mk = |choice: serde_json::Value| {
			let req = request(json!({
				"model": "m",
				"messages": [{"role": "user", "content": "hi"}],
				"tool_choice": choice
			}));
			translate_request(&req, "id").unwrap().body.tool_choice
		};
		assert_eq!(mk(json!("auto")), Some(ToolChoice::Auto));
		assert_eq!(mk(json!("none")), None);
		assert_eq!(mk(json!("required")), Some(ToolChoice::Any));
		assert_eq!(
			mk(json!({"type": "function", "function": {"name": "f"}})),
			Some(ToolChoice::Tool { name: "f".into() })
		);
	}

	#[test]
	fn stop_widens_and_sampling_passes_through() {
		let req = request(json!({
			"model": "m",
			"messages": [{"role": "user", "content": "hi"}],
			"stop": "END",
			"temperature": 0.5,
			"top_p": 0.9
		}));
		let out = translate_request(&req, "id").unwrap();
		assert_eq!(out.body.stop_sequences, Some(vec!["END".to_string()]));
		assert_eq!(out.body.temperature, Some(0.5));
		assert_eq!(out.body.top_p, Some(0.9));
	}

	#[test]
	fn translation_is_deterministic() {
		let req = request(json!({
			"model": "m",
			"messages": [
				{"role": "system", "content": "s"},
				{"role": "user", "content": "hi"}
			],
			"max_tokens": 16
		}));
		let a = serde_json::to_vec(&translate_request(&req, "id").unwrap().body).unwrap();
		let b = serde_json::to_vec(&translate_request(&req, "id").unwrap().body).unwrap();
		assert_eq!(a, b);
	}

	#[test]
	fn unary_response_hello() {
		let resp = json!({
			"id": "msg_abc",
			"content": [{"type": "text", "text": "Hi!"}],
			"stop_reason": "end_turn",
			"usage": {"input_tokens": 12, "output_tokens": 18}
		});
		let out = translate_response(&resp, "claude-sonnet-4-5-20250514");
		assert_eq!(out.id, "chatcmpl-msg_abc");
		assert_eq!(out.model, "claude-sonnet-4-5-20250514");
		assert_eq!(out.choices[0].message.content.as_deref(), Some("Hi!"));
		assert_eq!(out.choices[0].finish_reason.as_deref(), Some("stop"));
		assert_eq!(
			out.usage,
			Some(Usage {
				prompt_tokens: 12,
				completion_tokens: 18,
				total_tokens: 30
			})
		);
	}

	#[test]
	fn unary_response_tool_use() {
		let resp = json!({
			"id": "msg_1",
			"content": [
				{"type": "text", "text": "calling"},
				{"type": "tool_use", "id": "toolu_1", "name": "weather", "input": {"city": "Paris"}}
			],
			"stop_reason": "tool_use"
		});
		let out = translate_response(&resp, "m");
		assert_eq!(out.choices[0].finish_reason.as_deref(), Some("tool_calls"));
		let calls = out.choices[0].message.tool_calls.as_ref().unwrap();
		assert_eq!(calls[0].id, "toolu_1");
		assert_eq!(calls[0].function.name, "weather");
		assert_eq!(
			serde_json::from_str::<Value>(&calls[0].function.arguments).unwrap(),
			json!({"city": "Paris"})
		);
	}

	#[test]
	fn unary_response_without_text_or_usage() {
		let resp = json!({
			"content": [],
			"stop_reason": "weird_new_reason"
		});
		let out = translate_response(&resp, "m");
		assert!(out.id.starts_with("chatcmpl-"));
		assert_eq!(out.choices[0].message.content, None);
		assert_eq!(out.choices[0].message.tool_calls, None);
		// unknown stop reasons pass through
		assert_eq!(
			out.choices[0].finish_reason.as_deref(),
			Some("weird_new_reason")
		);
		assert!(out.usage.is_none());
	}
}
