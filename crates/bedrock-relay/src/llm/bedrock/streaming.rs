//! Anthropic streaming events → OpenAI SSE chunks.
//!
//! The encoder is a plain function over `(event, &mut StreamState)` so the
//! surrounding scheduling model (body adapter, channel, task) is free to
//! change without touching the translation. Events arrive as raw JSON
//! values and leave as SSE frames for a `tokio_sse_codec::SseEncoder`;
//! unknown event and delta kinds encode to nothing.

use std::borrow::Cow;

use bytes::Bytes;
use serde_json::Value;
use tokio_sse_codec::{Event, Frame};
use uuid::Uuid;

use super::map_stop_reason;
use crate::llm::completions::{
	CHUNK_OBJECT, Delta, FunctionCallDelta, StreamChoice, StreamChunk, ToolCallDelta, Usage,
};

/// Payload of the terminal sentinel event, emitted exactly once per stream.
pub const DONE_DATA: &[u8] = b"[DONE]";

/// Per-stream mutable state. `id`, `model` and `created` are fixed for the
/// life of the stream once the first chunk goes out.
#[derive(Debug)]
pub struct StreamState {
	id: Option<String>,
	model: String,
	created: Option<i64>,
	include_usage: bool,
	input_tokens: u64,
	output_tokens: u64,
	tool_call_index: u32,
	block_is_tool_use: bool,
}

impl StreamState {
	pub fn new(model: String, include_usage: bool) -> Self {
		Self {
			id: None,
			model,
			created: None,
			include_usage,
			input_tokens: 0,
			output_tokens: 0,
			tool_call_index: 0,
			block_is_tool_use: false,
		}
	}

	fn chunk(&mut self, choices: Vec<StreamChoice>, usage: Option<Usage>) -> StreamChunk {
		let id = self
			.id
			.get_or_insert_with(|| format!("chatcmpl-{}", Uuid::new_v4()))
			.clone();
		let created = *self
			.created
			.get_or_insert_with(|| chrono::Utc::now().timestamp());
		StreamChunk {
			id,
			object: CHUNK_OBJECT.to_string(),
			created,
			model: self.model.clone(),
			choices,
			usage,
		}
	}
}

fn data_frame(chunk: &StreamChunk) -> Option<Frame<Bytes>> {
	let json = serde_json::to_vec(chunk).ok()?;
	Some(Frame::Event(Event::<Bytes> {
		data: Bytes::from(json),
		name: Cow::Borrowed(""),
		id: None,
	}))
}

/// The `data: [DONE]` sentinel as an SSE frame.
pub fn done_frame() -> Frame<Bytes> {
	Frame::Event(Event::<Bytes> {
		data: Bytes::from_static(DONE_DATA),
		name: Cow::Borrowed(""),
		id: None,
	})
}

pub fn is_done(frame: &Frame<Bytes>) -> bool {
	matches!(frame, Frame::Event(event) if event.data.as_ref() == DONE_DATA)
}

fn choice(delta: Delta, finish_reason: Option<String>) -> Vec<StreamChoice> {
	vec![StreamChoice {
		index: 0,
		delta,
		finish_reason,
	}]
}

/// Encode one decoded Anthropic event into zero or more SSE frames.
pub fn encode_event(state: &mut StreamState, event: &Value) -> Vec<Frame<Bytes>> {
	let mut out = Vec::new();
	match event.get("type").and_then(Value::as_str) {
		Some("message_start") => {
			if let Some(id) = event.pointer("/message/id").and_then(Value::as_str) {
				state.id = Some(format!("chatcmpl-{id}"));
			}
			state.input_tokens = event
				.pointer("/message/usage/input_tokens")
				.and_then(Value::as_u64)
				.unwrap_or(0);
			let chunk = state.chunk(
				choice(
					Delta {
						role: Some("assistant".to_string()),
						content: Some(String::new()),
						tool_calls: None,
					},
					None,
				),
				None,
			);
			out.extend(data_frame(&chunk));
		},
		Some("content_block_start") => {
			let block = event.get("content_block");
			if block.and_then(|b| b.get("type")).and_then(Value::as_str) == Some("tool_use") {
				state.block_is_tool_use = true;
				let tool_call = ToolCallDelta {
					index: state.tool_call_index,
					id: block
						.and_then(|b| b.get("id"))
						.and_then(Value::as_str)
						.map(str::to_string),
					r#type: Some("function".to_string()),
					function: FunctionCallDelta {
						name: block
							.and_then(|b| b.get("name"))
							.and_then(Value::as_str)
							.map(str::to_string),
						arguments: Some(String::new()),
					},
				};
				let chunk = state.chunk(
					choice(
						Delta {
							role: None,
							content: None,
							tool_calls: Some(vec![tool_call]),
						},
						None,
					),
					None,
				);
				out.extend(data_frame(&chunk));
			} else {
				state.block_is_tool_use = false;
			}
		},
		Some("content_block_delta") => match event.pointer("/delta/type").and_then(Value::as_str) {
			Some("text_delta") => {
				if let Some(text) = event.pointer("/delta/text").and_then(Value::as_str) {
					let chunk = state.chunk(
						choice(
							Delta {
								role: Some("assistant".to_string()),
								content: Some(text.to_string()),
								tool_calls: None,
							},
							None,
						),
						None,
					);
					out.extend(data_frame(&chunk));
				}
			},
			Some("input_json_delta") => {
				if let Some(partial) = event.pointer("/delta/partial_json").and_then(Value::as_str) {
					let tool_call = ToolCallDelta {
						index: state.tool_call_index,
						id: None,
						r#type: None,
						function: FunctionCallDelta {
							name: None,
							arguments: Some(partial.to_string()),
						},
					};
					let chunk = state.chunk(
						choice(
							Delta {
								role: None,
								content: None,
								tool_calls: Some(vec![tool_call]),
							},
							None,
						),
						None,
					);
					out.extend(data_frame(&chunk));
				}
			},
			_ => {},
		},
		Some("content_block_stop") => {
			if state.block_is_tool_use {
				state.tool_call_index += 1;
				state.block_is_tool_use = false;
			}
		},
		Some("message_delta") => {
			if let Some(output) = event
				.pointer("/usage/output_tokens")
				.and_then(Value::as_u64)
			{
				state.output_tokens = output;
			}
			let finish_reason = event
				.pointer("/delta/stop_reason")
				.and_then(Value::as_str)
				.map(map_stop_reason);
			let chunk = state.chunk(
				choice(
					Delta {
						role: Some("assistant".to_string()),
						content: None,
						tool_calls: None,
					},
					finish_reason,
				),
				None,
			);
			out.extend(data_frame(&chunk));
		},
		Some("message_stop") => {
			if state.include_usage {
				let usage = Usage {
					prompt_tokens: state.input_tokens,
					completion_tokens: state.output_tokens,
					total_tokens: state.input_tokens + state.output_tokens,
				};
				let chunk = state.chunk(Vec::new(), Some(usage));
				out.extend(data_frame(&chunk));
			}
			out.push(done_frame());
		},
		_ => {},
	}
	out
}
