//! AWS EventStream decoding for Bedrock streaming responses.
//!
//! Frame-level parsing is delegated to `aws_event_stream_parser`'s
//! [`EventStreamCodec`]; this module layers the Bedrock semantics on top:
//! exception frames raise typed errors, `chunk` events carry a base64
//! `bytes` payload holding one Anthropic event, and every other frame
//! (notably the initial-response preamble) is dropped.

use aws_event_stream_parser::{EventStreamCodec, HeaderValue, Message};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio_util::codec::Decoder;

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
	#[error("malformed frame: {0}")]
	Frame(String),
	#[error("upstream exception ({}): {message}", kind.as_deref().unwrap_or("unknown"))]
	Exception {
		kind: Option<String>,
		message: String,
	},
	#[error("bad chunk payload: {0}")]
	Payload(String),
	#[error("upstream body error: {0}")]
	Source(String),
}

fn string_header<'a>(message: &'a Message, name: &str) -> Option<&'a str> {
	message
		.headers
		.headers
		.iter()
		.find(|h| h.key.as_str() == name)
		.and_then(|h| match &h.value {
			HeaderValue::String(s) => Some(s.as_str()),
			_ => None,
		})
}

/// Extract the decoded Anthropic event carried by a frame, if any.
///
/// Exception frames raise; `chunk` events decode their base64 `bytes` field;
/// anything else yields nothing.
pub fn event_payload(message: &Message) -> Result<Option<Bytes>, StreamError> {
	if string_header(message, ":message-type") == Some("exception") {
		return Err(StreamError::Exception {
			kind: string_header(message, ":exception-type").map(str::to_string),
			message: String::from_utf8_lossy(&message.body).into_owned(),
		});
	}
	if string_header(message, ":event-type") != Some("chunk") {
		return Ok(None);
	}
	let outer: serde_json::Value = serde_json::from_slice(&message.body)
		.map_err(|e| StreamError::Payload(e.to_string()))?;
	let encoded = outer
		.get("bytes")
		.and_then(serde_json::Value::as_str)
		.ok_or_else(|| StreamError::Payload("chunk payload has no bytes field".to_string()))?;
	let decoded = BASE64
		.decode(encoded)
		.map_err(|e| StreamError::Payload(format!("base64: {e}")))?;
	Ok(Some(Bytes::from(decoded)))
}

/// Turn a stream of body byte buffers into a stream of decoded Anthropic
/// event payloads. Partial frames stay buffered across source chunks. The
/// sequence ends when the source ends; any parse error or exception frame
/// ends it with that error.
pub fn events<S, E>(source: S) -> EventStream<S>
where
	S: Stream<Item = Result<Bytes, E>>,
	E: std::fmt::Display,
{
	EventStream {
		source,
		codec: EventStreamCodec,
		buf: BytesMut::new(),
		done: false,
	}
}

pin_project! {
	pub struct EventStream<S> {
		#[pin]
		source: S,
		codec: EventStreamCodec,
		buf: BytesMut,
		done: bool,
	}
}

impl<S, E> Stream for EventStream<S>
where
	S: Stream<Item = Result<Bytes, E>>,
	E: std::fmt::Display,
{
	type Item = Result<Bytes, StreamError>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let mut this = self.project();
		loop {
			if *this.done {
				return Poll::Ready(None);
			}
			match this.codec.decode(this.buf) {
				Ok(Some(message)) => match event_payload(&message) {
					Ok(Some(event)) => return Poll::Ready(Some(Ok(event))),
					Ok(None) => continue,
					Err(e) => {
						*this.done = true;
						return Poll::Ready(Some(Err(e)));
					},
				},
				Ok(None) => {},
				Err(e) => {
					*this.done = true;
					return Poll::Ready(Some(Err(StreamError::Frame(e.to_string()))));
				},
			}
			match ready!(this.source.as_mut().poll_next(cx)) {
				Some(Ok(chunk)) => this.buf.extend_from_slice(&chunk),
				Some(Err(e)) => {
					*this.done = true;
					return Poll::Ready(Some(Err(StreamError::Source(e.to_string()))));
				},
				None => {
					*this.done = true;
					return Poll::Ready(None);
				},
			}
		}
	}
}
