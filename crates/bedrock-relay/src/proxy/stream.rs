//! Streaming response body: Bedrock EventStream in, OpenAI SSE out.
//!
//! Modeled as a `Stream` of body chunks rather than a task-and-channel so
//! that dropping the response body cancels the upstream read, the frame
//! parsing and the heartbeat in one go. Heartbeat comments are emitted only
//! until the first decoded event; after any error the body completes
//! without further `data:` lines.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::time::{Instant, Sleep, sleep};
use tokio_sse_codec::{Frame, SseEncoder};
use tokio_util::codec::Encoder;
use tracing::{debug, warn};

use crate::llm::bedrock::streaming::{StreamState, encode_event, is_done};
use crate::parse::event_stream::{EventStream, events};

const HEARTBEAT_COMMENT: &str = "processing";
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);

pin_project! {
	pub struct SseBody<S> {
		#[pin]
		events: EventStream<S>,
		encoder: SseEncoder,
		state: StreamState,
		pending: VecDeque<Bytes>,
		#[pin]
		heartbeat: Sleep,
		saw_event: bool,
		done: bool,
	}
}

impl<S> SseBody<S> {
	pub fn new(source: S, state: StreamState) -> Self
	where
		S: Stream<Item = Result<Bytes, reqwest::Error>>,
	{
		Self {
			events: events(source),
			encoder: SseEncoder::new(),
			state,
			pending: VecDeque::new(),
			heartbeat: sleep(HEARTBEAT_PERIOD),
			saw_event: false,
			done: false,
		}
	}
}

fn encode_frame(encoder: &mut SseEncoder, frame: Frame<Bytes>) -> Option<Bytes> {
	let mut buf = BytesMut::new();
	encoder.encode(frame, &mut buf).ok()?;
	Some(buf.freeze())
}

impl<S> Stream for SseBody<S>
where
	S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
	type Item = Result<Bytes, Infallible>;

	fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		let mut this = self.project();
		loop {
			if let Some(chunk) = this.pending.pop_front() {
				return Poll::Ready(Some(Ok(chunk)));
			}
			if *this.done {
				return Poll::Ready(None);
			}

			match this.events.as_mut().poll_next(cx) {
				Poll::Ready(Some(Ok(event_bytes))) => {
					*this.saw_event = true;
					match serde_json::from_slice::<serde_json::Value>(&event_bytes) {
						Ok(event) => {
							for frame in encode_event(this.state, &event) {
								let terminal = is_done(&frame);
								if let Some(bytes) = encode_frame(this.encoder, frame) {
									this.pending.push_back(bytes);
								}
								if terminal {
									*this.done = true;
									break;
								}
							}
						},
						Err(e) => {
							warn!(error = %e, "dropping undecodable stream event");
							*this.done = true;
						},
					}
				},
				Poll::Ready(Some(Err(e))) => {
					// Headers are long gone; log and end the body cleanly.
					warn!(error = %e, "stream terminated");
					*this.done = true;
				},
				Poll::Ready(None) => {
					debug!("upstream stream ended");
					*this.done = true;
				},
				Poll::Pending => {
					if !*this.saw_event && this.heartbeat.as_mut().poll(cx).is_ready() {
						this
							.heartbeat
							.as_mut()
							.reset(Instant::now() + HEARTBEAT_PERIOD);
						let comment = Frame::Comment(Bytes::from_static(HEARTBEAT_COMMENT.as_bytes()));
						if let Some(bytes) = encode_frame(this.encoder, comment) {
							return Poll::Ready(Some(Ok(bytes)));
						}
					}
					return Poll::Pending;
				},
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use base64::Engine;
	use base64::engine::general_purpose::STANDARD as BASE64;
	use futures_util::StreamExt;
	use serde_json::json;

	fn chunk_frame(event: &serde_json::Value) -> Vec<u8> {
		let mut headers = header(":message-type", "event");
		headers.extend(header(":event-type", "chunk"));
		let payload = serde_json::to_vec(&json!({
			"bytes": BASE64.encode(serde_json::to_vec(event).unwrap())
		}))
		.unwrap();
		frame(&headers, &payload)
	}

	fn header(name: &str, value: &str) -> Vec<u8> {
		let mut out = vec![name.len() as u8];
		out.extend_from_slice(name.as_bytes());
		out.push(7u8);
		out.extend_from_slice(&(value.len() as u16).to_be_bytes());
		out.extend_from_slice(value.as_bytes());
		out
	}

	fn frame(headers: &[u8], payload: &[u8]) -> Vec<u8> {
		let total = 12 + headers.len() + payload.len() + 4;
		let mut out = Vec::with_capacity(total);
		out.extend_from_slice(&(total as u32).to_be_bytes());
		out.extend_from_slice(&(headers.len() as u32).to_be_bytes());
		out.extend_from_slice(&crc32fast::hash(&out).to_be_bytes());
		out.extend_from_slice(headers);
		out.extend_from_slice(payload);
		out.extend_from_slice(&crc32fast::hash(&out).to_be_bytes());
		out
	}

	async fn drive(body: Vec<u8>, include_usage: bool) -> Vec<String> {
		let source = futures_util::stream::iter(
			body
				.chunks(16)
				.map(Bytes::copy_from_slice)
				.map(Ok)
				.collect::<Vec<Result<Bytes, reqwest::Error>>>(),
		);
		let sse = SseBody::new(source, StreamState::new("m".to_string(), include_usage));
		sse
			.map(|r| String::from_utf8(r.unwrap().to_vec()).unwrap())
			.collect()
			.await
	}

	#[tokio::test]
	async fn happy_stream_ends_with_done() {
		let mut body = Vec::new();
		for event in [
			json!({"type": "message_start", "message": {"id": "msg_1", "usage": {"input_tokens": 3}}}),
			json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "hi"}}),
			json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 2}}),
			json!({"type": "message_stop"}),
		] {
			body.extend(chunk_frame(&event));
		}
		let lines = drive(body, true).await;
		assert_eq!(lines.len(), 5);
		assert_eq!(lines.last().unwrap(), "data: [DONE]\n\n");
		// exactly one [DONE], and nothing after it
		assert_eq!(lines.iter().filter(|l| l.contains("[DONE]")).count(), 1);
	}

	#[tokio::test]
	async fn exception_frame_ends_body_without_done() {
		let mut body = chunk_frame(&json!({"type": "message_start", "message": {"id": "msg_1"}}));
		let mut headers = header(":message-type", "exception");
		headers.extend(header(":exception-type", "throttlingException"));
		body.extend(frame(&headers, br#"{"message":"throttled"}"#));
		body.extend(chunk_frame(&json!({"type": "message_stop"})));

		let lines = drive(body, false).await;
		// opening chunk reached the client, then the body terminated
		assert_eq!(lines.len(), 1);
		assert!(lines[0].starts_with("data: "));
		assert!(!lines.iter().any(|l| l.contains("[DONE]")));
	}

	#[tokio::test(start_paused = true)]
	async fn heartbeats_flow_until_first_event() {
		let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<Result<Bytes, reqwest::Error>>();
		let source = tokio_stream_from(rx);
		let mut sse = Box::pin(SseBody::new(
			source,
			StreamState::new("m".to_string(), false),
		));

		// nothing upstream yet: two heartbeat periods elapse
		let first = String::from_utf8(sse.next().await.unwrap().unwrap().to_vec()).unwrap();
		assert!(first.starts_with(':'), "expected a comment line, got {first:?}");
		assert!(first.contains(HEARTBEAT_COMMENT));
		assert!(first.ends_with('\n'));
		let second = String::from_utf8(sse.next().await.unwrap().unwrap().to_vec()).unwrap();
		assert_eq!(second, first);

		// first event arrives; heartbeats stop for good
		tx.send(Ok(Bytes::from(chunk_frame(
			&json!({"type": "message_start", "message": {"id": "x"}}),
		))))
		.unwrap();
		let chunk = sse.next().await.unwrap().unwrap();
		assert!(chunk.starts_with(b"data: "));

		tx.send(Ok(Bytes::from(chunk_frame(&json!({"type": "message_stop"})))))
			.unwrap();
		drop(tx);
		let rest: Vec<_> = sse.collect().await;
		assert!(
			rest
				.iter()
				.all(|r| !r.as_ref().unwrap().starts_with(b":"))
		);
	}

	fn tokio_stream_from(
		mut rx: tokio::sync::mpsc::UnboundedReceiver<Result<Bytes, reqwest::Error>>,
	) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
		futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx))
	}
}
