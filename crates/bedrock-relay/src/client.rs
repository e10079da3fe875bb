//! Signed outbound HTTP with retries.
//!
//! Signing is redone per attempt because SigV4 signatures are time-based.
//! Retries cover 429 and 5xx plus transport errors, with exponential backoff
//! and ±25 % jitter. Only the dispatch is ever retried: by the time a
//! streaming body is being read the response has already been returned to
//! the caller, so a stream is never replayed.

use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use tracing::{debug, warn};

use crate::aws::Signer;
use crate::aws::sigv4::SignError;

const BACKOFF_BASE: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error(transparent)]
	Sign(#[from] SignError),
	#[error("request failed: {0}")]
	Request(#[from] reqwest::Error),
}

#[derive(Clone, Debug)]
pub struct RelayClient {
	http: reqwest::Client,
	signer: Signer,
	max_retries: u32,
}

impl RelayClient {
	pub fn new(http: reqwest::Client, signer: Signer, max_retries: u32) -> Self {
		Self {
			http,
			signer,
			max_retries,
		}
	}

	/// POST a JSON body, SigV4-signed. Returns the response whatever its
	/// status; callers own status handling.
	pub async fn post(
		&self,
		url: &str,
		body: Bytes,
		accept: &'static str,
		timeout: Duration,
	) -> Result<reqwest::Response, ClientError> {
		let to_sign = [("accept", accept), ("content-type", "application/json")];
		let mut attempt = 0;
		loop {
			let signed = self.signer.sign("POST", url, &to_sign, &body)?;
			let mut request = self
				.http
				.post(url)
				.timeout(timeout)
				.header("accept", accept)
				.header("content-type", "application/json")
				.body(body.clone());
			for (name, value) in &signed {
				request = request.header(name.as_str(), value.as_str());
			}

			match request.send().await {
				Ok(resp) if retryable_status(resp.status()) && attempt < self.max_retries => {
					warn!(status = %resp.status(), attempt, "retryable upstream status");
				},
				Ok(resp) => return Ok(resp),
				Err(e) if attempt < self.max_retries => {
					warn!(error = %e, attempt, "retryable transport error");
				},
				Err(e) => return Err(e.into()),
			}
			let delay = backoff_delay(attempt);
			debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
			tokio::time::sleep(delay).await;
			attempt += 1;
		}
	}

	/// GET with SigV4, used for the Bedrock control plane.
	pub async fn get(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, ClientError> {
		let to_sign = [("accept", "application/json")];
		let mut attempt = 0;
		loop {
			let signed = self.signer.sign("GET", url, &to_sign, b"")?;
			let mut request = self
				.http
				.get(url)
				.timeout(timeout)
				.header("accept", "application/json");
			for (name, value) in &signed {
				request = request.header(name.as_str(), value.as_str());
			}

			match request.send().await {
				Ok(resp) if retryable_status(resp.status()) && attempt < self.max_retries => {
					warn!(status = %resp.status(), attempt, "retryable upstream status");
				},
				Ok(resp) => return Ok(resp),
				Err(e) if attempt < self.max_retries => {
					warn!(error = %e, attempt, "retryable transport error");
				},
				Err(e) => return Err(e.into()),
			}
			tokio::time::sleep(backoff_delay(attempt)).await;
			attempt += 1;
		}
	}
}

fn retryable_status(status: reqwest::StatusCode) -> bool {
	status.as_u16() == 429 || status.is_server_error()
}

fn backoff_delay(attempt: u32) -> Duration {
	let base = BACKOFF_BASE.as_millis() as f64 * 2f64.powi(attempt as i32);
	let jitter = rand::rng().random_range(0.75..=1.25);
	Duration::from_millis((base * jitter) as u64)
}
