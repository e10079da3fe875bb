//! Bedrock model discovery and resolution.
//!
//! Backs `/v1/models` and maps client model strings to invocable Bedrock
//! identifiers. The foundation-model list and the inference-profile mapping
//! come from the Bedrock control plane and are cached with a TTL; profile
//! fetch failures degrade to an empty mapping rather than failing listing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::aws::sigv4::SignError;
use crate::client::{ClientError, RelayClient};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
	#[error("invalid control-plane url: {0}")]
	InvalidUrl(String),
	#[error("model listing failed with status {0}")]
	RequestFailed(u16),
	#[error("model listing request failed: {0}")]
	Transport(String),
	#[error("model not found")]
	NotFound,
}

/// OpenAI-shaped model entry. Fields are declared in sorted key order so a
/// plain serialize writes them sorted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Model {
	pub created: i64,
	pub id: String,
	pub object: String,
	pub owned_by: String,
}

#[derive(Debug, Default)]
struct CacheState {
	models: Vec<Model>,
	/// user-facing id → raw Bedrock model id
	client_to_bedrock: HashMap<String, String>,
	/// raw Bedrock model id → inference-profile id
	profiles: HashMap<String, String>,
	fetched_at: Option<Instant>,
}

impl CacheState {
	fn fresh(&self, ttl: Duration) -> bool {
		self
			.fetched_at
			.map(|t| t.elapsed() < ttl)
			.unwrap_or(false)
	}
}

pub struct ModelCache {
	client: RelayClient,
	control_endpoint: String,
	ttl: Duration,
	timeout: Duration,
	state: RwLock<CacheState>,
}

impl ModelCache {
	pub fn new(
		client: RelayClient,
		control_endpoint: String,
		ttl: Duration,
		timeout: Duration,
	) -> Self {
		Self {
			client,
			control_endpoint,
			ttl,
			timeout,
			state: RwLock::new(CacheState::default()),
		}
	}

	/// The cached model list, repopulating when stale.
	pub async fn list(&self) -> Result<Vec<Model>, ModelError> {
		{
			let state = self.state.read().await;
			if state.fresh(self.ttl) {
				return Ok(state.models.clone());
			}
		}
		self.repopulate().await?;
		Ok(self.state.read().await.models.clone())
	}

	pub async fn get(&self, id: &str) -> Result<Model, ModelError> {
		self
			.list()
			.await?
			.into_iter()
			.find(|m| m.id == id)
			.ok_or(ModelError::NotFound)
	}

	/// Resolve a client model string to the Bedrock id to invoke.
	pub async fn resolve(&self, client_model: &str) -> Result<String, ModelError> {
		let name = client_model
			.strip_prefix("anthropic/")
			.unwrap_or(client_model);

		let base = if name.contains("anthropic.") {
			// Already a raw Bedrock identifier.
			name.to_string()
		} else {
			if !self.state.read().await.fresh(self.ttl) {
				// Best effort: an unreachable control plane surfaces as a
				// resolution miss, not a hard error.
				if let Err(e) = self.repopulate().await {
					debug!(error = %e, "model cache population failed during resolve");
				}
			}
			let state = self.state.read().await;
			match state.client_to_bedrock.get(name) {
				Some(id) => id.clone(),
				None => {
					let normalized = name.replace('.', "-");
					state
						.models
						.iter()
						.find(|m| m.id.starts_with(&normalized))
						.and_then(|m| state.client_to_bedrock.get(&m.id))
						.cloned()
						.ok_or(ModelError::NotFound)?
				},
			}
		};

		// Some models only accept profile-qualified invocations.
		let state = self.state.read().await;
		Ok(state.profiles.get(&base).cloned().unwrap_or(base))
	}

	async fn repopulate(&self) -> Result<(), ModelError> {
		let foundation = self
			.fetch_json(&format!(
				"{}/foundation-models?byProvider=Anthropic",
				self.control_endpoint
			))
			.await?;
		let (models, client_to_bedrock) = translate_foundation_models(&foundation);

		let profiles = match self
			.fetch_json(&format!(
				"{}/inference-profiles?maxResults=1000&typeEquals=SYSTEM_DEFINED",
				self.control_endpoint
			))
			.await
		{
			Ok(v) => profile_mappings(&v),
			Err(e) => {
				warn!(error = %e, "inference profile fetch failed; continuing without profiles");
				HashMap::new()
			},
		};

		debug!(
			models = models.len(),
			profiles = profiles.len(),
			"model cache repopulated"
		);

		let mut state = self.state.write().await;
		*state = CacheState {
			models,
			client_to_bedrock,
			profiles,
			fetched_at: Some(Instant::now()),
		};
		Ok(())
	}

	async fn fetch_json(&self, url: &str) -> Result<Value, ModelError> {
		let resp = self
			.client
			.get(url, self.timeout)
			.await
			.map_err(|e| match e {
				ClientError::Sign(SignError::InvalidUrl(msg)) => ModelError::InvalidUrl(msg),
				other => ModelError::Transport(other.to_string()),
			})?;
		let status = resp.status();
		if !status.is_success() {
			return Err(ModelError::RequestFailed(status.as_u16()));
		}
		resp
			.json()
			.await
			.map_err(|e| ModelError::Transport(e.to_string()))
	}
}

/// Translate a `ListFoundationModels` response: keep ACTIVE entries, derive
/// the user-facing id and embedded creation date, sort newest first. Also
/// returns the user-facing → raw id mapping.
pub fn translate_foundation_models(resp: &Value) -> (Vec<Model>, HashMap<String, String>) {
	let mut models = Vec::new();
	let mut mapping = HashMap::new();

	for summary in resp
		.get("modelSummaries")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
	{
		let status = summary
			.pointer("/modelLifecycle/status")
			.and_then(Value::as_str)
			.unwrap_or_default();
		if status != "ACTIVE" {
			continue;
		}
		let Some(raw_id) = summary.get("modelId").and_then(Value::as_str) else {
			continue;
		};
		let id = display_model_id(raw_id);
		let owned_by = summary
			.get("providerName")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_lowercase();

		mapping.insert(id.clone(), raw_id.to_string());
		models.push(Model {
			created: embedded_created(raw_id),
			id,
			object: "model".to_string(),
			owned_by,
		});
	}

	models.sort_by(|a, b| b.created.cmp(&a.created));
	(models, mapping)
}

/// Extract `base model id → profile id` from a `ListInferenceProfiles`
/// response. Only ACTIVE Anthropic profiles are considered.
pub fn profile_mappings(resp: &Value) -> HashMap<String, String> {
	let mut out = HashMap::new();
	for profile in resp
		.get("inferenceProfileSummaries")
		.and_then(Value::as_array)
		.into_iter()
		.flatten()
	{
		let status = profile
			.get("status")
			.and_then(Value::as_str)
			.unwrap_or_default();
		let Some(profile_id) = profile.get("inferenceProfileId").and_then(Value::as_str) else {
			continue;
		};
		if status != "ACTIVE" || !profile_id.contains("anthropic.") {
			continue;
		}
		for model in profile
			.get("models")
			.and_then(Value::as_array)
			.into_iter()
			.flatten()
		{
			if let Some(arn) = model.get("modelArn").and_then(Value::as_str)
				&& let Some(base) = arn.rsplit('/').next()
			{
				out.insert(base.to_string(), profile_id.to_string());
			}
		}
	}
	out
}

/// `anthropic.claude-sonnet-4-5-20250929-v1:0` → `claude-sonnet-4-5-20250929`.
pub fn display_model_id(raw: &str) -> String {
	let name = raw.strip_prefix("anthropic.").unwrap_or(raw);
	trim_version_suffix(name).to_string()
}

/// Trim a trailing `-v<digits>:<digits>` version suffix if present.
fn trim_version_suffix(name: &str) -> &str {
	if let Some(idx) = name.rfind("-v") {
		let tail = &name[idx + 2..];
		if let Some((major, minor)) = tail.split_once(':')
			&& !major.is_empty()
			&& !minor.is_empty()
			&& major.bytes().all(|b| b.is_ascii_digit())
			&& minor.bytes().all(|b| b.is_ascii_digit())
		{
			return &name[..idx];
		}
	}
	name
}

/// Unix seconds for the first 8-digit `YYYYMMDD` run embedded in a model id,
/// or 0 when none decodes to a plausible date. Proleptic Gregorian, no
/// timezone involved.
pub fn embedded_created(raw: &str) -> i64 {
	let bytes = raw.as_bytes();
	let mut i = 0;
	while i < bytes.len() {
		if !bytes[i].is_ascii_digit() {
			i += 1;
			continue;
		}
		let start = i;
		while i < bytes.len() && bytes[i].is_ascii_digit() {
			i += 1;
		}
		if i - start < 8 {
			continue;
		}
		let digits = &raw[start..start + 8];
		let year: i32 = match digits[0..4].parse() {
			Ok(y) => y,
			Err(_) => return 0,
		};
		let month: u32 = digits[4..6].parse().unwrap_or(0);
		let day: u32 = digits[6..8].parse().unwrap_or(0);
		if !(1970..=2100).contains(&year) || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
			return 0;
		}
		return chrono::NaiveDate::from_ymd_opt(year, month, day)
			.and_then(|d| d.and_hms_opt(0, 0, 0))
			.map(|dt| dt.and_utc().timestamp())
			.unwrap_or(0);
	}
	0
}
