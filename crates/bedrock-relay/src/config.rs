//! Layered configuration: CLI flags > environment > optional JSON file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
	pub host: String,
	pub port: u16,
	pub region: String,
	/// Static northbound API key. Startup refuses to proceed without one.
	pub api_key: Option<String>,
	pub model_cache_ttl_secs: u64,
	pub request_timeout_secs: u64,
	pub models_timeout_secs: u64,
	pub log_level: String,
	pub max_retries: u32,
	/// Override the Bedrock runtime endpoint (primarily for tests).
	pub runtime_endpoint: Option<String>,
	/// Override the Bedrock control-plane endpoint (primarily for tests).
	pub control_endpoint: Option<String>,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			host: "127.0.0.1".to_string(),
			port: 8080,
			region: "us-east-1".to_string(),
			api_key: None,
			model_cache_ttl_secs: 300,
			request_timeout_secs: 600,
			models_timeout_secs: 30,
			log_level: "info".to_string(),
			max_retries: 2,
			runtime_endpoint: None,
			control_endpoint: None,
		}
	}
}

/// CLI-provided values; `None` means not given.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
	pub file: Option<PathBuf>,
	pub host: Option<String>,
	pub port: Option<u16>,
	pub region: Option<String>,
	pub api_key: Option<String>,
	pub model_cache_ttl_secs: Option<u64>,
	pub request_timeout_secs: Option<u64>,
	pub models_timeout_secs: Option<u64>,
	pub log_level: Option<String>,
	pub max_retries: Option<u32>,
}

impl Config {
	pub fn load(overrides: &Overrides) -> anyhow::Result<Self> {
		let mut config = match &overrides.file {
			Some(path) => {
				let contents = std::fs::read_to_string(path)
					.map_err(|e| anyhow::anyhow!("cannot read config file {}: {e}", path.display()))?;
				serde_json::from_str(&contents)
					.map_err(|e| anyhow::anyhow!("cannot parse config file {}: {e}", path.display()))?
			},
			None => Config::default(),
		};
		config.apply_env_from(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
		config.apply(overrides);
		config.validate()?;
		Ok(config)
	}

	fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
		if let Some(v) = get("RELAY_HOST") {
			self.host = v;
		}
		if let Some(v) = get("RELAY_PORT").and_then(|v| v.parse().ok()) {
			self.port = v;
		}
		if let Some(v) = get("AWS_REGION").or_else(|| get("AWS_DEFAULT_REGION")) {
			self.region = v;
		}
		if let Some(v) = get("RELAY_API_KEY") {
			self.api_key = Some(v);
		}
		if let Some(v) = get("RELAY_MODEL_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
			self.model_cache_ttl_secs = v;
		}
		if let Some(v) = get("RELAY_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
			self.request_timeout_secs = v;
		}
		if let Some(v) = get("RELAY_MODELS_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
			self.models_timeout_secs = v;
		}
		if let Some(v) = get("RELAY_LOG_LEVEL") {
			self.log_level = v;
		}
		if let Some(v) = get("RELAY_MAX_RETRIES").and_then(|v| v.parse().ok()) {
			self.max_retries = v;
		}
		if let Some(v) = get("RELAY_RUNTIME_ENDPOINT") {
			self.runtime_endpoint = Some(v);
		}
		if let Some(v) = get("RELAY_CONTROL_ENDPOINT") {
			self.control_endpoint = Some(v);
		}
	}

	fn apply(&mut self, o: &Overrides) {
		if let Some(v) = &o.host {
			self.host = v.clone();
		}
		if let Some(v) = o.port {
			self.port = v;
		}
		if let Some(v) = &o.region {
			self.region = v.clone();
		}
		if let Some(v) = &o.api_key {
			self.api_key = Some(v.clone());
		}
		if let Some(v) = o.model_cache_ttl_secs {
			self.model_cache_ttl_secs = v;
		}
		if let Some(v) = o.request_timeout_secs {
			self.request_timeout_secs = v;
		}
		if let Some(v) = o.models_timeout_secs {
			self.models_timeout_secs = v;
		}
		if let Some(v) = &o.log_level {
			self.log_level = v.clone();
		}
		if let Some(v) = o.max_retries {
			self.max_retries = v;
		}
	}

	fn validate(&self) -> anyhow::Result<()> {
		if self.api_key.as_deref().unwrap_or_default().is_empty() {
			anyhow::bail!("no API key configured; set RELAY_API_KEY or --api-key");
		}
		Ok(())
	}

	pub fn runtime_endpoint(&self) -> String {
		self
			.runtime_endpoint
			.clone()
			.unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
	}

	pub fn control_endpoint(&self) -> String {
		self
			.control_endpoint
			.clone()
			.unwrap_or_else(|| format!("https://bedrock.{}.amazonaws.com", self.region))
	}

	pub fn model_cache_ttl(&self) -> Duration {
		Duration::from_secs(self.model_cache_ttl_secs)
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn models_timeout(&self) -> Duration {
		Duration::from_secs(self.models_timeout_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	#[test]
	fn defaults_match_documented_table() {
		let c = Config::default();
		assert_eq!(c.host, "127.0.0.1");
		assert_eq!(c.port, 8080);
		assert_eq!(c.region, "us-east-1");
		assert_eq!(c.model_cache_ttl_secs, 300);
		assert_eq!(c.request_timeout_secs, 600);
		assert_eq!(c.models_timeout_secs, 30);
		assert_eq!(c.log_level, "info");
		assert_eq!(
			c.runtime_endpoint(),
			"https://bedrock-runtime.us-east-1.amazonaws.com"
		);
		assert_eq!(c.control_endpoint(), "https://bedrock.us-east-1.amazonaws.com");
	}

	#[test]
	fn env_overrides_file_and_cli_overrides_env() {
		let mut config: Config =
			serde_json::from_str(r#"{"port": 9000, "region": "eu-west-1", "api_key": "from-file"}"#)
				.unwrap();
		assert_eq!(config.port, 9000);

		let env: HashMap<&str, &str> =
			HashMap::from([("RELAY_PORT", "9100"), ("RELAY_API_KEY", "from-env")]);
		config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));
		assert_eq!(config.port, 9100);
		assert_eq!(config.api_key.as_deref(), Some("from-env"));
		// untouched by env: file value stays
		assert_eq!(config.region, "eu-west-1");

		config.apply(&Overrides {
			port: Some(9200),
			..Default::default()
		});
		assert_eq!(config.port, 9200);
	}

	#[test]
	fn missing_api_key_fails_validation() {
		let config = Config::default();
		assert!(config.validate().is_err());
	}
}
