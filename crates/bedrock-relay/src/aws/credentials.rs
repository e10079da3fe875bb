//! AWS credential resolution: environment first, then EC2 IMDSv2.

use serde_json::Value;

#[derive(Clone, Debug)]
pub struct Credentials {
	pub access_key_id: String,
	pub secret_access_key: String,
	/// Present for temporary (STS / instance-role) credentials.
	pub session_token: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
	#[error("environment variable {0} is not set")]
	MissingEnv(&'static str),
	#[error("instance metadata lookup failed: {0}")]
	Imds(String),
}

const IMDS_BASE: &str = "http://169.254.169.254/latest";

impl Credentials {
	pub fn from_env() -> Result<Self, CredentialsError> {
		Ok(Self {
			access_key_id: env_required("AWS_ACCESS_KEY_ID")?,
			secret_access_key: env_required("AWS_SECRET_ACCESS_KEY")?,
			session_token: env_optional("AWS_SESSION_TOKEN"),
		})
	}

	/// Fetch instance-role credentials from the EC2 metadata service.
	pub async fn from_imds() -> Result<Self, CredentialsError> {
		let client = reqwest::Client::builder()
			.timeout(std::time::Duration::from_secs(3))
			.build()
			.map_err(|e| CredentialsError::Imds(e.to_string()))?;

		let token = client
			.put(format!("{IMDS_BASE}/api/token"))
			.header("X-aws-ec2-metadata-token-ttl-seconds", "21600")
			.send()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?
			.text()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?;

		let role = client
			.get(format!("{IMDS_BASE}/meta-data/iam/security-credentials/"))
			.header("X-aws-ec2-metadata-token", &token)
			.send()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?
			.text()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?;
		let role = role.trim();
		if role.is_empty() {
			return Err(CredentialsError::Imds(
				"no IAM role attached to this instance".to_string(),
			));
		}

		let creds: Value = client
			.get(format!(
				"{IMDS_BASE}/meta-data/iam/security-credentials/{role}"
			))
			.header("X-aws-ec2-metadata-token", &token)
			.send()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?
			.json()
			.await
			.map_err(|e| CredentialsError::Imds(e.to_string()))?;

		let field = |name: &str| {
			creds
				.get(name)
				.and_then(Value::as_str)
				.map(str::to_string)
				.ok_or_else(|| CredentialsError::Imds(format!("missing {name} in IMDS response")))
		};

		Ok(Self {
			access_key_id: field("AccessKeyId")?,
			secret_access_key: field("SecretAccessKey")?,
			session_token: field("Token").ok(),
		})
	}

	/// Environment first; fall back to IMDS so instance roles work without
	/// any configuration.
	pub async fn resolve() -> Result<Self, CredentialsError> {
		match Self::from_env() {
			Ok(creds) => Ok(creds),
			Err(_) => Self::from_imds().await,
		}
	}
}

fn env_required(name: &'static str) -> Result<String, CredentialsError> {
	env_optional(name).ok_or(CredentialsError::MissingEnv(name))
}

fn env_optional(name: &str) -> Option<String> {
	std::env::var(name)
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}
