//! AWS Signature Version 4, implemented with hmac/sha2 — no AWS SDK.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use itertools::Itertools;
use sha2::{Digest, Sha256};
use url::Url;

use super::Credentials;

#[derive(Debug, thiserror::Error)]
pub enum SignError {
	#[error("invalid url: {0}")]
	InvalidUrl(String),
}

/// Signs requests for one AWS service in one region. Credentials are fixed
/// at construction; refresh means building a new signer.
#[derive(Clone, Debug)]
pub struct Signer {
	credentials: Credentials,
	region: String,
	service: String,
}

impl Signer {
	pub fn new(credentials: Credentials, region: impl Into<String>, service: impl Into<String>) -> Self {
		Self {
			credentials,
			region: region.into(),
			service: service.into(),
		}
	}

	/// Compute the headers that authenticate `method url` with the given
	/// body: `authorization`, `x-amz-date`, `x-amz-content-sha256`, and
	/// `x-amz-security-token` for temporary credentials. `headers` lists the
	/// request headers that should be covered by the signature.
	pub fn sign(
		&self,
		method: &str,
		url: &str,
		headers: &[(&str, &str)],
		body: &[u8],
	) -> Result<Vec<(String, String)>, SignError> {
		self.sign_at(method, url, headers, body, Utc::now())
	}

	fn sign_at(
		&self,
		method: &str,
		url: &str,
		headers: &[(&str, &str)],
		body: &[u8],
		now: DateTime<Utc>,
	) -> Result<Vec<(String, String)>, SignError> {
		let url = Url::parse(url).map_err(|e| SignError::InvalidUrl(e.to_string()))?;
		let host = match (url.host_str(), url.port()) {
			(Some(h), Some(p)) => format!("{h}:{p}"),
			(Some(h), None) => h.to_string(),
			(None, _) => return Err(SignError::InvalidUrl("url has no host".to_string())),
		};

		let date_stamp = now.format("%Y%m%d").to_string();
		let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
		let payload_hash = sha256_hex(body);

		let mut signed: Vec<(String, String)> = headers
			.iter()
			.map(|(k, v)| (k.to_ascii_lowercase(), v.trim().to_string()))
			.collect();
		signed.push(("host".to_string(), host));
		signed.push(("x-amz-date".to_string(), amz_date.clone()));
		signed.push(("x-amz-content-sha256".to_string(), payload_hash.clone()));
		if let Some(token) = &self.credentials.session_token {
			signed.push(("x-amz-security-token".to_string(), token.clone()));
		}
		signed.sort_by(|a, b| a.0.cmp(&b.0));

		let canonical_headers: String = signed
			.iter()
			.map(|(k, v)| format!("{k}:{v}\n"))
			.collect();
		let signed_header_names = signed
			.iter()
			.map(|(k, _)| k.as_str())
			.collect::<Vec<_>>()
			.join(";");

		let canonical_request = format!(
			"{method}\n{}\n{}\n{canonical_headers}\n{signed_header_names}\n{payload_hash}",
			url.path(),
			canonical_query(&url),
		);

		let credential_scope = format!(
			"{date_stamp}/{}/{}/aws4_request",
			self.region, self.service
		);
		let string_to_sign = format!(
			"AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
			sha256_hex(canonical_request.as_bytes())
		);

		let signing_key = derive_signing_key(
			&self.credentials.secret_access_key,
			&date_stamp,
			&self.region,
			&self.service,
		);
		let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

		let authorization = format!(
			"AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders={signed_header_names}, Signature={signature}",
			self.credentials.access_key_id
		);

		let mut out = vec![
			("authorization".to_string(), authorization),
			("x-amz-date".to_string(), amz_date),
			("x-amz-content-sha256".to_string(), payload_hash),
		];
		if let Some(token) = &self.credentials.session_token {
			out.push(("x-amz-security-token".to_string(), token.clone()));
		}
		Ok(out)
	}
}

/// Query pairs sorted by key, strictly URI-encoded.
fn canonical_query(url: &Url) -> String {
	let mut pairs: Vec<(String, String)> = url
		.query_pairs()
		.map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
		.collect();
	pairs.sort();
	pairs.iter().map(|(k, v)| format!("{k}={v}")).join("&")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
pub fn uri_encode(input: &str) -> String {
	let mut out = String::with_capacity(input.len());
	for b in input.bytes() {
		match b {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
				out.push(b as char);
			},
			_ => out.push_str(&format!("%{b:02X}")),
		}
	}
	out
}

/// Like [`uri_encode`] but keeps path separators, for request paths that
/// embed model ids (`:` in version suffixes must be `%3A` on the wire so the
/// signed form and the sent form agree).
pub fn uri_encode_path(path: &str) -> String {
	path
		.split('/')
		.map(uri_encode)
		.collect::<Vec<_>>()
		.join("/")
}

fn sha256_hex(data: &[u8]) -> String {
	let mut hasher = Sha256::new();
	hasher.update(data);
	hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
	let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("hmac accepts any key length");
	mac.update(data);
	mac.finalize().into_bytes().to_vec()
}

fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
	let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
	let k_region = hmac_sha256(&k_date, region.as_bytes());
	let k_service = hmac_sha256(&k_region, service.as_bytes());
	hmac_sha256(&k_service, b"aws4_request")
}
