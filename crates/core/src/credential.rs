//! Stored session blobs.
//!
//! A [`SessionCredential`] is the serialized storage state of a previously
//! authenticated browser context: cookies plus per-origin localStorage. The
//! on-disk format uses the camelCase field names browser tooling emits
//! (`cookies`, `origins`, `localStorage`, `sameSite`, ...), so files captured
//! by other automation stacks load unchanged. The classifier only ever reads
//! these blobs; the interactive capture flow is the only writer.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// SameSite cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSite {
	#[serde(rename = "None")]
	None,
	#[default]
	#[serde(rename = "Lax")]
	Lax,
	#[serde(rename = "Strict")]
	Strict,
}

/// One browser cookie, as persisted in a credential file.
///
/// `expires` is a Unix timestamp in seconds; `-1` marks a session cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
	pub name: String,

	pub value: String,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub path: Option<String>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub expires: Option<f64>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub http_only: Option<bool>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub secure: Option<bool>,

	#[serde(skip_serializing_if = "Option::is_none")]
	pub same_site: Option<SameSite>,
}

impl Cookie {
	pub fn new(
		name: impl Into<String>,
		value: impl Into<String>,
		domain: impl Into<String>,
	) -> Self {
		Self {
			name: name.into(),
			value: value.into(),
			domain: Some(domain.into()),
			path: None,
			expires: None,
			http_only: None,
			secure: None,
			same_site: None,
		}
	}

	pub fn with_path(mut self, path: impl Into<String>) -> Self {
		self.path = Some(path.into());
		self
	}

	/// Unix seconds; -1 for a session cookie.
	pub fn with_expires(mut self, expires: f64) -> Self {
		self.expires = Some(expires);
		self
	}

	pub fn with_http_only(mut self, http_only: bool) -> Self {
		self.http_only = Some(http_only);
		self
	}

	pub fn with_secure(mut self, secure: bool) -> Self {
		self.secure = Some(secure);
		self
	}

	pub fn with_same_site(mut self, same_site: SameSite) -> Self {
		self.same_site = Some(same_site);
		self
	}

	/// True if the cookie carries an expiry in the past.
	///
	/// Session cookies (`expires` absent or negative) never report expired;
	/// whether they still authenticate is exactly what a probe determines.
	pub fn is_expired(&self, now_unix: f64) -> bool {
		match self.expires {
			Some(at) if at > 0.0 => at < now_unix,
			_ => false,
		}
	}
}

/// A localStorage entry within one origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageEntry {
	pub name: String,
	pub value: String,
}

/// localStorage contents for a single origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
	/// Origin URL, e.g. `https://creator.douyin.com`.
	pub origin: String,

	pub local_storage: Vec<LocalStorageEntry>,
}

/// Persisted storage state for one (platform, account) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionCredential {
	pub cookies: Vec<Cookie>,

	#[serde(default)]
	pub origins: Vec<OriginState>,
}

impl SessionCredential {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_cookies(cookies: Vec<Cookie>) -> Self {
		Self {
			cookies,
			origins: Vec::new(),
		}
	}

	/// Loads a credential from a JSON file.
	///
	/// A missing file maps to [`ProbeError::CredentialNotFound`] and malformed
	/// JSON to [`ProbeError::CredentialFormat`], so the dispatcher can turn
	/// both into a `NOT_FOUND` result without opening a browser.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|err| {
			if err.kind() == std::io::ErrorKind::NotFound {
				ProbeError::CredentialNotFound {
					path: path.to_path_buf(),
				}
			} else {
				ProbeError::Io(err)
			}
		})?;
		serde_json::from_str(&content).map_err(|source| ProbeError::CredentialFormat {
			path: path.to_path_buf(),
			source,
		})
	}

	pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
		let content = serde_json::to_string_pretty(self)?;
		std::fs::write(path, content)?;
		Ok(())
	}

	pub fn cookie_count(&self) -> usize {
		self.cookies.len()
	}

	pub fn origin_count(&self) -> usize {
		self.origins.len()
	}

	/// Distinct cookie domains, for human-facing summaries.
	pub fn domains(&self) -> Vec<&str> {
		let mut domains: Vec<&str> = self
			.cookies
			.iter()
			.filter_map(|c| c.domain.as_deref())
			.collect();
		domains.sort_unstable();
		domains.dedup();
		domains
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const FIXTURE: &str = r#"{
		"cookies": [
			{
				"name": "sessionid",
				"value": "abc123",
				"domain": ".douyin.com",
				"path": "/",
				"expires": 1999999999.5,
				"httpOnly": true,
				"secure": true,
				"sameSite": "Lax"
			}
		],
		"origins": [
			{
				"origin": "https://creator.douyin.com",
				"localStorage": [{ "name": "user_id", "value": "42" }]
			}
		]
	}"#;

	#[test]
	fn parses_storage_state_json() {
		let cred: SessionCredential = serde_json::from_str(FIXTURE).unwrap();
		assert_eq!(cred.cookie_count(), 1);
		assert_eq!(cred.origin_count(), 1);
		assert_eq!(cred.cookies[0].name, "sessionid");
		assert_eq!(cred.cookies[0].http_only, Some(true));
		assert_eq!(cred.cookies[0].same_site, Some(SameSite::Lax));
		assert_eq!(cred.origins[0].local_storage[0].value, "42");
	}

	#[test]
	fn serializes_camel_case() {
		let cookie = Cookie::new("auth", "tok", ".kuaishou.com")
			.with_http_only(true)
			.with_same_site(SameSite::Strict);
		let json = serde_json::to_string(&cookie).unwrap();
		assert!(json.contains("\"httpOnly\":true"));
		assert!(json.contains("\"sameSite\":\"Strict\""));
		assert!(!json.contains("\"expires\""));
	}

	#[test]
	fn origins_default_when_absent() {
		let cred: SessionCredential =
			serde_json::from_str(r#"{ "cookies": [] }"#).unwrap();
		assert_eq!(cred.origin_count(), 0);
	}

	#[test]
	fn file_roundtrip() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("cred.json");

		let cred = SessionCredential::with_cookies(vec![
			Cookie::new("a", "1", ".weixin.qq.com").with_secure(true),
		]);
		cred.to_file(&path).unwrap();

		let restored = SessionCredential::from_file(&path).unwrap();
		assert_eq!(restored.cookie_count(), 1);
		assert_eq!(restored.cookies[0].secure, Some(true));
	}

	#[test]
	fn missing_file_is_credential_not_found() {
		let err = SessionCredential::from_file("/definitely/not/here.json").unwrap_err();
		assert!(err.is_credential());
		assert!(matches!(err, ProbeError::CredentialNotFound { .. }));
	}

	#[test]
	fn malformed_json_is_credential_format() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bad.json");
		std::fs::write(&path, "{ not json").unwrap();

		let err = SessionCredential::from_file(&path).unwrap_err();
		assert!(err.is_credential());
		assert!(matches!(err, ProbeError::CredentialFormat { .. }));
	}

	#[test]
	fn expiry_semantics() {
		let now = 1_700_000_000.0;
		assert!(Cookie::new("a", "1", "x").with_expires(now - 10.0).is_expired(now));
		assert!(!Cookie::new("a", "1", "x").with_expires(now + 10.0).is_expired(now));
		assert!(!Cookie::new("a", "1", "x").with_expires(-1.0).is_expired(now));
		assert!(!Cookie::new("a", "1", "x").is_expired(now));
	}

	#[test]
	fn domain_summary_dedupes() {
		let cred = SessionCredential::with_cookies(vec![
			Cookie::new("a", "1", ".douyin.com"),
			Cookie::new("b", "2", ".douyin.com"),
			Cookie::new("c", "3", "creator.douyin.com"),
		]);
		assert_eq!(cred.domains(), vec![".douyin.com", "creator.douyin.com"]);
	}
}
