//! Caller-facing dispatch.
//!
//! Normalizes heterogeneous platform keys, loads credential files, caps how
//! many browsers run at once, and hands the rest to the classifier. All
//! configuration arrives at construction; a [`Dispatcher`] carries no global
//! state and touches no path it was not given.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classifier::{ProbeResult, ValidityClassifier};
use crate::credential::SessionCredential;
use crate::platform::Platform;
use crate::profile::{PlatformProfile, ProfileTable};
use crate::provider::BrowserProvider;
use crate::retry::RetryPolicy;

/// Construction-time configuration for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
	/// Cap on simultaneously open browser processes. Checks beyond the cap
	/// queue for a permit; queueing does not consume any probe timeout.
	pub max_concurrent_checks: usize,

	pub headless: bool,

	pub retry: RetryPolicy,

	pub profiles: ProfileTable,
}

impl Default for DispatcherConfig {
	fn default() -> Self {
		Self {
			max_concurrent_checks: 2,
			headless: true,
			retry: RetryPolicy::default(),
			profiles: ProfileTable::builtin(),
		}
	}
}

/// Entry point for callers: `resolve` + `check` over the profile table.
pub struct Dispatcher {
	profiles: ProfileTable,
	classifier: ValidityClassifier,
	limiter: Semaphore,
}

impl Dispatcher {
	pub fn new(config: DispatcherConfig, provider: Arc<dyn BrowserProvider>) -> Self {
		let classifier = ValidityClassifier::new(provider)
			.with_headless(config.headless)
			.with_retry(config.retry);
		Self {
			profiles: config.profiles,
			classifier,
			limiter: Semaphore::new(config.max_concurrent_checks.max(1)),
		}
	}

	/// Profile lookup for a caller-supplied key (name, alias, or integer
	/// code). `None` means unsupported; nothing here panics on bad input.
	pub fn resolve(&self, key: &str) -> Option<&PlatformProfile> {
		Platform::resolve(key).and_then(|p| self.profiles.get(p))
	}

	pub fn profiles(&self) -> &ProfileTable {
		&self.profiles
	}

	/// One capped probe of `credential` against the platform behind `key`.
	///
	/// Unsupported keys yield `NOT_FOUND` without opening a browser.
	pub async fn check(
		&self,
		key: &str,
		credential: &SessionCredential,
		cancel: &CancellationToken,
	) -> ProbeResult {
		let Some(profile) = self.resolve(key) else {
			debug!(target: "sessionprobe::dispatch", key, "unsupported platform key");
			return ProbeResult::not_found(format!("unsupported platform: {key}"));
		};

		let _permit = match self.limiter.acquire().await {
			Ok(permit) => permit,
			Err(_) => return ProbeResult::exception("", "probe limiter closed"),
		};
		self.classifier.check(profile, credential, cancel).await
	}

	/// Like [`check`](Self::check), loading the credential from `path`.
	///
	/// A missing or unreadable file yields `NOT_FOUND` without opening a
	/// browser.
	pub async fn check_file(
		&self,
		key: &str,
		path: &Path,
		cancel: &CancellationToken,
	) -> ProbeResult {
		if self.resolve(key).is_none() {
			debug!(target: "sessionprobe::dispatch", key, "unsupported platform key");
			return ProbeResult::not_found(format!("unsupported platform: {key}"));
		}

		let credential = match SessionCredential::from_file(path) {
			Ok(credential) => credential,
			Err(err) => {
				warn!(
					target: "sessionprobe::dispatch",
					key,
					path = %path.display(),
					error = %err.chain(),
					"credential unavailable"
				);
				return ProbeResult::not_found(err.chain());
			}
		};

		self.check(key, &credential, cancel).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::ScriptedBrowser;

	fn dispatcher() -> Dispatcher {
		Dispatcher::new(DispatcherConfig::default(), ScriptedBrowser::new())
	}

	#[test]
	fn config_defaults() {
		let config = DispatcherConfig::default();
		assert_eq!(config.max_concurrent_checks, 2);
		assert!(config.headless);
		assert_eq!(config.profiles.len(), Platform::ALL.len());
	}

	#[test]
	fn resolve_accepts_names_aliases_and_codes() {
		let d = dispatcher();
		assert_eq!(d.resolve("kuaishou").unwrap().platform, Platform::Kuaishou);
		assert_eq!(d.resolve("ks").unwrap().platform, Platform::Kuaishou);
		assert_eq!(d.resolve("4").unwrap().platform, Platform::Kuaishou);
	}

	#[test]
	fn resolve_unknown_is_none() {
		let d = dispatcher();
		assert!(d.resolve("myspace").is_none());
		assert!(d.resolve("0").is_none());
	}
}
