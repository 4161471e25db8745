//! The validity classifier: one bounded probe per invocation.
//!
//! `check` never returns an error and never leaks a session. Every branch,
//! including navigation failures and cancellation, funnels into exactly one
//! [`ProbeResult`], and the session is closed before that result is handed
//! back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credential::SessionCredential;
use crate::error::{ProbeError, Result};
use crate::profile::{DomSignature, PlatformProfile};
use crate::provider::{BrowserProvider, OpenOptions, ProbeSession, WaitOutcome};
use crate::retry::RetryPolicy;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// The signal that decided a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeReason {
	/// Final URL carried a login keyword or left the success path.
	UrlMismatch,
	/// A login-wall text variant was present in the rendered page.
	LoginTextFound,
	/// The bounded selector window elapsed without a negative signal.
	SelectorTimeoutOk,
	/// The logged-out signature appeared (or, inverted, never appeared).
	SelectorFoundBad,
	/// The probe failed outside its bounded waits.
	Exception,
	/// Unsupported platform or missing credential file.
	NotFound,
}

impl fmt::Display for ProbeReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			ProbeReason::UrlMismatch => "URL_MISMATCH",
			ProbeReason::LoginTextFound => "LOGIN_TEXT_FOUND",
			ProbeReason::SelectorTimeoutOk => "SELECTOR_TIMEOUT_OK",
			ProbeReason::SelectorFoundBad => "SELECTOR_FOUND_BAD",
			ProbeReason::Exception => "EXCEPTION",
			ProbeReason::NotFound => "NOT_FOUND",
		};
		f.write_str(name)
	}
}

/// Structured outcome of one probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
	pub is_valid: bool,

	/// Final resolved URL, empty when the probe failed before navigation.
	pub final_url: String,

	pub reason: ProbeReason,

	/// Diagnostic text for operators; absent for unremarkable outcomes.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub detail: Option<String>,
}

impl ProbeResult {
	pub fn valid(reason: ProbeReason, final_url: impl Into<String>) -> Self {
		Self {
			is_valid: true,
			final_url: final_url.into(),
			reason,
			detail: None,
		}
	}

	pub fn invalid(reason: ProbeReason, final_url: impl Into<String>) -> Self {
		Self {
			is_valid: false,
			final_url: final_url.into(),
			reason,
			detail: None,
		}
	}

	pub fn not_found(detail: impl Into<String>) -> Self {
		Self::invalid(ProbeReason::NotFound, "").with_detail(detail)
	}

	pub fn exception(final_url: impl Into<String>, detail: impl Into<String>) -> Self {
		Self::invalid(ProbeReason::Exception, final_url).with_detail(detail)
	}

	pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
		self.detail = Some(detail.into());
		self
	}
}

/// Runs bounded probes against platform pages.
pub struct ValidityClassifier {
	provider: Arc<dyn BrowserProvider>,
	headless: bool,
	retry: RetryPolicy,
}

impl ValidityClassifier {
	pub fn new(provider: Arc<dyn BrowserProvider>) -> Self {
		Self {
			provider,
			headless: true,
			retry: RetryPolicy::default(),
		}
	}

	pub fn with_headless(mut self, headless: bool) -> Self {
		self.headless = headless;
		self
	}

	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;
		self
	}

	/// One bounded probe of `credential` against `profile`.
	///
	/// Always returns a [`ProbeResult`]; failures map to
	/// [`ProbeReason::Exception`]. The session opened for the probe is closed
	/// on every path, context first, browser second. Cancelling `cancel`
	/// aborts the probe promptly and still runs the cleanup.
	pub async fn check(
		&self,
		profile: &PlatformProfile,
		credential: &SessionCredential,
		cancel: &CancellationToken,
	) -> ProbeResult {
		let started = Instant::now();
		let options = OpenOptions::new()
			.with_credential(credential)
			.with_headless(self.headless);

		let mut session = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				return ProbeResult::exception("", ProbeError::Cancelled.chain());
			}
			opened = self.provider.open(options) => match opened {
				Ok(session) => session,
				Err(err) => {
					warn!(
						target: "sessionprobe::classifier",
						platform = %profile.platform,
						error = %err.chain(),
						"could not open probe session"
					);
					return ProbeResult::exception("", err.chain());
				}
			},
		};

		let outcome = tokio::select! {
			biased;
			_ = cancel.cancelled() => Err(ProbeError::Cancelled),
			res = self.probe(session.as_mut(), profile) => res,
		};

		let result = match outcome {
			Ok(result) => result,
			Err(err) => {
				warn!(
					target: "sessionprobe::classifier",
					platform = %profile.platform,
					error = %err.chain(),
					"probe aborted"
				);
				ProbeResult::exception("", err.chain())
			}
		};

		if let Err(err) = session.close().await {
			warn!(
				target: "sessionprobe::classifier",
				platform = %profile.platform,
				error = %err.chain(),
				"session close failed"
			);
		}

		info!(
			target: "sessionprobe::classifier",
			platform = %profile.platform,
			valid = result.is_valid,
			reason = %result.reason,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"probe finished"
		);
		result
	}

	async fn probe(
		&self,
		session: &mut dyn ProbeSession,
		profile: &PlatformProfile,
	) -> Result<ProbeResult> {
		self.navigate_with_retry(session, &profile.target_url).await?;

		// An unsettled network is common on these dashboards; classify with
		// whatever rendered.
		if !session.settle(profile.network_idle_timeout()).await?.is_settled() {
			debug!(
				target: "sessionprobe::classifier",
				platform = %profile.platform,
				"network never went idle within the window"
			);
		}

		let final_url = session.current_url().await?;

		if profile.url_hits_login_keyword(&final_url) {
			return Ok(ProbeResult::invalid(ProbeReason::UrlMismatch, final_url)
				.with_detail("final URL contains a login indicator"));
		}
		if !profile.url_matches_success(&final_url) {
			return Ok(ProbeResult::invalid(ProbeReason::UrlMismatch, final_url)
				.with_detail(format!("final URL left '{}'", profile.success_path)));
		}

		for text in &profile.login_wall_texts {
			if session.is_visible(&DomSignature::text(text.clone())).await? {
				return Ok(ProbeResult::invalid(ProbeReason::LoginTextFound, final_url)
					.with_detail(format!("login wall text present: {text}")));
			}
		}

		let Some(signature) = &profile.logged_out_selector else {
			// Nothing left to disprove the session with.
			return Ok(ProbeResult::valid(ProbeReason::SelectorTimeoutOk, final_url));
		};

		let appeared = self
			.wait_for_signature(session, signature, profile.selector_timeout())
			.await?;

		Ok(match (appeared, profile.inverted_wait) {
			(WaitOutcome::TimedOut, false) => {
				ProbeResult::valid(ProbeReason::SelectorTimeoutOk, final_url)
			}
			(WaitOutcome::Settled, false) => {
				ProbeResult::invalid(ProbeReason::SelectorFoundBad, final_url)
					.with_detail(format!("logged-out signature present: {signature}"))
			}
			(WaitOutcome::Settled, true) => {
				ProbeResult::valid(ProbeReason::SelectorTimeoutOk, final_url)
			}
			(WaitOutcome::TimedOut, true) => {
				ProbeResult::invalid(ProbeReason::SelectorFoundBad, final_url)
					.with_detail(format!("logged-in signature never appeared: {signature}"))
			}
		})
	}

	async fn navigate_with_retry(
		&self,
		session: &mut dyn ProbeSession,
		url: &str,
	) -> Result<()> {
		let mut attempt = 0;
		loop {
			match session.navigate(url).await {
				Ok(()) => return Ok(()),
				Err(err) if err.is_navigation() && attempt < self.retry.max_retries => {
					let delay = self.retry.delay_for(attempt);
					warn!(
						target: "sessionprobe::classifier",
						url,
						attempt,
						delay_ms = delay.as_millis() as u64,
						error = %err.chain(),
						"navigation failed; retrying"
					);
					sleep(delay).await;
					attempt += 1;
				}
				Err(err) => return Err(err),
			}
		}
	}

	/// Polls for `signature` until it appears or `timeout` elapses.
	async fn wait_for_signature(
		&self,
		session: &mut dyn ProbeSession,
		signature: &DomSignature,
		timeout: Duration,
	) -> Result<WaitOutcome> {
		let deadline = Instant::now() + timeout;
		loop {
			if session.is_visible(signature).await? {
				return Ok(WaitOutcome::Settled);
			}
			if Instant::now() >= deadline {
				return Ok(WaitOutcome::TimedOut);
			}
			sleep(SELECTOR_POLL_INTERVAL).await;
		}
	}
}
