//! Interactive login detection.
//!
//! A human is completing a login in a visible browser; this loop watches the
//! page until something proves they finished. Proof is a positive signal
//! only: a URL that moved off the auth surface, or a logged-in DOM marker.
//! Elapsed time alone never counts, and a still-visible login-wall marker
//! vetoes everything else for that tick.

use std::time::Duration;

use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::profile::LoginWaitPolicy;
use crate::provider::ProbeSession;

/// URL substrings that mark an auth page, across the scripts the supported
/// platforms use.
pub const LOGIN_URL_KEYWORDS: [&str; 6] =
	["login", "signin", "auth", "passport", "登录", "登陆"];

const TICK_ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub(crate) fn url_looks_like_login(url: &str) -> bool {
	let lower = url.to_lowercase();
	LOGIN_URL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Which signal(s) proved the login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedVia {
	None,
	UrlChange,
	DomElement,
	Both,
}

/// Terminal state of one wait.
#[derive(Debug, Clone)]
pub struct LoginWaitState {
	pub initial_url: String,
	pub elapsed: Duration,
	pub detected_via: DetectedVia,
}

impl LoginWaitState {
	pub fn is_detected(&self) -> bool {
		self.detected_via != DetectedVia::None
	}
}

/// Polls a visible page until a human finishes logging in.
pub struct LoginWaiter {
	timeout: Duration,
	poll_interval: Duration,
	hint_interval: Duration,
	on_hint: Option<Box<dyn Fn(Duration) + Send + Sync>>,
}

impl LoginWaiter {
	pub fn new(timeout: Duration) -> Self {
		Self {
			timeout,
			poll_interval: Duration::from_secs(2),
			hint_interval: Duration::from_secs(10),
			on_hint: None,
		}
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn with_hint_interval(mut self, interval: Duration) -> Self {
		self.hint_interval = interval;
		self
	}

	/// Callback fired alongside the periodic operator hint.
	pub fn with_hint(mut self, hint: impl Fn(Duration) + Send + Sync + 'static) -> Self {
		self.on_hint = Some(Box::new(hint));
		self
	}

	/// Watches `session` until login is detected, `timeout` elapses, or
	/// `cancel` fires. Errors inside a tick are logged and swallowed; the
	/// loop only ends on one of those three conditions.
	pub async fn wait(
		&self,
		session: &mut dyn ProbeSession,
		initial_url: &str,
		policy: &LoginWaitPolicy,
		cancel: &CancellationToken,
	) -> LoginWaitState {
		let started = Instant::now();
		let mut last_hint = Duration::ZERO;

		info!(
			target: "sessionprobe::login_wait",
			initial_url,
			timeout_s = self.timeout.as_secs(),
			"waiting for interactive login"
		);

		loop {
			tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					info!(target: "sessionprobe::login_wait", "login wait cancelled");
					return self.terminal(initial_url, started, DetectedVia::None);
				}
				_ = sleep(self.poll_interval) => {}
			}

			let elapsed = started.elapsed();
			if elapsed >= self.timeout {
				info!(
					target: "sessionprobe::login_wait",
					elapsed_s = elapsed.as_secs(),
					"login wait timed out"
				);
				return self.terminal(initial_url, started, DetectedVia::None);
			}

			match self.tick(session, initial_url, policy).await {
				Ok(DetectedVia::None) => {}
				Ok(via) => {
					info!(
						target: "sessionprobe::login_wait",
						detected_via = ?via,
						elapsed_s = elapsed.as_secs(),
						"login detected"
					);
					return self.terminal(initial_url, started, via);
				}
				Err(err) => {
					warn!(
						target: "sessionprobe::login_wait",
						error = %err.chain(),
						"ignoring error during login wait tick"
					);
					sleep(TICK_ERROR_BACKOFF).await;
				}
			}

			if elapsed.saturating_sub(last_hint) >= self.hint_interval {
				if let Some(hint) = &self.on_hint {
					hint(elapsed);
				}
				info!(
					target: "sessionprobe::login_wait",
					elapsed_s = elapsed.as_secs(),
					"still waiting for login to complete"
				);
				last_hint = elapsed;
			}
		}
	}

	fn terminal(&self, initial_url: &str, started: Instant, via: DetectedVia) -> LoginWaitState {
		LoginWaitState {
			initial_url: initial_url.to_string(),
			elapsed: started.elapsed(),
			detected_via: via,
		}
	}

	async fn tick(
		&self,
		session: &mut dyn ProbeSession,
		initial_url: &str,
		policy: &LoginWaitPolicy,
	) -> Result<DetectedVia> {
		let current = session.current_url().await?;
		let url_signal = current != initial_url && !url_looks_like_login(&current);

		// A visible login-wall marker vetoes the whole tick, URL included:
		// some platforms rewrite the URL before the wall is actually gone.
		for signature in &policy.negative {
			if session.is_visible(signature).await? {
				debug!(
					target: "sessionprobe::login_wait",
					%signature,
					"login wall still present"
				);
				return Ok(DetectedVia::None);
			}
		}

		let mut element_signal = false;
		for signature in &policy.positive {
			if session.is_visible(signature).await? {
				debug!(
					target: "sessionprobe::login_wait",
					%signature,
					"logged-in indicator present"
				);
				element_signal = true;
				break;
			}
		}

		Ok(match (url_signal, element_signal) {
			(true, true) => DetectedVia::Both,
			(true, false) => DetectedVia::UrlChange,
			(false, true) => DetectedVia::DomElement,
			(false, false) => DetectedVia::None,
		})
	}
}
