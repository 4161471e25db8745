//! Deterministic provider for tests.
//!
//! [`ScriptedBrowser`] hands out sessions that replay a [`SessionScript`]:
//! a URL timeline, per-signature visibility, settle behavior, and injected
//! failures at any step. It also counts opens, closes, and navigations, which
//! is what the leak and concurrency-cap suites assert against. Nothing in
//! here talks to a real browser.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::credential::SessionCredential;
use crate::error::{ProbeError, Result};
use crate::profile::DomSignature;
use crate::provider::{BrowserProvider, OpenOptions, ProbeSession, WaitOutcome};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone)]
enum UrlStep {
	Url(String),
	Error(String),
}

/// Replayable behavior for one scripted session.
///
/// Queues advance one step per call; the last URL and visibility entries
/// repeat once the queue is down to one, so a script describes "the page
/// ends up here" without counting calls.
#[derive(Debug, Clone, Default)]
pub struct SessionScript {
	navigation_failures: VecDeque<String>,
	urls: VecDeque<UrlStep>,
	visibility: HashMap<String, VecDeque<bool>>,
	settle: Option<WaitOutcome>,
	settle_delay: Option<Duration>,
	storage: Option<SessionCredential>,
	close_failure: Option<String>,
}

impl SessionScript {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a URL step; `current_url` walks these in order.
	pub fn with_url(mut self, url: impl Into<String>) -> Self {
		self.urls.push_back(UrlStep::Url(url.into()));
		self
	}

	/// Appends a failing `current_url` step.
	pub fn with_url_error(mut self, message: impl Into<String>) -> Self {
		self.urls.push_back(UrlStep::Error(message.into()));
		self
	}

	/// Makes the next `navigate` call fail. Stack several for repeated
	/// failures; once the queue is empty, navigation succeeds.
	pub fn with_navigation_failure(mut self, message: impl Into<String>) -> Self {
		self.navigation_failures.push_back(message.into());
		self
	}

	pub fn with_settle(mut self, outcome: WaitOutcome) -> Self {
		self.settle = Some(outcome);
		self
	}

	/// Makes `settle` spend (simulated) time before resolving.
	pub fn with_settle_delay(mut self, delay: Duration) -> Self {
		self.settle_delay = Some(delay);
		self
	}

	/// Fixes a signature's visibility for the whole session.
	pub fn with_visible(mut self, signature: &DomSignature, visible: bool) -> Self {
		self.visibility
			.insert(signature.to_string(), VecDeque::from([visible]));
		self
	}

	/// Visibility per query, in order; the last entry repeats.
	pub fn with_visibility_sequence(
		mut self,
		signature: &DomSignature,
		steps: impl IntoIterator<Item = bool>,
	) -> Self {
		self.visibility
			.insert(signature.to_string(), steps.into_iter().collect());
		self
	}

	pub fn with_storage_state(mut self, credential: SessionCredential) -> Self {
		self.storage = Some(credential);
		self
	}

	pub fn with_close_failure(mut self, message: impl Into<String>) -> Self {
		self.close_failure = Some(message.into());
		self
	}
}

#[derive(Default)]
struct Counters {
	opened: AtomicUsize,
	closed: AtomicUsize,
	active: AtomicUsize,
	max_active: AtomicUsize,
	navigations: AtomicUsize,
}

/// Provider whose sessions replay queued scripts.
pub struct ScriptedBrowser {
	scripts: Mutex<VecDeque<SessionScript>>,
	default_script: Mutex<SessionScript>,
	fail_open: Mutex<Option<String>>,
	counters: Arc<Counters>,
}

impl ScriptedBrowser {
	pub fn new() -> Arc<Self> {
		Arc::new(Self {
			scripts: Mutex::new(VecDeque::new()),
			default_script: Mutex::new(SessionScript::default()),
			fail_open: Mutex::new(None),
			counters: Arc::new(Counters::default()),
		})
	}

	/// Queues the script for the next opened session.
	pub fn push_session(&self, script: SessionScript) {
		lock(&self.scripts).push_back(script);
	}

	/// Script used whenever the queue is empty.
	pub fn set_default_script(&self, script: SessionScript) {
		*lock(&self.default_script) = script;
	}

	/// Makes the next `open` fail before any session exists.
	pub fn fail_next_open(&self, message: impl Into<String>) {
		*lock(&self.fail_open) = Some(message.into());
	}

	pub fn opened(&self) -> usize {
		self.counters.opened.load(Ordering::SeqCst)
	}

	pub fn closed(&self) -> usize {
		self.counters.closed.load(Ordering::SeqCst)
	}

	pub fn max_active(&self) -> usize {
		self.counters.max_active.load(Ordering::SeqCst)
	}

	pub fn navigations(&self) -> usize {
		self.counters.navigations.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl BrowserProvider for ScriptedBrowser {
	async fn open(&self, _options: OpenOptions<'_>) -> Result<Box<dyn ProbeSession>> {
		if let Some(message) = lock(&self.fail_open).take() {
			return Err(ProbeError::Launch(message));
		}

		let script = lock(&self.scripts)
			.pop_front()
			.unwrap_or_else(|| lock(&self.default_script).clone());

		let counters = self.counters.clone();
		counters.opened.fetch_add(1, Ordering::SeqCst);
		let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
		counters.max_active.fetch_max(active, Ordering::SeqCst);

		Ok(Box::new(ScriptedSession { script, counters }))
	}
}

struct ScriptedSession {
	script: SessionScript,
	counters: Arc<Counters>,
}

#[async_trait]
impl ProbeSession for ScriptedSession {
	async fn navigate(&mut self, url: &str) -> Result<()> {
		self.counters.navigations.fetch_add(1, Ordering::SeqCst);
		match self.script.navigation_failures.pop_front() {
			Some(message) => Err(ProbeError::Navigation {
				url: url.to_string(),
				source: anyhow::anyhow!(message),
			}),
			None => Ok(()),
		}
	}

	async fn settle(&mut self, timeout: Duration) -> Result<WaitOutcome> {
		if let Some(delay) = self.script.settle_delay {
			if delay >= timeout {
				tokio::time::sleep(timeout).await;
				return Ok(WaitOutcome::TimedOut);
			}
			tokio::time::sleep(delay).await;
		}
		Ok(self.script.settle.unwrap_or(WaitOutcome::Settled))
	}

	async fn current_url(&mut self) -> Result<String> {
		let step = if self.script.urls.len() > 1 {
			self.script.urls.pop_front()
		} else {
			self.script.urls.front().cloned()
		};
		match step {
			Some(UrlStep::Url(url)) => Ok(url),
			Some(UrlStep::Error(message)) => Err(ProbeError::Unexpected(anyhow::anyhow!(message))),
			None => Ok("about:blank".to_string()),
		}
	}

	async fn is_visible(&mut self, signature: &DomSignature) -> Result<bool> {
		let key = signature.to_string();
		Ok(match self.script.visibility.get_mut(&key) {
			Some(steps) if steps.len() > 1 => steps.pop_front().unwrap_or(false),
			Some(steps) => steps.front().copied().unwrap_or(false),
			None => false,
		})
	}

	async fn storage_state(&mut self) -> Result<SessionCredential> {
		Ok(self.script.storage.clone().unwrap_or_default())
	}

	async fn close(self: Box<Self>) -> Result<()> {
		self.counters.active.fetch_sub(1, Ordering::SeqCst);
		self.counters.closed.fetch_add(1, Ordering::SeqCst);
		match self.script.close_failure {
			Some(message) => Err(ProbeError::Unexpected(anyhow::anyhow!(message))),
			None => Ok(()),
		}
	}
}
