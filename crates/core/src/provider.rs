//! Browser-automation provider abstraction.
//!
//! The classifier and login-wait loop drive a browser only through these
//! traits. The real implementation lives in [`crate::cdp`]; tests use the
//! scripted provider in [`crate::testing`]. Bounded waits return a
//! [`WaitOutcome`] instead of failing, so "the window elapsed" is a value the
//! caller can classify rather than an error to be string-matched.

use std::time::Duration;

use async_trait::async_trait;

use crate::credential::SessionCredential;
use crate::error::Result;
use crate::profile::DomSignature;

/// Outcome of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
	/// The condition held before the window elapsed.
	Settled,
	/// The window elapsed. Not an error; meaning is up to the caller.
	TimedOut,
}

impl WaitOutcome {
	pub fn is_settled(self) -> bool {
		matches!(self, WaitOutcome::Settled)
	}
}

/// Options for opening one probing session.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions<'a> {
	/// Storage state to seed the fresh context with. `None` opens a blank
	/// context, as the interactive capture flow does.
	pub credential: Option<&'a SessionCredential>,

	pub headless: bool,
}

impl<'a> OpenOptions<'a> {
	pub fn new() -> Self {
		Self {
			credential: None,
			headless: true,
		}
	}

	pub fn with_credential(mut self, credential: &'a SessionCredential) -> Self {
		self.credential = Some(credential);
		self
	}

	pub fn with_headless(mut self, headless: bool) -> Self {
		self.headless = headless;
		self
	}
}

impl Default for OpenOptions<'_> {
	fn default() -> Self {
		Self::new()
	}
}

/// Source of isolated browsing sessions, one per probe.
#[async_trait]
pub trait BrowserProvider: Send + Sync {
	/// Opens a fresh session: one isolated context backed by one short-lived
	/// browser. The caller owns the session and must [`ProbeSession::close`]
	/// it on every path.
	async fn open(&self, options: OpenOptions<'_>) -> Result<Box<dyn ProbeSession>>;
}

/// One live page in one isolated context.
#[async_trait]
pub trait ProbeSession: Send {
	/// Navigates the page. A network/DNS/browser failure surfaces as
	/// [`ProbeError::Navigation`](crate::error::ProbeError).
	async fn navigate(&mut self, url: &str) -> Result<()>;

	/// Bounded wait for network traffic to go quiet.
	async fn settle(&mut self, timeout: Duration) -> Result<WaitOutcome>;

	/// The final resolved URL of the page right now.
	async fn current_url(&mut self) -> Result<String>;

	/// Whether the signature is present in the rendered page.
	async fn is_visible(&mut self, signature: &DomSignature) -> Result<bool>;

	/// Exports the context's current storage state.
	async fn storage_state(&mut self) -> Result<SessionCredential>;

	/// Releases the context, then the browser, in that order.
	async fn close(self: Box<Self>) -> Result<()>;
}
