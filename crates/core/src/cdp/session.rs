//! One attached page target.
//!
//! Wraps target creation, flat-session attachment, navigation, the
//! network-idle heuristic, and boolean DOM queries over `Runtime.evaluate`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::trace;

use super::client::{CdpClient, CdpEvent};
use crate::error::{ProbeError, Result};
use crate::provider::WaitOutcome;

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SETTLE_QUIET_WINDOW: Duration = Duration::from_millis(500);

fn missing_field(method: &str, field: &str) -> ProbeError {
	ProbeError::Unexpected(anyhow::anyhow!("{method} response missing {field}"))
}

/// Counts in-flight requests and remembers when the network last moved.
///
/// Idle means: the load event fired, nothing is in flight, and no network
/// event arrived within the quiet window. The counter can drift below zero
/// when a probe attaches mid-flight, so the check is `<= 0`.
struct NetworkTracker {
	epoch: std::time::Instant,
	inflight: AtomicI64,
	last_activity_ms: AtomicU64,
	load_fired: AtomicBool,
}

impl NetworkTracker {
	fn new() -> Arc<Self> {
		Arc::new(Self {
			epoch: std::time::Instant::now(),
			inflight: AtomicI64::new(0),
			last_activity_ms: AtomicU64::new(0),
			load_fired: AtomicBool::new(false),
		})
	}

	fn touch(&self) {
		let elapsed = self.epoch.elapsed().as_millis() as u64;
		self.last_activity_ms.store(elapsed, Ordering::Relaxed);
	}

	fn on_request(&self) {
		self.inflight.fetch_add(1, Ordering::Relaxed);
		self.touch();
	}

	fn on_request_done(&self) {
		self.inflight.fetch_sub(1, Ordering::Relaxed);
		self.touch();
	}

	fn on_load(&self) {
		self.load_fired.store(true, Ordering::Relaxed);
		self.touch();
	}

	fn begin_navigation(&self) {
		self.load_fired.store(false, Ordering::Relaxed);
		self.touch();
	}

	fn is_idle(&self, quiet: Duration) -> bool {
		if !self.load_fired.load(Ordering::Relaxed) {
			return false;
		}
		if self.inflight.load(Ordering::Relaxed) > 0 {
			return false;
		}
		let elapsed = self.epoch.elapsed().as_millis() as u64;
		let last = self.last_activity_ms.load(Ordering::Relaxed);
		elapsed.saturating_sub(last) >= quiet.as_millis() as u64
	}
}

/// A page in its own browser context, attached with a flat session.
pub struct CdpPage {
	client: Arc<CdpClient>,
	session_id: String,
	target_id: String,
	tracker: Arc<NetworkTracker>,
}

impl CdpPage {
	/// Creates a fresh tab in the given context and attaches to it.
	pub async fn attach(client: Arc<CdpClient>, browser_context_id: &str) -> Result<Self> {
		let created = client
			.call(
				"Target.createTarget",
				Some(json!({ "url": "about:blank", "browserContextId": browser_context_id })),
				None,
			)
			.await?;
		let target_id = created["targetId"]
			.as_str()
			.ok_or_else(|| missing_field("Target.createTarget", "targetId"))?
			.to_string();

		let attached = client
			.call(
				"Target.attachToTarget",
				Some(json!({ "targetId": target_id, "flatten": true })),
				None,
			)
			.await?;
		let session_id = attached["sessionId"]
			.as_str()
			.ok_or_else(|| missing_field("Target.attachToTarget", "sessionId"))?
			.to_string();

		let tracker = NetworkTracker::new();
		subscribe_session(&client, &session_id, "Network.requestWillBeSent", {
			let tracker = tracker.clone();
			move || tracker.on_request()
		});
		subscribe_session(&client, &session_id, "Network.loadingFinished", {
			let tracker = tracker.clone();
			move || tracker.on_request_done()
		});
		subscribe_session(&client, &session_id, "Network.loadingFailed", {
			let tracker = tracker.clone();
			move || tracker.on_request_done()
		});
		subscribe_session(&client, &session_id, "Page.loadEventFired", {
			let tracker = tracker.clone();
			move || tracker.on_load()
		});

		let page = Self {
			client,
			session_id,
			target_id,
			tracker,
		};
		page.call("Page.enable", json!({})).await?;
		page.call("Runtime.enable", json!({})).await?;
		page.call("Network.enable", json!({})).await?;
		Ok(page)
	}

	async fn call(&self, method: &str, params: Value) -> Result<Value> {
		Ok(self
			.client
			.call(method, Some(params), Some(&self.session_id))
			.await?)
	}

	pub fn target_id(&self) -> &str {
		&self.target_id
	}

	/// Starts a navigation. Chrome reports unreachable URLs through
	/// `errorText` rather than a protocol error.
	pub async fn navigate(&self, url: &str) -> Result<()> {
		self.tracker.begin_navigation();
		let result = self.call("Page.navigate", json!({ "url": url })).await.map_err(|err| {
			ProbeError::Navigation {
				url: url.to_string(),
				source: anyhow::Error::new(err),
			}
		})?;
		if let Some(error_text) = result.get("errorText").and_then(Value::as_str) {
			if !error_text.is_empty() {
				return Err(ProbeError::Navigation {
					url: url.to_string(),
					source: anyhow::anyhow!("{error_text}"),
				});
			}
		}
		Ok(())
	}

	/// Polls until the network goes idle or the timeout elapses.
	pub async fn wait_network_idle(&self, timeout: Duration) -> Result<WaitOutcome> {
		let deadline = Instant::now() + timeout;
		loop {
			if self.tracker.is_idle(SETTLE_QUIET_WINDOW) {
				trace!(target: "sessionprobe::cdp", "network idle");
				return Ok(WaitOutcome::Settled);
			}
			if Instant::now() >= deadline {
				return Ok(WaitOutcome::TimedOut);
			}
			sleep(SETTLE_POLL_INTERVAL).await;
		}
	}

	/// Reads the page URL after any redirects.
	pub async fn current_url(&self) -> Result<String> {
		let info = self
			.client
			.call(
				"Target.getTargetInfo",
				Some(json!({ "targetId": self.target_id })),
				None,
			)
			.await?;
		info["targetInfo"]["url"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| missing_field("Target.getTargetInfo", "targetInfo.url"))
	}

	/// Evaluates an expression that must produce a boolean.
	pub async fn evaluate_bool(&self, expression: &str) -> Result<bool> {
		let value = self.evaluate_value(expression).await?;
		value
			.as_bool()
			.ok_or_else(|| ProbeError::JsEval(format!("expected a boolean from: {expression}")))
	}

	/// Evaluates an expression and returns its value by value.
	pub async fn evaluate_value(&self, expression: &str) -> Result<Value> {
		let result = self
			.call(
				"Runtime.evaluate",
				json!({ "expression": expression, "returnByValue": true }),
			)
			.await?;
		if let Some(details) = result.get("exceptionDetails") {
			let text = details
				.get("text")
				.and_then(Value::as_str)
				.unwrap_or("evaluation threw");
			return Err(ProbeError::JsEval(text.to_string()));
		}
		Ok(result["result"]["value"].clone())
	}

	/// Installs a script that runs before any page script on every
	/// navigation in this target.
	pub async fn add_init_script(&self, source: &str) -> Result<()> {
		self.call(
			"Page.addScriptToEvaluateOnNewDocument",
			json!({ "source": source }),
		)
		.await?;
		Ok(())
	}
}

fn subscribe_session(
	client: &Arc<CdpClient>,
	session_id: &str,
	method: &str,
	handler: impl Fn() + Send + Sync + 'static,
) {
	let session_id = session_id.to_string();
	client.subscribe(
		method,
		Arc::new(move |event: &CdpEvent| {
			if event.session_id.as_deref() == Some(session_id.as_str()) {
				handler();
			}
		}),
	);
}
