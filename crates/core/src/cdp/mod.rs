//! Chrome DevTools browser provider.
//!
//! [`CdpBrowser`] implements [`BrowserProvider`] against a locally installed
//! Chrome or Chromium: a fresh process per probe, cookies seeded through
//! `Storage.setCookies` before the first navigation, and localStorage seeded
//! through an init script so values exist before page scripts run.

mod client;
mod launcher;
mod session;

pub use client::{CdpClient, CdpError, CdpEvent, EventCallback};
pub use launcher::{LaunchedBrowser, find_browser_executable, launch};
pub use session::CdpPage;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::credential::{Cookie, LocalStorageEntry, OriginState, SameSite, SessionCredential};
use crate::error::{ProbeError, Result};
use crate::profile::DomSignature;
use crate::provider::{BrowserProvider, OpenOptions, ProbeSession, WaitOutcome};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Probe sessions backed by a real local browser.
#[derive(Debug, Clone, Default)]
pub struct CdpBrowser {
	executable: Option<PathBuf>,
}

impl CdpBrowser {
	pub fn new() -> Self {
		Self::default()
	}

	/// Uses the given executable instead of searching for one.
	pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
		self.executable = Some(path.into());
		self
	}
}

#[async_trait]
impl BrowserProvider for CdpBrowser {
	async fn open(&self, options: OpenOptions<'_>) -> Result<Box<dyn ProbeSession>> {
		// kill_on_drop covers the child if anything below fails
		let launched = launcher::launch(self.executable.as_deref(), options.headless).await?;
		let client = CdpClient::connect(&launched.ws_url).await?;

		let context = client.call("Target.createBrowserContext", None, None).await?;
		let context_id = context["browserContextId"]
			.as_str()
			.ok_or_else(|| {
				ProbeError::Unexpected(anyhow::anyhow!(
					"Target.createBrowserContext response missing browserContextId"
				))
			})?
			.to_string();

		if let Some(credential) = options.credential {
			seed_cookies(&client, &context_id, &credential.cookies).await?;
		}

		let page = CdpPage::attach(client.clone(), &context_id).await?;

		if let Some(credential) = options.credential {
			if !credential.origins.is_empty() {
				page.add_init_script(&storage_seed_script(&credential.origins)).await?;
			}
		}

		debug!(
			target: "sessionprobe::cdp",
			context = %context_id,
			target = %page.target_id(),
			"session ready"
		);
		Ok(Box::new(CdpSession {
			client,
			page,
			context_id,
			launched,
		}))
	}
}

struct CdpSession {
	client: Arc<CdpClient>,
	page: CdpPage,
	context_id: String,
	launched: LaunchedBrowser,
}

#[async_trait]
impl ProbeSession for CdpSession {
	async fn navigate(&mut self, url: &str) -> Result<()> {
		self.page.navigate(url).await
	}

	async fn settle(&mut self, timeout: Duration) -> Result<WaitOutcome> {
		self.page.wait_network_idle(timeout).await
	}

	async fn current_url(&mut self) -> Result<String> {
		self.page.current_url().await
	}

	async fn is_visible(&mut self, signature: &DomSignature) -> Result<bool> {
		self.page.evaluate_bool(&visibility_expression(signature)).await
	}

	async fn storage_state(&mut self) -> Result<SessionCredential> {
		export_storage_state(&self.client, &self.context_id, &self.page).await
	}

	async fn close(mut self: Box<Self>) -> Result<()> {
		// context first, then the browser; the process kill below is the
		// final guarantee if the protocol side misbehaves
		let mut first_error: Option<ProbeError> = None;

		if let Err(err) = self
			.client
			.call(
				"Target.disposeBrowserContext",
				Some(json!({ "browserContextId": self.context_id })),
				None,
			)
			.await
		{
			warn!(
				target: "sessionprobe::cdp",
				error = %err,
				"browser context disposal failed"
			);
			first_error.get_or_insert(ProbeError::Cdp(err));
		}

		if let Err(err) = self.client.call("Browser.close", None, None).await {
			// expected when the socket drops as the browser exits
			debug!(target: "sessionprobe::cdp", error = %err, "Browser.close");
		}
		if let Err(err) = self.client.close().await {
			debug!(target: "sessionprobe::cdp", error = %err, "websocket close");
		}

		match tokio::time::timeout(SHUTDOWN_GRACE, self.launched.child.wait()).await {
			Ok(Ok(_status)) => {}
			Ok(Err(err)) => {
				warn!(target: "sessionprobe::cdp", error = %err, "browser wait failed");
			}
			Err(_) => {
				warn!(target: "sessionprobe::cdp", "browser did not exit in time, killing");
				if let Err(err) = self.launched.child.kill().await {
					warn!(target: "sessionprobe::cdp", error = %err, "browser kill failed");
				}
			}
		}

		match first_error {
			Some(err) => Err(err),
			None => Ok(()),
		}
	}
}

async fn seed_cookies(client: &CdpClient, context_id: &str, cookies: &[Cookie]) -> Result<()> {
	if cookies.is_empty() {
		return Ok(());
	}
	let params: Vec<Value> = cookies.iter().map(cookie_param).collect();
	client
		.call(
			"Storage.setCookies",
			Some(json!({ "cookies": params, "browserContextId": context_id })),
			None,
		)
		.await?;
	debug!(target: "sessionprobe::cdp", count = cookies.len(), "cookies seeded");
	Ok(())
}

fn cookie_param(cookie: &Cookie) -> Value {
	let mut param = json!({ "name": cookie.name, "value": cookie.value });
	if let Some(domain) = &cookie.domain {
		param["domain"] = json!(domain);
	}
	if let Some(path) = &cookie.path {
		param["path"] = json!(path);
	}
	// negative expiry marks a session cookie and must not be forwarded
	if let Some(expires) = cookie.expires {
		if expires > 0.0 {
			param["expires"] = json!(expires);
		}
	}
	if let Some(http_only) = cookie.http_only {
		param["httpOnly"] = json!(http_only);
	}
	if let Some(secure) = cookie.secure {
		param["secure"] = json!(secure);
	}
	if let Some(same_site) = cookie.same_site {
		param["sameSite"] = json!(same_site_name(same_site));
	}
	param
}

fn same_site_name(same_site: SameSite) -> &'static str {
	match same_site {
		SameSite::None => "None",
		SameSite::Lax => "Lax",
		SameSite::Strict => "Strict",
	}
}

fn parse_same_site(name: &str) -> Option<SameSite> {
	match name {
		"None" => Some(SameSite::None),
		"Lax" => Some(SameSite::Lax),
		"Strict" => Some(SameSite::Strict),
		_ => Option::None,
	}
}

/// Stored origins sometimes carry a trailing slash or a path; the lookup key
/// must match `window.location.origin` exactly.
fn normalize_origin(raw: &str) -> String {
	match Url::parse(raw) {
		Ok(parsed) => parsed.origin().ascii_serialization(),
		Err(_) => raw.trim_end_matches('/').to_string(),
	}
}

/// Init script that restores localStorage for whichever seeded origin the
/// page ends up on. Runs before page scripts on every navigation.
fn storage_seed_script(origins: &[OriginState]) -> String {
	let mut seed = serde_json::Map::new();
	for origin in origins {
		let entries: Vec<Value> = origin
			.local_storage
			.iter()
			.map(|entry| json!([entry.name, entry.value]))
			.collect();
		seed.insert(normalize_origin(&origin.origin), Value::Array(entries));
	}
	format!(
		r#"(() => {{
	const seed = {};
	try {{
		const entries = seed[window.location.origin];
		if (entries) {{
			for (const [key, value] of entries) {{
				window.localStorage.setItem(key, value);
			}}
		}}
	}} catch (_) {{}}
}})();"#,
		Value::Object(seed)
	)
}

fn js_string(value: &str) -> String {
	Value::String(value.to_string()).to_string()
}

fn visibility_expression(signature: &DomSignature) -> String {
	match signature {
		DomSignature::Css(selector) => {
			format!("document.querySelector({}) !== null", js_string(selector))
		}
		DomSignature::Text(needle) => format!(
			"!!document.body && document.body.innerText.includes({})",
			js_string(needle)
		),
		DomSignature::TextIn { css, text } => format!(
			"Array.from(document.querySelectorAll({})).some((el) => (el.textContent || '').includes({}))",
			js_string(css),
			js_string(text)
		),
	}
}

async fn export_storage_state(
	client: &CdpClient,
	context_id: &str,
	page: &CdpPage,
) -> Result<SessionCredential> {
	let result = client
		.call(
			"Storage.getCookies",
			Some(json!({ "browserContextId": context_id })),
			None,
		)
		.await?;

	let mut cookies = Vec::new();
	if let Some(items) = result["cookies"].as_array() {
		for item in items {
			let (Some(name), Some(value)) = (
				item["name"].as_str(),
				item["value"].as_str(),
			) else {
				continue;
			};
			cookies.push(Cookie {
				name: name.to_string(),
				value: value.to_string(),
				domain: item["domain"].as_str().map(str::to_string),
				path: item["path"].as_str().map(str::to_string),
				expires: item["expires"].as_f64().filter(|at| *at > 0.0),
				http_only: item["httpOnly"].as_bool(),
				secure: item["secure"].as_bool(),
				same_site: item["sameSite"].as_str().and_then(parse_same_site),
			});
		}
	}

	// localStorage is only readable for the origin currently loaded; that is
	// the origin login landed on, which is the one worth saving
	let origin = page.evaluate_value("window.location.origin").await?;
	let entries = page
		.evaluate_value("JSON.stringify(Object.entries(window.localStorage))")
		.await?;

	let mut origins = Vec::new();
	if let (Some(origin), Some(entries)) = (origin.as_str(), entries.as_str()) {
		if origin.starts_with("http") {
			let pairs: Vec<(String, String)> = serde_json::from_str(entries)?;
			if !pairs.is_empty() {
				origins.push(OriginState {
					origin: origin.to_string(),
					local_storage: pairs
						.into_iter()
						.map(|(name, value)| LocalStorageEntry { name, value })
						.collect(),
				});
			}
		}
	}

	Ok(SessionCredential { cookies, origins })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn visibility_expressions_escape_quotes() {
		let expr = visibility_expression(&DomSignature::css("div[data-x=\"y\"]"));
		assert_eq!(
			expr,
			r#"document.querySelector("div[data-x=\"y\"]") !== null"#
		);

		let expr = visibility_expression(&DomSignature::text("手机号登录"));
		assert!(expr.contains(r#"includes("手机号登录")"#));
		assert!(expr.starts_with("!!document.body"));

		let expr = visibility_expression(&DomSignature::text_in("div.name", "机构服务"));
		assert!(expr.contains(r#"querySelectorAll("div.name")"#));
		assert!(expr.contains(r#"includes("机构服务")"#));
	}

	#[test]
	fn cookie_params_drop_session_expiry() {
		let cookie = Cookie::new("sid", "v", ".douyin.com")
			.with_expires(-1.0)
			.with_same_site(SameSite::Strict);
		let param = cookie_param(&cookie);
		assert!(param.get("expires").is_none());
		assert_eq!(param["sameSite"], "Strict");
		assert_eq!(param["domain"], ".douyin.com");

		let cookie = Cookie::new("sid", "v", ".douyin.com").with_expires(1999999999.0);
		let param = cookie_param(&cookie);
		assert_eq!(param["expires"], 1999999999.0);
	}

	#[test]
	fn seed_script_keys_by_origin() {
		let script = storage_seed_script(&[OriginState {
			origin: "https://creator.douyin.com/".to_string(),
			local_storage: vec![LocalStorageEntry {
				name: "uid".to_string(),
				value: "42".to_string(),
			}],
		}]);
		assert!(script.contains(r#""https://creator.douyin.com":[["uid","42"]]"#));
		assert!(script.contains("window.localStorage.setItem"));
	}

	#[test]
	fn origins_normalize_to_the_location_origin_form() {
		assert_eq!(
			normalize_origin("https://cp.kuaishou.com/article/publish"),
			"https://cp.kuaishou.com"
		);
		assert_eq!(
			normalize_origin("https://channels.weixin.qq.com/"),
			"https://channels.weixin.qq.com"
		);
		assert_eq!(
			normalize_origin("https://localhost:8443/app"),
			"https://localhost:8443"
		);
		assert_eq!(normalize_origin("not a url/"), "not a url");
	}

	#[test]
	fn same_site_roundtrip() {
		for same_site in [SameSite::None, SameSite::Lax, SameSite::Strict] {
			assert_eq!(parse_same_site(same_site_name(same_site)), Some(same_site));
		}
		assert_eq!(parse_same_site("unspecified"), Option::None);
	}
}
