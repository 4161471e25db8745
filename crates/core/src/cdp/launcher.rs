//! Browser discovery and process lifecycle.
//!
//! Every probe gets its own browser process with a throwaway profile
//! directory and an ephemeral debugging port, so concurrent probes never
//! share cookie jars.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tempfile::TempDir;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::error::{ProbeError, Result};

const ENDPOINT_POLL_ATTEMPTS: u32 = 40;
const ENDPOINT_POLL_INTERVAL: Duration = Duration::from_millis(200);

const EXECUTABLE_NAMES: &[&str] = &[
	"chromium",
	"chromium-browser",
	"google-chrome",
	"google-chrome-stable",
	"chrome",
	"msedge",
];

/// Locates a Chrome or Chromium executable via PATH, then well-known
/// install locations.
pub fn find_browser_executable() -> Result<PathBuf> {
	for name in EXECUTABLE_NAMES {
		if let Ok(path) = which::which(name) {
			return Ok(path);
		}
	}

	let candidates: &[&str] = if cfg!(target_os = "macos") {
		&[
			"/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
			"/Applications/Chromium.app/Contents/MacOS/Chromium",
		]
	} else if cfg!(target_os = "windows") {
		&[
			r"C:\Program Files\Google\Chrome\Application\chrome.exe",
			r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
		]
	} else {
		&[
			"/usr/bin/chromium",
			"/usr/bin/chromium-browser",
			"/usr/bin/google-chrome",
			"/snap/bin/chromium",
		]
	};
	for candidate in candidates {
		let path = Path::new(candidate);
		if path.exists() {
			return Ok(path.to_path_buf());
		}
	}

	Err(ProbeError::Launch(
		"no Chrome or Chromium executable found; install one or pass an explicit path".into(),
	))
}

fn free_port() -> Result<u16> {
	let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
	Ok(listener.local_addr()?.port())
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
	#[serde(rename = "webSocketDebuggerUrl")]
	web_socket_debugger_url: String,
}

/// A running browser and its DevTools endpoint.
pub struct LaunchedBrowser {
	pub child: Child,
	pub ws_url: String,
	pub port: u16,
	/// Profile directory, removed on drop.
	pub profile_dir: TempDir,
}

/// Spawns a browser and waits for its debugging endpoint to come up.
pub async fn launch(executable: Option<&Path>, headless: bool) -> Result<LaunchedBrowser> {
	let executable = match executable {
		Some(path) => path.to_path_buf(),
		None => find_browser_executable()?,
	};
	let profile_dir = tempfile::Builder::new().prefix("sessionprobe-").tempdir()?;
	let port = free_port()?;

	let mut command = Command::new(&executable);
	command
		.arg(format!("--remote-debugging-port={port}"))
		.arg(format!("--user-data-dir={}", profile_dir.path().display()))
		.arg("--no-first-run")
		.arg("--no-default-browser-check")
		.arg("--disable-background-networking")
		.arg("--disable-sync");
	if headless {
		command.arg("--headless=new");
	}
	command.arg("about:blank");
	command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
	command.kill_on_drop(true);

	debug!(
		target: "sessionprobe::launcher",
		executable = %executable.display(),
		port,
		headless,
		"launching browser"
	);
	let mut child = command.spawn().map_err(|err| {
		ProbeError::Launch(format!("failed to spawn {}: {err}", executable.display()))
	})?;

	match wait_for_endpoint(port, &mut child).await {
		Ok(ws_url) => Ok(LaunchedBrowser {
			child,
			ws_url,
			port,
			profile_dir,
		}),
		Err(err) => {
			if let Err(kill_err) = child.kill().await {
				warn!(
					target: "sessionprobe::launcher",
					error = %kill_err,
					"failed to kill browser after startup failure"
				);
			}
			Err(err)
		}
	}
}

async fn wait_for_endpoint(port: u16, child: &mut Child) -> Result<String> {
	let client = reqwest::Client::builder()
		.timeout(Duration::from_millis(500))
		.build()
		.map_err(|err| ProbeError::Launch(err.to_string()))?;
	let url = format!("http://127.0.0.1:{port}/json/version");

	for _ in 0..ENDPOINT_POLL_ATTEMPTS {
		if let Some(status) = child.try_wait()? {
			return Err(ProbeError::Launch(format!(
				"browser exited during startup with {status}"
			)));
		}
		match client.get(&url).send().await {
			Ok(response) if response.status().is_success() => {
				let info: VersionInfo = response.json().await.map_err(|err| {
					ProbeError::Launch(format!("bad /json/version payload: {err}"))
				})?;
				return Ok(info.web_socket_debugger_url);
			}
			Ok(_) | Err(_) => {}
		}
		tokio::time::sleep(ENDPOINT_POLL_INTERVAL).await;
	}

	Err(ProbeError::Launch(format!(
		"devtools endpoint on port {port} never came up"
	)))
}
