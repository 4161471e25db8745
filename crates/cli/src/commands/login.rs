//! Interactive credential capture.
//!
//! Opens a visible browser at the platform's login page and watches it until
//! a human finishes logging in, then exports the context's storage state.

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use colored::Colorize;
use sessionprobe::cdp::CdpBrowser;
use sessionprobe::credential::SessionCredential;
use sessionprobe::dispatch::DispatcherConfig;
use sessionprobe::login_wait::LoginWaiter;
use sessionprobe::platform::Platform;
use sessionprobe::profile::PlatformProfile;
use sessionprobe::provider::{BrowserProvider, OpenOptions, ProbeSession};
use tracing::warn;

use super::cancel_on_ctrl_c;

// After detection, give the authenticated surface a moment to finish
// setting its cookies before exporting.
const POST_LOGIN_SETTLE: Duration = Duration::from_secs(8);
const INITIAL_SETTLE: Duration = Duration::from_secs(5);

pub async fn run(
	config: DispatcherConfig,
	platform: &str,
	out: &Path,
	timeout: Duration,
) -> Result<ExitCode> {
	let Some(platform_id) = Platform::resolve(platform) else {
		bail!("unsupported platform: {platform}");
	};
	let profile = config
		.profiles
		.get(platform_id)
		.with_context(|| format!("no profile for {platform_id}"))?
		.clone();

	let provider = CdpBrowser::new();
	let mut session = provider
		.open(OpenOptions::new().with_headless(false))
		.await
		.context("opening a visible browser")?;

	println!(
		"{}",
		format!("complete the {platform_id} login in the opened window").cyan()
	);

	let captured = capture(session.as_mut(), &profile, timeout).await;

	if let Err(err) = session.close().await {
		warn!(target: "sessionprobe_cli", error = %err, "browser close failed");
	}

	match captured? {
		Some(credential) => {
			credential
				.to_file(out)
				.with_context(|| format!("writing {}", out.display()))?;
			println!(
				"{} {} cookies, {} origins -> {}",
				"login captured:".green().bold(),
				credential.cookie_count(),
				credential.origin_count(),
				out.display()
			);
			Ok(ExitCode::SUCCESS)
		}
		None => {
			eprintln!(
				"login was not detected within {}s; nothing saved",
				timeout.as_secs()
			);
			Ok(ExitCode::from(1))
		}
	}
}

async fn capture(
	session: &mut dyn ProbeSession,
	profile: &PlatformProfile,
	timeout: Duration,
) -> Result<Option<SessionCredential>> {
	session.navigate(&profile.login_url).await?;
	let _ = session.settle(INITIAL_SETTLE).await?;
	let initial_url = session.current_url().await?;

	let cancel = cancel_on_ctrl_c();
	let waiter = LoginWaiter::new(timeout).with_hint(|elapsed| {
		println!(
			"{}",
			format!("  still waiting for login ({}s elapsed)...", elapsed.as_secs()).dimmed()
		);
	});
	let state = waiter
		.wait(session, &initial_url, &profile.login_wait, &cancel)
		.await;

	if !state.is_detected() {
		return Ok(None);
	}

	let _ = session.settle(POST_LOGIN_SETTLE).await?;
	Ok(Some(session.storage_state().await?))
}
