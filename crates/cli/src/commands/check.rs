//! One probe from the command line.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use sessionprobe::cdp::CdpBrowser;
use sessionprobe::classifier::ProbeResult;
use sessionprobe::dispatch::{Dispatcher, DispatcherConfig};

use super::cancel_on_ctrl_c;

pub async fn run(
	config: DispatcherConfig,
	platform: &str,
	credential: &Path,
	json: bool,
) -> Result<ExitCode> {
	let dispatcher = Dispatcher::new(config, Arc::new(CdpBrowser::new()));
	let cancel = cancel_on_ctrl_c();

	let result = dispatcher.check_file(platform, credential, &cancel).await;

	if json {
		println!("{}", serde_json::to_string_pretty(&result)?);
	} else {
		print_human(platform, &result);
	}

	Ok(if result.is_valid {
		ExitCode::SUCCESS
	} else {
		ExitCode::from(1)
	})
}

fn print_human(platform: &str, result: &ProbeResult) {
	let verdict = if result.is_valid {
		"VALID".green().bold()
	} else {
		"INVALID".red().bold()
	};
	println!("{platform}: {verdict} ({})", result.reason);
	if !result.final_url.is_empty() {
		println!("  final url: {}", result.final_url);
	}
	if let Some(detail) = &result.detail {
		println!("  detail:    {detail}");
	}
}
