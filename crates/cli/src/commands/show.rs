//! Credential inspection without a browser.

use std::path::Path;
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use colored::Colorize;
use sessionprobe::credential::SessionCredential;

pub fn run(path: &Path) -> Result<ExitCode> {
	let credential = SessionCredential::from_file(path)
		.with_context(|| format!("reading {}", path.display()))?;

	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs_f64())
		.unwrap_or(0.0);

	println!("{}", path.display().to_string().bold());
	println!("  cookies: {}", credential.cookie_count());
	println!("  origins: {}", credential.origin_count());

	let domains = credential.domains();
	if !domains.is_empty() {
		println!("  domains: {}", domains.join(", "));
	}

	let expired: Vec<&str> = credential
		.cookies
		.iter()
		.filter(|c| c.is_expired(now))
		.map(|c| c.name.as_str())
		.collect();
	if expired.is_empty() {
		println!("  expiry:  {}", "no expired cookies".green());
	} else {
		println!(
			"  expiry:  {} {}",
			format!("{} expired:", expired.len()).red(),
			expired.join(", ")
		);
	}

	Ok(ExitCode::SUCCESS)
}
