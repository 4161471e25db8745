//! Registry listing.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use sessionprobe::profile::ProfileTable;

pub fn run(profiles: &ProfileTable) -> Result<ExitCode> {
	println!("{:<5} {:<13} {:<30} target", "code", "name", "aliases");
	for profile in profiles.iter() {
		let platform = profile.platform;
		println!(
			"{:<5} {:<13} {:<30} {}",
			platform.code(),
			platform.as_str().bold(),
			platform.aliases().join(", "),
			profile.target_url
		);
	}
	Ok(ExitCode::SUCCESS)
}
