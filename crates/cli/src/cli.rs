use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sessionprobe")]
#[command(about = "Check whether stored social-platform sessions still authenticate")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Profile table overrides (JSON array of platform profiles)
	#[arg(long, global = true, value_name = "FILE")]
	pub profiles: Option<PathBuf>,

	/// Cap on simultaneously open browsers
	#[arg(long, global = true, value_name = "N", default_value_t = 2)]
	pub max_concurrent: usize,

	/// Probe with a visible browser window instead of headless
	#[arg(long, global = true)]
	pub headed: bool,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Probe one stored credential against its platform
	///
	/// Exits 0 when the session is still valid, 1 for any classified
	/// non-valid outcome.
	Check {
		/// Platform name, alias, or numeric code
		#[arg(short, long, value_name = "PLATFORM")]
		platform: String,

		/// Credential file (browser storage-state JSON)
		#[arg(short, long, value_name = "FILE")]
		credential: PathBuf,

		/// Print the full probe result as JSON on stdout
		#[arg(long)]
		json: bool,
	},

	/// Open a visible browser and capture a fresh credential after login
	Login {
		/// Platform name, alias, or numeric code
		#[arg(short, long, value_name = "PLATFORM")]
		platform: String,

		/// Where to write the captured storage state
		#[arg(short, long, value_name = "FILE", default_value = "credential.json")]
		out: PathBuf,

		/// Give up after this many seconds
		#[arg(short, long, value_name = "SECONDS", default_value_t = 300)]
		timeout: u64,
	},

	/// Summarize a credential file without opening a browser
	Show {
		/// Credential file (browser storage-state JSON)
		#[arg(short, long, value_name = "FILE")]
		credential: PathBuf,
	},

	/// Serve probe requests over HTTP
	Serve {
		/// Address to bind
		#[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:8321")]
		listen: String,

		/// Directory credential file names resolve under
		#[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
		credentials_dir: PathBuf,
	},

	/// List supported platforms and their probe targets
	Platforms,
}
