mod check;
mod login;
mod platforms;
mod serve;
mod show;

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use sessionprobe::CancellationToken;
use sessionprobe::dispatch::DispatcherConfig;
use sessionprobe::profile::ProfileTable;
use sessionprobe::retry::RetryPolicy;

use crate::cli::{Cli, Command};

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
	let Cli {
		verbose: _,
		profiles,
		max_concurrent,
		headed,
		command,
	} = cli;

	let profiles = match profiles {
		Some(path) => ProfileTable::from_file(&path)
			.with_context(|| format!("loading profile overrides from {}", path.display()))?,
		None => ProfileTable::builtin(),
	};
	let config = DispatcherConfig {
		max_concurrent_checks: max_concurrent,
		headless: !headed,
		retry: RetryPolicy::default(),
		profiles,
	};

	match command {
		Command::Check {
			platform,
			credential,
			json,
		} => check::run(config, &platform, &credential, json).await,
		Command::Login {
			platform,
			out,
			timeout,
		} => login::run(config, &platform, &out, Duration::from_secs(timeout)).await,
		Command::Show { credential } => show::run(&credential),
		Command::Serve {
			listen,
			credentials_dir,
		} => serve::run(config, &listen, credentials_dir).await,
		Command::Platforms => platforms::run(&config.profiles),
	}
}

/// Token that fires on the first Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			trigger.cancel();
		}
	});
	cancel
}
