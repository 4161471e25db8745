//! HTTP frontend.
//!
//! One POST endpoint per probe, mirroring the classifier contract: any
//! classified outcome (valid, invalid, unsupported platform, missing file)
//! is a 200 with a structured envelope; non-200 means the request itself was
//! malformed.

use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sessionprobe::CancellationToken;
use sessionprobe::cdp::CdpBrowser;
use sessionprobe::classifier::ProbeReason;
use sessionprobe::dispatch::{Dispatcher, DispatcherConfig};
use tracing::info;

struct ServeState {
	dispatcher: Dispatcher,
	credentials_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CheckRequest {
	platform: String,
	/// Bare file name resolved under the configured credentials directory.
	credential: String,
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
	code: u16,
	#[serde(skip_serializing_if = "Option::is_none")]
	msg: Option<String>,
	data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckData {
	is_valid: bool,
	reason: ProbeReason,
	final_url: String,
}

#[derive(Debug, Serialize)]
struct PlatformEntry {
	code: u8,
	name: &'static str,
	aliases: Vec<&'static str>,
}

pub async fn run(
	config: DispatcherConfig,
	listen: &str,
	credentials_dir: PathBuf,
) -> Result<ExitCode> {
	let state = Arc::new(ServeState {
		dispatcher: Dispatcher::new(config, Arc::new(CdpBrowser::new())),
		credentials_dir,
	});

	let app = Router::new()
		.route("/check", post(check))
		.route("/platforms", get(platforms))
		.with_state(state);

	let listener = tokio::net::TcpListener::bind(listen)
		.await
		.with_context(|| format!("binding {listen}"))?;
	let addr = listener.local_addr()?;
	info!(target: "sessionprobe_cli::serve", %addr, "listening");
	println!("listening on http://{addr}");

	axum::serve(listener, app)
		.with_graceful_shutdown(async {
			let _ = tokio::signal::ctrl_c().await;
		})
		.await
		.context("http server failed")?;

	Ok(ExitCode::SUCCESS)
}

async fn check(
	State(state): State<Arc<ServeState>>,
	Json(request): Json<CheckRequest>,
) -> Response {
	let Some(file_name) = safe_file_name(&request.credential) else {
		return reject(
			StatusCode::BAD_REQUEST,
			"credential must be a bare file name",
		);
	};
	let path = state.credentials_dir.join(file_name);

	let result = state
		.dispatcher
		.check_file(&request.platform, &path, &CancellationToken::new())
		.await;

	let body = Envelope {
		code: 200,
		msg: result.detail.clone(),
		data: CheckData {
			is_valid: result.is_valid,
			reason: result.reason,
			final_url: result.final_url,
		},
	};
	(StatusCode::OK, Json(body)).into_response()
}

async fn platforms(State(state): State<Arc<ServeState>>) -> Response {
	let entries: Vec<PlatformEntry> = state
		.dispatcher
		.profiles()
		.iter()
		.map(|profile| PlatformEntry {
			code: profile.platform.code(),
			name: profile.platform.as_str(),
			aliases: profile.platform.aliases().to_vec(),
		})
		.collect();

	let body = Envelope {
		code: 200,
		msg: None,
		data: entries,
	};
	(StatusCode::OK, Json(body)).into_response()
}

fn reject(status: StatusCode, message: &str) -> Response {
	let body = Envelope {
		code: status.as_u16(),
		msg: Some(message.to_string()),
		data: serde_json::Value::Null,
	};
	(status, Json(body)).into_response()
}

/// Accepts only a single normal path component, so requests cannot escape
/// the credentials directory.
fn safe_file_name(name: &str) -> Option<&str> {
	let mut components = Path::new(name).components();
	match (components.next(), components.next()) {
		(Some(Component::Normal(_)), None) => Some(name),
		_ => None,
	}
}
