//! End-to-end tests for the sessionprobe binary.
//!
//! Everything here sticks to paths that never open a browser: registry
//! listing, unsupported platforms, missing credential files, and usage
//! errors.

use std::path::Path;
use std::process::{Command, Output};

fn run(args: &[&str]) -> Output {
	Command::new(env!("CARGO_BIN_EXE_sessionprobe"))
		.args(args)
		.output()
		.expect("failed to spawn sessionprobe")
}

fn stdout(output: &Output) -> String {
	String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
	String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn platforms_lists_the_registry() {
	let output = run(&["platforms"]);
	assert!(output.status.success(), "stderr: {}", stderr(&output));

	let listing = stdout(&output);
	for name in ["xiaohongshu", "tencent", "douyin", "kuaishou"] {
		assert!(listing.contains(name), "missing {name} in:\n{listing}");
	}
	assert!(listing.contains("https://cp.kuaishou.com/article/publish/video"));
	assert!(listing.contains("ks"));
}

#[test]
fn unsupported_platform_classifies_not_found() {
	let output = run(&[
		"check",
		"--platform",
		"myspace",
		"--credential",
		"/definitely/not/here.json",
	]);

	assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
	let text = stdout(&output);
	assert!(text.contains("INVALID"), "unexpected output:\n{text}");
	assert!(text.contains("NOT_FOUND"));
}

#[test]
fn missing_credential_reports_structured_json() {
	let output = run(&[
		"check",
		"-p",
		"douyin",
		"-c",
		"/definitely/not/here.json",
		"--json",
	]);

	assert_eq!(output.status.code(), Some(1));
	let parsed: serde_json::Value =
		serde_json::from_str(&stdout(&output)).expect("stdout should be JSON");
	assert_eq!(parsed["is_valid"], false);
	assert_eq!(parsed["reason"], "NOT_FOUND");
	assert!(
		parsed["detail"].as_str().unwrap_or("").contains("not found"),
		"detail: {}",
		parsed["detail"]
	);
}

#[test]
fn show_summarizes_a_credential() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("cred.json");
	std::fs::write(
		&path,
		r#"{
			"cookies": [
				{ "name": "sessionid", "value": "abc", "domain": ".douyin.com", "expires": -1 }
			],
			"origins": [
				{ "origin": "https://creator.douyin.com", "localStorage": [] }
			]
		}"#,
	)
	.unwrap();

	let output = run(&["show", "--credential", path.to_str().unwrap()]);
	assert!(output.status.success(), "stderr: {}", stderr(&output));

	let text = stdout(&output);
	assert!(text.contains("cookies: 1"), "output:\n{text}");
	assert!(text.contains("origins: 1"));
	assert!(text.contains(".douyin.com"));
}

#[test]
fn show_on_a_missing_file_is_an_error() {
	let output = run(&["show", "--credential", "/definitely/not/here.json"]);
	assert_eq!(output.status.code(), Some(2));
	assert!(stderr(&output).contains("reading"));
}

#[test]
fn check_without_required_arguments_is_a_usage_error() {
	let output = run(&["check"]);
	assert_eq!(output.status.code(), Some(2));
	assert!(stderr(&output).contains("--platform"));
}

#[test]
fn profile_override_file_must_parse() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("profiles.json");
	std::fs::write(&path, "{ not an array").unwrap();

	let output = run(&[
		"--profiles",
		path.to_str().unwrap(),
		"platforms",
	]);
	assert_eq!(output.status.code(), Some(2));
	assert!(stderr(&output).contains("profile overrides"));
}

#[test]
fn binary_path_exists() {
	assert!(Path::new(env!("CARGO_BIN_EXE_sessionprobe")).exists());
}
