//! Classification outcomes against a scripted browser.
//!
//! Timing-sensitive cases run on a paused clock, so bounded waits elapse
//! virtually and the suite stays fast and deterministic.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use sessionprobe::classifier::{ProbeReason, ValidityClassifier};
use sessionprobe::credential::{Cookie, SessionCredential};
use sessionprobe::dispatch::{Dispatcher, DispatcherConfig};
use sessionprobe::platform::Platform;
use sessionprobe::profile::{DomSignature, LoginWaitPolicy, PlatformProfile, ProfileTable};
use sessionprobe::retry::RetryPolicy;
use sessionprobe::testing::{ScriptedBrowser, SessionScript};
use tokio_util::sync::CancellationToken;

fn profile(platform: Platform) -> PlatformProfile {
	ProfileTable::builtin()
		.get(platform)
		.expect("builtin profile")
		.clone()
}

fn credential() -> SessionCredential {
	SessionCredential::with_cookies(vec![Cookie::new("sessionid", "tok", ".example.com")])
}

/// Profile whose bounded wait looks for a logged-in marker instead of a
/// logged-out one.
fn inverted_profile() -> PlatformProfile {
	PlatformProfile {
		platform: Platform::Douyin,
		target_url: "https://studio.example.com/dashboard".into(),
		success_path: "studio.example.com/dashboard".into(),
		login_url: "https://studio.example.com/".into(),
		login_url_keywords: vec!["login".into()],
		login_wall_texts: Vec::new(),
		logged_out_selector: Some(DomSignature::css("nav.user-menu")),
		network_idle_timeout_ms: 10_000,
		selector_timeout_ms: 1_000,
		inverted_wait: true,
		login_wait: LoginWaitPolicy::default(),
	}
}

#[tokio::test(start_paused = true)]
async fn quiet_selector_window_means_valid() {
	let browser = ScriptedBrowser::new();
	let kuaishou = profile(Platform::Kuaishou);
	browser.push_session(SessionScript::new().with_url(&kuaishou.target_url));

	let classifier = ValidityClassifier::new(browser.clone());
	let started = tokio::time::Instant::now();
	let result = classifier
		.check(&kuaishou, &credential(), &CancellationToken::new())
		.await;

	assert!(result.is_valid, "unexpected: {result:?}");
	assert_eq!(result.reason, ProbeReason::SelectorTimeoutOk);
	assert_eq!(result.final_url, kuaishou.target_url);

	// the wait consumed its full 5s window and nothing more
	let elapsed = started.elapsed();
	assert!(
		elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6),
		"selector wait took {elapsed:?}"
	);
	assert_eq!(browser.opened(), 1);
	assert_eq!(browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn login_redirect_is_url_mismatch() {
	let browser = ScriptedBrowser::new();
	browser.push_session(
		SessionScript::new().with_url("https://creator.douyin.com/passport/web/login/"),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&profile(Platform::Douyin), &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::UrlMismatch);
	assert_eq!(result.final_url, "https://creator.douyin.com/passport/web/login/");
	assert_eq!(browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn leaving_the_success_path_is_url_mismatch() {
	let browser = ScriptedBrowser::new();
	browser.push_session(SessionScript::new().with_url("https://cp.kuaishou.com/profile"));

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&profile(Platform::Kuaishou), &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::UrlMismatch);
}

#[tokio::test(start_paused = true)]
async fn login_wall_text_beats_matching_url() {
	let browser = ScriptedBrowser::new();
	let douyin = profile(Platform::Douyin);
	browser.push_session(
		SessionScript::new()
			.with_url(&douyin.target_url)
			.with_visible(&DomSignature::text("手机号登录"), true),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&douyin, &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::LoginTextFound);
	assert!(result.detail.as_deref().unwrap_or("").contains("手机号登录"));
	// a classified login wall is authoritative; no second navigation
	assert_eq!(browser.navigations(), 1);
}

#[tokio::test(start_paused = true)]
async fn logged_out_signature_appearing_is_invalid() {
	let browser = ScriptedBrowser::new();
	let tencent = profile(Platform::Tencent);
	let signature = tencent.logged_out_selector.clone().expect("tencent signature");
	browser.push_session(
		SessionScript::new()
			.with_url(&tencent.target_url)
			.with_visible(&signature, true),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let started = tokio::time::Instant::now();
	let result = classifier
		.check(&tencent, &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::SelectorFoundBad);
	// found on the first poll, no need to sit out the window
	assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn inverted_wait_flips_both_outcomes() {
	let inverted = inverted_profile();
	let marker = DomSignature::css("nav.user-menu");

	let browser = ScriptedBrowser::new();
	browser.push_session(
		SessionScript::new()
			.with_url(&inverted.target_url)
			.with_visible(&marker, true),
	);
	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&inverted, &credential(), &CancellationToken::new())
		.await;
	assert!(result.is_valid, "marker present should be valid: {result:?}");
	assert_eq!(result.reason, ProbeReason::SelectorTimeoutOk);

	let browser = ScriptedBrowser::new();
	browser.push_session(SessionScript::new().with_url(&inverted.target_url));
	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&inverted, &credential(), &CancellationToken::new())
		.await;
	assert!(!result.is_valid, "marker absent should be invalid");
	assert_eq!(result.reason, ProbeReason::SelectorFoundBad);
}

#[tokio::test(start_paused = true)]
async fn exhausted_navigation_retries_classify_as_exception() {
	let browser = ScriptedBrowser::new();
	browser.push_session(
		SessionScript::new()
			.with_navigation_failure("net::ERR_NAME_NOT_RESOLVED")
			.with_navigation_failure("net::ERR_NAME_NOT_RESOLVED"),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&profile(Platform::Douyin), &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::Exception);
	assert!(
		result.detail.as_deref().unwrap_or("").contains("ERR_NAME_NOT_RESOLVED"),
		"detail should carry the cause: {result:?}"
	);
	// default policy: one retry, so two attempts total
	assert_eq!(browser.navigations(), 2);
	assert_eq!(browser.closed(), 1, "failed probe must still close its session");
}

#[tokio::test(start_paused = true)]
async fn transient_navigation_failure_recovers() {
	let browser = ScriptedBrowser::new();
	let douyin = profile(Platform::Douyin);
	browser.push_session(
		SessionScript::new()
			.with_navigation_failure("net::ERR_CONNECTION_RESET")
			.with_url(&douyin.target_url),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&douyin, &credential(), &CancellationToken::new())
		.await;

	assert!(result.is_valid, "retry should have recovered: {result:?}");
	assert_eq!(browser.navigations(), 2);
}

#[tokio::test(start_paused = true)]
async fn retry_disabled_fails_on_first_attempt() {
	let browser = ScriptedBrowser::new();
	browser.push_session(SessionScript::new().with_navigation_failure("refused"));

	let classifier = ValidityClassifier::new(browser.clone()).with_retry(RetryPolicy::none());
	let result = classifier
		.check(&profile(Platform::Douyin), &credential(), &CancellationToken::new())
		.await;

	assert_eq!(result.reason, ProbeReason::Exception);
	assert_eq!(browser.navigations(), 1);
}

#[tokio::test(start_paused = true)]
async fn mid_probe_error_still_closes_the_session() {
	let browser = ScriptedBrowser::new();
	browser.push_session(SessionScript::new().with_url_error("target crashed"));

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&profile(Platform::Kuaishou), &credential(), &CancellationToken::new())
		.await;

	assert_eq!(result.reason, ProbeReason::Exception);
	assert_eq!(browser.opened(), 1);
	assert_eq!(browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn close_failure_does_not_overwrite_the_verdict() {
	let browser = ScriptedBrowser::new();
	let douyin = profile(Platform::Douyin);
	browser.push_session(
		SessionScript::new()
			.with_url(&douyin.target_url)
			.with_close_failure("browser already gone"),
	);

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&douyin, &credential(), &CancellationToken::new())
		.await;

	assert!(result.is_valid);
	assert_eq!(result.reason, ProbeReason::SelectorTimeoutOk);
	assert_eq!(browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_failure_is_exception_without_a_session() {
	let browser = ScriptedBrowser::new();
	browser.fail_next_open("no Chrome or Chromium executable found");

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier
		.check(&profile(Platform::Tencent), &credential(), &CancellationToken::new())
		.await;

	assert_eq!(result.reason, ProbeReason::Exception);
	assert_eq!(result.final_url, "");
	assert_eq!(browser.opened(), 0);
	assert_eq!(browser.closed(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_start_opens_nothing() {
	let browser = ScriptedBrowser::new();
	let cancel = CancellationToken::new();
	cancel.cancel();

	let classifier = ValidityClassifier::new(browser.clone());
	let result = classifier.check(&profile(Platform::Douyin), &credential(), &cancel).await;

	assert_eq!(result.reason, ProbeReason::Exception);
	assert!(result.detail.as_deref().unwrap_or("").contains("cancelled"));
	assert_eq!(browser.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_mid_probe_aborts_and_cleans_up() {
	let browser = ScriptedBrowser::new();
	let douyin = profile(Platform::Douyin);
	// settle would sit for the full idle window; cancellation cuts in first
	browser.push_session(
		SessionScript::new()
			.with_url(&douyin.target_url)
			.with_settle_delay(Duration::from_secs(60)),
	);

	let cancel = CancellationToken::new();
	let canceller = cancel.clone();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_secs(2)).await;
		canceller.cancel();
	});

	let classifier = ValidityClassifier::new(browser.clone());
	let started = tokio::time::Instant::now();
	let result = classifier.check(&douyin, &credential(), &cancel).await;

	assert_eq!(result.reason, ProbeReason::Exception);
	assert!(result.detail.as_deref().unwrap_or("").contains("cancelled"));
	assert!(
		started.elapsed() < Duration::from_secs(5),
		"cancellation should cut the idle window short"
	);
	assert_eq!(browser.opened(), 1);
	assert_eq!(browser.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn identical_sessions_classify_identically() {
	let browser = ScriptedBrowser::new();
	let tencent = profile(Platform::Tencent);
	for _ in 0..2 {
		browser.push_session(SessionScript::new().with_url(&tencent.target_url));
	}

	let classifier = ValidityClassifier::new(browser.clone());
	let first = classifier
		.check(&tencent, &credential(), &CancellationToken::new())
		.await;
	let second = classifier
		.check(&tencent, &credential(), &CancellationToken::new())
		.await;

	assert_eq!(first.is_valid, second.is_valid);
	assert_eq!(first.reason, second.reason);
	assert_eq!(first.final_url, second.final_url);
}

#[tokio::test(start_paused = true)]
async fn dispatcher_caps_concurrent_sessions() {
	let browser = ScriptedBrowser::new();
	let douyin = profile(Platform::Douyin);
	browser.set_default_script(
		SessionScript::new()
			.with_url(&douyin.target_url)
			.with_settle_delay(Duration::from_secs(1)),
	);

	let dispatcher = Arc::new(Dispatcher::new(
		DispatcherConfig {
			max_concurrent_checks: 2,
			..DispatcherConfig::default()
		},
		browser.clone(),
	));

	let cancel = CancellationToken::new();
	let checks = (0..8).map(|_| {
		let dispatcher = dispatcher.clone();
		let cancel = cancel.clone();
		tokio::spawn(async move {
			dispatcher.check("douyin", &credential(), &cancel).await
		})
	});
	let results = join_all(checks).await;

	for result in results {
		let result = result.expect("check task panicked");
		assert!(result.is_valid, "unexpected: {result:?}");
	}
	assert_eq!(browser.opened(), 8);
	assert_eq!(browser.closed(), 8);
	assert!(
		browser.max_active() <= 2,
		"cap violated: {} sessions were live at once",
		browser.max_active()
	);
}

#[tokio::test(start_paused = true)]
async fn unsupported_platform_never_opens_a_browser() {
	let browser = ScriptedBrowser::new();
	let dispatcher = Dispatcher::new(DispatcherConfig::default(), browser.clone());

	let result = dispatcher
		.check("myspace", &credential(), &CancellationToken::new())
		.await;

	assert!(!result.is_valid);
	assert_eq!(result.reason, ProbeReason::NotFound);
	assert_eq!(browser.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_credential_file_is_not_found() {
	let browser = ScriptedBrowser::new();
	let dispatcher = Dispatcher::new(DispatcherConfig::default(), browser.clone());

	let result = dispatcher
		.check_file(
			"douyin",
			std::path::Path::new("/definitely/not/here.json"),
			&CancellationToken::new(),
		)
		.await;

	assert_eq!(result.reason, ProbeReason::NotFound);
	assert!(result.detail.as_deref().unwrap_or("").contains("not found"));
	assert_eq!(browser.opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn every_opened_session_is_closed_across_mixed_outcomes() {
	let browser = ScriptedBrowser::new();
	let kuaishou = profile(Platform::Kuaishou);

	// valid, url mismatch, navigation failure, mid-probe error
	browser.push_session(SessionScript::new().with_url(&kuaishou.target_url));
	browser.push_session(SessionScript::new().with_url("https://id.kuaishou.com/passport"));
	browser.push_session(
		SessionScript::new()
			.with_navigation_failure("reset")
			.with_navigation_failure("reset"),
	);
	browser.push_session(SessionScript::new().with_url_error("target crashed"));

	let classifier = ValidityClassifier::new(browser.clone());
	for _ in 0..4 {
		let _ = classifier
			.check(&kuaishou, &credential(), &CancellationToken::new())
			.await;
	}

	assert_eq!(browser.opened(), 4);
	assert_eq!(browser.closed(), 4, "a probe leaked its session");
}
