//! Per-platform probe profiles.
//!
//! Everything platform-specific lives here as data: URLs, success-path
//! substrings, login-indicator keywords, DOM signatures, timeouts, and the
//! inverted-wait flag. The classifier and the login-wait loop are generic
//! over a [`PlatformProfile`]; adding a platform means adding a table entry,
//! not control flow.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::platform::Platform;

/// A page signature the provider can test for visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomSignature {
	/// A CSS selector matching at least one element.
	Css(String),
	/// A substring of the rendered body text.
	Text(String),
	/// A substring of the text of any element matched by `css`.
	TextIn { css: String, text: String },
}

impl DomSignature {
	pub fn css(selector: impl Into<String>) -> Self {
		DomSignature::Css(selector.into())
	}

	pub fn text(needle: impl Into<String>) -> Self {
		DomSignature::Text(needle.into())
	}

	pub fn text_in(css: impl Into<String>, text: impl Into<String>) -> Self {
		DomSignature::TextIn {
			css: css.into(),
			text: text.into(),
		}
	}
}

impl fmt::Display for DomSignature {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DomSignature::Css(sel) => write!(f, "css={sel}"),
			DomSignature::Text(text) => write!(f, "text={text}"),
			DomSignature::TextIn { css, text } => write!(f, "text_in={css}::{text}"),
		}
	}
}

/// Signal policy for the interactive login wait.
///
/// `negative` markers are still-on-the-login-wall signatures; any hit keeps
/// the wait going no matter what else looks promising. `positive` markers are
/// logged-in-surface signatures. Platforms with empty sets rely on the URL
/// signal alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginWaitPolicy {
	#[serde(default)]
	pub positive: Vec<DomSignature>,

	#[serde(default)]
	pub negative: Vec<DomSignature>,
}

fn default_network_idle_ms() -> u64 {
	10_000
}

fn default_selector_ms() -> u64 {
	5_000
}

/// Immutable descriptor of one platform's probe surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProfile {
	pub platform: Platform,

	/// Page a probe navigates to; redirects away from it are the primary
	/// logged-out signal.
	pub target_url: String,

	/// Substring the final URL must contain for the session to be considered
	/// on the authenticated surface.
	pub success_path: String,

	/// Entry page for the interactive capture flow.
	pub login_url: String,

	/// Case-insensitive substrings of a final URL that mark a login redirect.
	#[serde(default)]
	pub login_url_keywords: Vec<String>,

	/// Rendered-text variants of the platform's login wall.
	#[serde(default)]
	pub login_wall_texts: Vec<String>,

	/// Signature that appears only on the logged-out surface (or, with
	/// `inverted_wait`, only on the logged-in one).
	#[serde(default)]
	pub logged_out_selector: Option<DomSignature>,

	#[serde(default = "default_network_idle_ms")]
	pub network_idle_timeout_ms: u64,

	#[serde(default = "default_selector_ms")]
	pub selector_timeout_ms: u64,

	/// When true, `logged_out_selector` appearing proves a logged-in surface
	/// and the bounded wait elapsing proves the opposite.
	#[serde(default)]
	pub inverted_wait: bool,

	#[serde(default)]
	pub login_wait: LoginWaitPolicy,
}

impl PlatformProfile {
	pub fn network_idle_timeout(&self) -> Duration {
		Duration::from_millis(self.network_idle_timeout_ms)
	}

	pub fn selector_timeout(&self) -> Duration {
		Duration::from_millis(self.selector_timeout_ms)
	}

	/// True if `url` contains any login-indicator keyword (case-insensitive).
	pub fn url_hits_login_keyword(&self, url: &str) -> bool {
		let lower = url.to_lowercase();
		self.login_url_keywords.iter().any(|k| lower.contains(&k.to_lowercase()))
	}

	/// True if `url` contains the success-path substring.
	pub fn url_matches_success(&self, url: &str) -> bool {
		url.contains(&self.success_path)
	}
}

/// Lookup table of platform profiles.
///
/// [`ProfileTable::builtin`] carries the shipped constants; a deployment can
/// replace individual entries from a JSON file without touching code.
#[derive(Debug, Clone)]
pub struct ProfileTable {
	profiles: BTreeMap<Platform, PlatformProfile>,
}

impl ProfileTable {
	/// The shipped profile constants for all supported platforms.
	pub fn builtin() -> Self {
		let mut profiles = BTreeMap::new();
		for profile in builtin_profiles() {
			profiles.insert(profile.platform, profile);
		}
		Self { profiles }
	}

	/// Built-ins with overrides from a JSON array of profiles applied on top.
	pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
		let content = std::fs::read_to_string(path.as_ref())?;
		let overrides: Vec<PlatformProfile> = serde_json::from_str(&content)?;
		let mut table = Self::builtin();
		for profile in overrides {
			table.insert(profile);
		}
		Ok(table)
	}

	pub fn get(&self, platform: Platform) -> Option<&PlatformProfile> {
		self.profiles.get(&platform)
	}

	pub fn insert(&mut self, profile: PlatformProfile) {
		self.profiles.insert(profile.platform, profile);
	}

	pub fn iter(&self) -> impl Iterator<Item = &PlatformProfile> {
		self.profiles.values()
	}

	pub fn len(&self) -> usize {
		self.profiles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.profiles.is_empty()
	}
}

impl Default for ProfileTable {
	fn default() -> Self {
		Self::builtin()
	}
}

fn builtin_profiles() -> Vec<PlatformProfile> {
	vec![
		PlatformProfile {
			platform: Platform::Xiaohongshu,
			target_url: "https://creator.xiaohongshu.com/creator-micro/content/upload".into(),
			success_path: "creator.xiaohongshu.com/creator-micro/content/upload".into(),
			login_url: "https://creator.xiaohongshu.com/".into(),
			login_url_keywords: vec!["login".into()],
			login_wall_texts: vec!["手机号登录".into(), "扫码登录".into()],
			logged_out_selector: None,
			network_idle_timeout_ms: 10_000,
			selector_timeout_ms: 5_000,
			inverted_wait: false,
			login_wait: LoginWaitPolicy::default(),
		},
		PlatformProfile {
			platform: Platform::Tencent,
			target_url: "https://channels.weixin.qq.com/platform/post/create".into(),
			success_path: "channels.weixin.qq.com/platform/post/create".into(),
			login_url: "https://channels.weixin.qq.com".into(),
			login_url_keywords: vec!["login".into(), "connect".into(), "authorize".into()],
			login_wall_texts: Vec::new(),
			// The store banner only renders on the logged-out landing page.
			logged_out_selector: Some(DomSignature::text_in("div.title-name", "微信小店")),
			network_idle_timeout_ms: 10_000,
			selector_timeout_ms: 5_000,
			inverted_wait: false,
			login_wait: LoginWaitPolicy::default(),
		},
		PlatformProfile {
			platform: Platform::Douyin,
			target_url: "https://creator.douyin.com/creator-micro/content/upload".into(),
			success_path: "creator.douyin.com/creator-micro/content/upload".into(),
			login_url: "https://creator.douyin.com/".into(),
			login_url_keywords: vec!["login".into(), "passport".into()],
			login_wall_texts: vec!["手机号登录".into(), "扫码登录".into()],
			logged_out_selector: None,
			network_idle_timeout_ms: 10_000,
			selector_timeout_ms: 5_000,
			inverted_wait: false,
			login_wait: LoginWaitPolicy::default(),
		},
		PlatformProfile {
			platform: Platform::Kuaishou,
			target_url: "https://cp.kuaishou.com/article/publish/video".into(),
			success_path: "cp.kuaishou.com/article/publish/video".into(),
			login_url: "https://cp.kuaishou.com".into(),
			login_url_keywords: vec!["login".into(), "passport".into(), "auth".into()],
			login_wall_texts: Vec::new(),
			logged_out_selector: Some(DomSignature::text_in(
				"div.names div.container div.name",
				"机构服务",
			)),
			network_idle_timeout_ms: 10_000,
			selector_timeout_ms: 5_000,
			inverted_wait: false,
			login_wait: LoginWaitPolicy {
				positive: vec![
					DomSignature::text("首页"),
					DomSignature::text("内容管理"),
					DomSignature::text("发布作品"),
					DomSignature::text("上传视频"),
					DomSignature::text("继续编辑"),
					DomSignature::css("[role=\"navigation\"]"),
				],
				negative: vec![DomSignature::text("立即登录")],
			},
		},
	]
}
