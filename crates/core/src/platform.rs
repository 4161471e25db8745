//! Platform identifiers and caller-key normalization.
//!
//! Call sites address platforms three ways: canonical names ("kuaishou"),
//! short or localized aliases ("ks", "快手"), and small integer codes used by
//! the numeric dispatch path. [`Platform::resolve`] folds all of them into
//! one identifier; everything downstream works in terms of [`Platform`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
	Xiaohongshu,
	Tencent,
	Douyin,
	Kuaishou,
}

impl Platform {
	pub const ALL: [Platform; 4] = [
		Platform::Xiaohongshu,
		Platform::Tencent,
		Platform::Douyin,
		Platform::Kuaishou,
	];

	/// Integer code used by the numeric dispatch path.
	pub fn code(self) -> u8 {
		match self {
			Platform::Xiaohongshu => 1,
			Platform::Tencent => 2,
			Platform::Douyin => 3,
			Platform::Kuaishou => 4,
		}
	}

	pub fn from_code(code: u8) -> Option<Self> {
		match code {
			1 => Some(Platform::Xiaohongshu),
			2 => Some(Platform::Tencent),
			3 => Some(Platform::Douyin),
			4 => Some(Platform::Kuaishou),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Platform::Xiaohongshu => "xiaohongshu",
			Platform::Tencent => "tencent",
			Platform::Douyin => "douyin",
			Platform::Kuaishou => "kuaishou",
		}
	}

	pub fn aliases(self) -> &'static [&'static str] {
		match self {
			Platform::Xiaohongshu => &["xhs", "小红书"],
			Platform::Tencent => &["weixin", "wechat", "channels", "视频号"],
			Platform::Douyin => &["dy", "抖音"],
			Platform::Kuaishou => &["ks", "快手"],
		}
	}

	/// Normalizes a caller-supplied key (name, alias, or integer code).
	///
	/// Returns `None` for anything unknown; callers surface that as an
	/// unsupported-platform result, never as a panic or error.
	pub fn resolve(key: &str) -> Option<Self> {
		let key = key.trim();
		if key.is_empty() {
			return None;
		}
		if let Ok(code) = key.parse::<u8>() {
			return Self::from_code(code);
		}
		let lower = key.to_lowercase();
		Platform::ALL.into_iter().find(|p| {
			p.as_str() == lower || p.aliases().iter().any(|a| *a == lower)
		})
	}
}

impl fmt::Display for Platform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Platform {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		Platform::resolve(s).ok_or_else(|| {
			format!(
				"unsupported platform '{s}' (expected one of: {})",
				Platform::ALL.map(|p| p.as_str()).join(", ")
			)
		})
	}
}
