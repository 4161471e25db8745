use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProbeError>;

/// Failure taxonomy for a probe.
///
/// A bounded wait elapsing is never an error; provider waits report
/// [`WaitOutcome::TimedOut`](crate::provider::WaitOutcome) and the classifier
/// decides what an elapsed window means for the platform at hand.
#[derive(Debug, Error)]
pub enum ProbeError {
	#[error("credential file not found: {}", path.display())]
	CredentialNotFound { path: PathBuf },

	#[error("credential file {} is not valid storage state", path.display())]
	CredentialFormat {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("browser launch failed: {0}")]
	Launch(String),

	#[error("navigation failed: {url}")]
	Navigation {
		url: String,
		#[source]
		source: anyhow::Error,
	},

	#[error("devtools call failed")]
	Cdp(#[from] crate::cdp::CdpError),

	#[error("javascript evaluation failed: {0}")]
	JsEval(String),

	#[error("cancelled")]
	Cancelled,

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Unexpected(#[from] anyhow::Error),
}

impl ProbeError {
	/// Navigation failures are the only class the retry policy applies to.
	pub fn is_navigation(&self) -> bool {
		matches!(self, ProbeError::Navigation { .. })
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, ProbeError::Cancelled)
	}

	/// Missing or unparseable credential files classify as `NOT_FOUND`
	/// rather than `EXCEPTION`.
	pub fn is_credential(&self) -> bool {
		matches!(
			self,
			ProbeError::CredentialNotFound { .. } | ProbeError::CredentialFormat { .. }
		)
	}

	/// Full cause chain as one line, for `ProbeResult.detail` and logs.
	pub fn chain(&self) -> String {
		let mut out = self.to_string();
		let mut source = std::error::Error::source(self);
		while let Some(cause) = source {
			out.push_str(": ");
			out.push_str(&cause.to_string());
			source = cause.source();
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn chain_includes_sources() {
		let err = ProbeError::Navigation {
			url: "https://example.com".into(),
			source: anyhow::anyhow!("net::ERR_NAME_NOT_RESOLVED"),
		};
		let chain = err.chain();
		assert!(chain.contains("https://example.com"));
		assert!(chain.contains("ERR_NAME_NOT_RESOLVED"));
	}

	#[test]
	fn classification_helpers() {
		let nav = ProbeError::Navigation {
			url: "https://a".into(),
			source: anyhow::anyhow!("refused"),
		};
		assert!(nav.is_navigation());
		assert!(!nav.is_credential());

		let missing = ProbeError::CredentialNotFound {
			path: PathBuf::from("/tmp/nope.json"),
		};
		assert!(missing.is_credential());
		assert!(!missing.is_navigation());
		assert!(ProbeError::Cancelled.is_cancelled());
	}
}
