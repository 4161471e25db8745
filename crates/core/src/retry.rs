//! Bounded, jittered backoff for transient navigation failures.
//!
//! Only [`ProbeError::Navigation`](crate::error::ProbeError) qualifies for a
//! retry; a classified login wall is authoritative and is never re-probed.
//! Jitter keeps a burst of concurrent checks from re-hitting an unhappy
//! network in lockstep.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Extra navigation attempts after the first. Zero disables retry.
	pub max_retries: u32,

	pub base_delay: Duration,

	pub max_delay: Duration,

	pub multiplier: f64,

	/// Scale each delay by a random factor in [0.8, 1.2].
	pub jitter: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 1,
			base_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(5),
			multiplier: 2.0,
			jitter: true,
		}
	}
}

impl RetryPolicy {
	pub fn none() -> Self {
		Self {
			max_retries: 0,
			..Self::default()
		}
	}

	/// Delay before retry number `attempt` (zero-based).
	pub fn delay_for(&self, attempt: u32) -> Duration {
		let exponential =
			self.base_delay.as_millis() as f64 * self.multiplier.powi(attempt as i32);
		let capped = exponential.min(self.max_delay.as_millis() as f64);
		let millis = if self.jitter {
			capped * rand::thread_rng().gen_range(0.8..=1.2)
		} else {
			capped
		};
		Duration::from_millis(millis as u64)
	}
}
