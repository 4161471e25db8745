//! sessionprobe: browser-driven session validity checks
//!
//! Given a stored session blob and a platform id, this crate answers one
//! question inside a bounded time window: does the session still
//! authenticate? It does so by loading the blob into a throwaway browser
//! context, steering at the platform's creator page, and classifying what
//! the page settles into:
//!
//! - **Platform registry**: per-platform URLs, login keywords, and DOM
//!   signatures ([`platform`], [`profile`])
//! - **Classifier**: the bounded-wait decision procedure ([`classifier`])
//! - **Login wait**: interactive login-completion detection ([`login_wait`])
//! - **Dispatch**: concurrency-capped entry point over a platform table
//!   ([`dispatch`])
//! - **Provider**: the browser seam, with a Chrome DevTools implementation
//!   ([`provider`], [`cdp`]) and a scripted one for tests ([`testing`])
//!
//! The timeout inversion at the heart of the classifier is deliberate: on a
//! normal profile, a logged-out marker that never appears within its wait
//! window is the success signal, not a failure.

pub mod cdp;
pub mod classifier;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod login_wait;
pub mod platform;
pub mod profile;
pub mod provider;
pub mod retry;
pub mod testing;

// Re-export key types at crate root
pub use tokio_util::sync::CancellationToken;

pub use classifier::{ProbeReason, ProbeResult, ValidityClassifier};
pub use credential::{Cookie, LocalStorageEntry, OriginState, SameSite, SessionCredential};
pub use dispatch::{Dispatcher, DispatcherConfig};
pub use error::{ProbeError, Result};
pub use login_wait::{DetectedVia, LoginWaitState, LoginWaiter};
pub use platform::Platform;
pub use profile::{DomSignature, LoginWaitPolicy, PlatformProfile, ProfileTable};
pub use provider::{BrowserProvider, OpenOptions, ProbeSession, WaitOutcome};
pub use retry::RetryPolicy;
