// Lint configuration for this crate
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! # `QuotaBar` Fetch
//!
//! The usage-fetch pipeline: host APIs, the strategy surface, the
//! orchestrating pipeline, and the session keepalive.
//!
//! ## Host APIs
//!
//! The [`host`] module wraps the system resources strategies depend on:
//!
//! - [`host::http`] - HTTP client with tracing and a domain allowlist
//! - [`host::credentials`] - external credential-store / preflight interfaces
//! - [`host::browser`] - browser cookie and storage-token harvesting
//!
//! ## Pipeline
//!
//! - [`strategy::FetchStrategy`] - one acquisition method for one provider
//! - [`orchestrator::StrategyPipeline`] - sequential execution with fallback
//! - [`context::FetchContext`] - immutable per-attempt settings and handles
//! - [`keepalive::SessionKeepalive`] - proactive browser-session refresh
//!
//! ## Example
//!
//! ```ignore
//! use quotabar_fetch::{FetchContext, StrategyPipeline};
//!
//! let ctx = FetchContext::new();
//! let pipeline = StrategyPipeline::new(vec![
//!     Box::new(ClaudeOAuthStrategy::new()),
//!     Box::new(ClaudeWebStrategy::new()),
//! ]);
//! let outcome = pipeline.execute(&ctx).await;
//! ```

pub mod cancel;
pub mod context;
pub mod error;
pub mod host;
pub mod keepalive;
pub mod orchestrator;
pub mod strategy;

// Errors
pub use error::{BrowserError, FetchError, HttpError, StoreError};

// Host APIs
pub use host::{
    browser::{Browser, BrowserImporter, BrowserSession, CookieRecord, CookieStoreKind},
    credentials::{
        CredentialStore, KeychainCredentialStore, KeychainPreflight, MemoryCredentialStore,
        NoPromptPreflight,
    },
    http::HttpClient,
};

// Pipeline
pub use cancel::CancelToken;
pub use context::{CookieSource, FetchContext, FetchContextBuilder, FetchSettings, SourceMode};
pub use keepalive::{KeepaliveConfig, KeepaliveStatus, SessionKeepalive, SessionProbePlan};
pub use orchestrator::{FetchAttempt, FetchOutcome, StrategyPipeline};
pub use strategy::{FetchResult, FetchStrategy, StrategyKind};
