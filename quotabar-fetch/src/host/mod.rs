//! Host APIs: system resources the fetch strategies depend on.
//!
//! - [`http`] - HTTP client with tracing and a domain allowlist
//! - [`credentials`] - credential-store and keychain-preflight interfaces
//! - [`browser`] - browser cookie and storage-token import

pub mod browser;
pub mod credentials;
pub mod http;
