//! Fetch error types.
//!
//! Every failure in the fetch pipeline is a value of [`FetchError`]; nothing
//! here aborts the process. The enum variant doubles as the machine-readable
//! kind tag, while `Display` carries the human-readable description shown
//! (truncated) by the UI layer.

use thiserror::Error;

// ============================================================================
// Main Fetch Error
// ============================================================================

/// Error type for fetch operations.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider's tool or data directory is not present on this machine.
    #[error("Not installed: {0}")]
    NotInstalled(String),

    /// The provider is installed but no login/session exists.
    #[error("Not logged in: {0}")]
    NotLoggedIn(String),

    /// The stored configuration cannot work with any strategy (e.g. an OAuth
    /// grant type the usage API does not accept). Authoritative: callers
    /// should not mask this by falling back.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Upstream data could not be parsed into a snapshot.
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    /// A network operation exceeded its deadline.
    #[error("Request timed out")]
    TimedOut,

    /// The provider API returned an unexpected response.
    #[error("API error: {0}")]
    Api(String),

    /// Credentials were rejected by the provider.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No usable credential was found in any configured source.
    #[error("No credentials found")]
    NoCredentials,

    /// The secure credential store itself failed.
    #[error("Secure store failure: {0}")]
    SecureStore(#[from] StoreError),

    /// Data loaded from the credential store did not have the expected shape.
    #[error("Invalid stored data: {0}")]
    InvalidStoredData(String),

    /// Browser credential import failed.
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON deserialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No strategy was attempted for the requested provider/mode.
    #[error("No fetch strategy available")]
    NoStrategyAvailable,

    /// The caller cancelled the fetch.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Default fallback classification for this error.
    ///
    /// Authoritative errors describe a wall every other strategy would hit
    /// identically; they stop the pipeline. Everything else is treated as
    /// strategy-local and falls through to the next strategy.
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self,
            Self::NotLoggedIn(_)
                | Self::UnsupportedConfiguration(_)
                | Self::AuthenticationFailed(_)
                | Self::Cancelled
        )
    }
}

// ============================================================================
// Store Error
// ============================================================================

/// Error type for the external secure credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry exists for the given service/account.
    #[error("Credential not found for {service}/{account}")]
    NotFound {
        /// Service name.
        service: String,
        /// Account name.
        account: String,
    },

    /// The OS denied access to the store.
    #[error("Access denied to secure store")]
    AccessDenied,

    /// Platform-specific failure, with the platform's code/message.
    #[error("Secure store platform error: {0}")]
    Platform(String),

    /// Any other store failure.
    #[error("Secure store error: {0}")]
    Other(String),
}

impl From<keyring::Error> for StoreError {
    fn from(err: keyring::Error) -> Self {
        match err {
            keyring::Error::NoEntry => StoreError::NotFound {
                service: String::new(),
                account: String::new(),
            },
            keyring::Error::NoStorageAccess(_) => StoreError::AccessDenied,
            keyring::Error::PlatformFailure(e) => StoreError::Platform(e.to_string()),
            _ => StoreError::Other(err.to_string()),
        }
    }
}

// ============================================================================
// Browser Error
// ============================================================================

/// Error type for browser credential import.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// No supported browser has profile data on this machine.
    #[error("No browsers with profile data available")]
    NoBrowsersAvailable,

    /// No browser yielded cookies matching the requested domains.
    #[error("No cookies found for domains: {0}")]
    NoCookies(String),

    /// A cookie store could not be read (lock contention, corruption).
    #[error("Failed to read cookie store: {0}")]
    ReadFailed(String),

    /// Chromium cookie decryption failed.
    #[error("Cookie decryption failed: {0}")]
    DecryptionFailed(String),

    /// No bearer token could be extracted from browser storage.
    #[error("No storage tokens found for origins: {0}")]
    NoStorageTokens(String),

    /// IO error while walking profile directories.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// HTTP Error
// ============================================================================

/// HTTP-specific error type used by the shared client.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Target host is outside the client's allowlist.
    #[error("Domain not allowed: {0}")]
    DomainNotAllowed(String),

    /// URL could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl From<HttpError> for FetchError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Request(e) if e.is_timeout() => FetchError::TimedOut,
            HttpError::Request(e) => FetchError::Http(e),
            HttpError::DomainNotAllowed(host) => {
                FetchError::UnsupportedConfiguration(format!("domain not allowed: {host}"))
            }
            HttpError::InvalidUrl(url) => {
                FetchError::UnsupportedConfiguration(format!("invalid URL: {url}"))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authoritative_classification() {
        assert!(FetchError::NotLoggedIn("x".into()).is_authoritative());
        assert!(FetchError::UnsupportedConfiguration("x".into()).is_authoritative());
        assert!(FetchError::AuthenticationFailed("x".into()).is_authoritative());
        assert!(FetchError::Cancelled.is_authoritative());

        assert!(!FetchError::ParseFailed("x".into()).is_authoritative());
        assert!(!FetchError::Api("500".into()).is_authoritative());
        assert!(!FetchError::TimedOut.is_authoritative());
        assert!(!FetchError::NoCredentials.is_authoritative());
    }

    #[test]
    fn test_store_error_from_keyring() {
        let err: StoreError = keyring::Error::NoEntry.into();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }
}
