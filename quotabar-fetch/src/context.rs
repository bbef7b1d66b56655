//! Fetch context: the immutable per-attempt view of settings and host APIs.
//!
//! Strategies never read ambient global state; every knob they may consult
//! (source mode, timeouts, manual overrides, environment variables) travels
//! through one [`FetchContext`] value constructed by the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::host::browser::BrowserImporter;
use crate::host::credentials::{
    CredentialStore, KeychainPreflight, MemoryCredentialStore, NoPromptPreflight,
};
use crate::host::http::HttpClient;
use crate::strategy::StrategyKind;

// ============================================================================
// Source Mode
// ============================================================================

/// Caller-selected restriction on which strategy kinds may be tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceMode {
    /// Full provider-preference order.
    #[default]
    Auto,
    /// Only local CLI state strategies.
    Cli,
    /// Only API-token strategies.
    Api,
    /// Only OAuth strategies.
    OAuth,
    /// Only web/cookie strategies.
    Web,
}

impl SourceMode {
    /// Whether this mode admits a strategy of the given kind.
    pub fn allows(&self, kind: StrategyKind) -> bool {
        match self {
            Self::Auto => true,
            Self::Cli => kind == StrategyKind::Cli,
            Self::Api => kind == StrategyKind::Api,
            Self::OAuth => kind == StrategyKind::OAuth,
            Self::Web => kind == StrategyKind::Web,
        }
    }

    /// Parses a mode from its CLI spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "cli" => Some(Self::Cli),
            "api" => Some(Self::Api),
            "oauth" => Some(Self::OAuth),
            "web" => Some(Self::Web),
            _ => None,
        }
    }
}

// ============================================================================
// Cookie Source
// ============================================================================

/// Where web strategies may take their cookie header from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CookieSource {
    /// Harvest from installed browsers.
    #[default]
    Auto,
    /// Use only the manually pasted cookie header.
    Manual,
    /// Cookies disabled; web strategies are unavailable.
    Off,
}

// ============================================================================
// Fetch Settings
// ============================================================================

/// Per-attempt fetch settings.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Which strategy kinds to allow.
    pub source_mode: SourceMode,
    /// Deadline for network operations.
    pub timeout: Duration,
    /// Cookie sourcing policy for web strategies.
    pub cookie_source: CookieSource,
    /// Manually pasted cookie header, used when `cookie_source` permits.
    pub manual_cookie_header: Option<String>,
    /// Manually configured bearer/API token.
    pub manual_token: Option<String>,
    /// Environment overrides consulted before the process environment.
    pub env: HashMap<String, String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            source_mode: SourceMode::Auto,
            timeout: Duration::from_secs(30),
            cookie_source: CookieSource::Auto,
            manual_cookie_header: None,
            manual_token: None,
            env: HashMap::new(),
        }
    }
}

// ============================================================================
// Fetch Context
// ============================================================================

/// Read-only value describing one fetch attempt.
///
/// Cloning is cheap (everything heavy is behind an `Arc`); strategies
/// receive a shared reference and must not mutate shared state through it.
#[derive(Clone)]
pub struct FetchContext {
    /// Shared HTTP client.
    pub http: Arc<HttpClient>,
    /// External secure credential store for this provider+account.
    pub credentials: Arc<dyn CredentialStore>,
    /// Keychain prompt preflight.
    pub preflight: Arc<dyn KeychainPreflight>,
    /// Browser cookie/storage importer.
    pub browser: Arc<BrowserImporter>,
    /// Per-attempt settings.
    pub settings: FetchSettings,
    /// Cancellation token observed by the orchestrator.
    pub cancel: CancelToken,
}

impl FetchContext {
    /// Creates a context with default host implementations and settings.
    ///
    /// The default credential store is in-memory; callers wire a real
    /// store via [`FetchContext::builder`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for customizing the context.
    pub fn builder() -> FetchContextBuilder {
        FetchContextBuilder::new()
    }

    /// Effective network deadline for this attempt.
    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Looks up an environment variable, preferring per-context overrides.
    ///
    /// Values are trimmed; surrounding single/double quotes (common in
    /// copy-pasted shell exports) are stripped. Empty results become `None`.
    pub fn env_var(&self, name: &str) -> Option<String> {
        let raw = self
            .settings
            .env
            .get(name)
            .cloned()
            .or_else(|| std::env::var(name).ok())?;
        clean_env_value(&raw)
    }
}

fn clean_env_value(raw: &str) -> Option<String> {
    let mut value = raw.trim();
    if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
    {
        value = &value[1..value.len() - 1];
    }
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl Default for FetchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`FetchContext`].
pub struct FetchContextBuilder {
    http: Option<Arc<HttpClient>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    preflight: Option<Arc<dyn KeychainPreflight>>,
    browser: Option<Arc<BrowserImporter>>,
    settings: FetchSettings,
    cancel: Option<CancelToken>,
}

impl FetchContextBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            http: None,
            credentials: None,
            preflight: None,
            browser: None,
            settings: FetchSettings::default(),
            cancel: None,
        }
    }

    /// Sets the HTTP client.
    pub fn http(mut self, http: Arc<HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    /// Sets the credential store.
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Sets the keychain preflight.
    pub fn preflight(mut self, preflight: Arc<dyn KeychainPreflight>) -> Self {
        self.preflight = Some(preflight);
        self
    }

    /// Sets the browser importer.
    pub fn browser(mut self, browser: Arc<BrowserImporter>) -> Self {
        self.browser = Some(browser);
        self
    }

    /// Replaces the settings wholesale.
    pub fn settings(mut self, settings: FetchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the source mode.
    pub fn source_mode(mut self, mode: SourceMode) -> Self {
        self.settings.source_mode = mode;
        self
    }

    /// Sets the network timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Sets the cookie source policy.
    pub fn cookie_source(mut self, source: CookieSource) -> Self {
        self.settings.cookie_source = source;
        self
    }

    /// Sets a manual cookie header override.
    pub fn manual_cookie_header(mut self, header: impl Into<String>) -> Self {
        self.settings.manual_cookie_header = Some(header.into());
        self
    }

    /// Sets a manual token override.
    pub fn manual_token(mut self, token: impl Into<String>) -> Self {
        self.settings.manual_token = Some(token.into());
        self
    }

    /// Adds an environment override.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.env.insert(name.into(), value.into());
        self
    }

    /// Sets the cancellation token.
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Builds the context.
    pub fn build(self) -> FetchContext {
        FetchContext {
            http: self.http.unwrap_or_else(|| Arc::new(HttpClient::new())),
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
            preflight: self
                .preflight
                .unwrap_or_else(|| Arc::new(NoPromptPreflight)),
            browser: self.browser.unwrap_or_else(|| Arc::new(BrowserImporter::new())),
            settings: self.settings,
            cancel: self.cancel.unwrap_or_default(),
        }
    }
}

impl Default for FetchContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_mode_allows() {
        assert!(SourceMode::Auto.allows(StrategyKind::Cli));
        assert!(SourceMode::Auto.allows(StrategyKind::Web));

        assert!(SourceMode::Cli.allows(StrategyKind::Cli));
        assert!(!SourceMode::Cli.allows(StrategyKind::Web));

        assert!(SourceMode::OAuth.allows(StrategyKind::OAuth));
        assert!(!SourceMode::OAuth.allows(StrategyKind::Api));
    }

    #[test]
    fn test_source_mode_parse() {
        assert_eq!(SourceMode::parse("auto"), Some(SourceMode::Auto));
        assert_eq!(SourceMode::parse("OAuth"), Some(SourceMode::OAuth));
        assert_eq!(SourceMode::parse("bogus"), None);
    }

    #[test]
    fn test_builder() {
        let ctx = FetchContext::builder()
            .source_mode(SourceMode::Web)
            .timeout(Duration::from_secs(60))
            .manual_token("tok")
            .build();

        assert_eq!(ctx.settings.source_mode, SourceMode::Web);
        assert_eq!(ctx.timeout(), Duration::from_secs(60));
        assert_eq!(ctx.settings.manual_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_env_override_beats_process_env() {
        let ctx = FetchContext::builder()
            .env("QUOTABAR_TEST_HOME", "/custom/home")
            .build();
        assert_eq!(
            ctx.env_var("QUOTABAR_TEST_HOME").as_deref(),
            Some("/custom/home")
        );
        assert_eq!(ctx.env_var("QUOTABAR_TEST_UNSET_VAR"), None);
    }

    #[test]
    fn test_env_value_cleaning() {
        assert_eq!(clean_env_value("  plain "), Some("plain".to_string()));
        assert_eq!(clean_env_value("\"quoted\""), Some("quoted".to_string()));
        assert_eq!(clean_env_value("'quoted'"), Some("quoted".to_string()));
        assert_eq!(clean_env_value("  "), None);
        assert_eq!(clean_env_value("\"\""), None);
    }
}
