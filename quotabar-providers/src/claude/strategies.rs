//! Claude fetch strategies.
//!
//! Preference order: OAuth (cheap, accurate) before the cookie-backed web
//! endpoint (costlier and more fragile).

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::host::browser::Browser;
use quotabar_fetch::{CookieSource, FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument};

use super::{api, oauth, web};

// ============================================================================
// OAuth Strategy
// ============================================================================

/// Claude OAuth strategy using tokens stored by the Claude CLI.
pub struct ClaudeOAuthStrategy;

impl ClaudeOAuthStrategy {
    /// Creates a new OAuth strategy.
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClaudeOAuthStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for ClaudeOAuthStrategy {
    fn id(&self) -> &str {
        "claude.oauth"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::OAuth
    }

    async fn is_available(&self, _ctx: &FetchContext) -> bool {
        // Probing credentials here could raise a secure-store prompt; stay
        // lazy and let fetch() classify the failure.
        true
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        let mut creds = oauth::load_credentials(ctx).await?;

        // Proactive refresh: unknown expiry counts as expired.
        if creds.is_expired() {
            debug!("OAuth credentials expired, refreshing");
            creds = oauth::refresh_credentials(ctx, &creds).await?;
        }

        api::fetch_usage(ctx, &creds).await
    }

    fn should_fallback(&self, error: &FetchError, _ctx: &FetchContext) -> bool {
        // Missing/invalid stored credentials just mean OAuth is not set up
        // on this machine; the web session may still work.
        match error {
            FetchError::NoCredentials | FetchError::InvalidStoredData(_) => true,
            other => !other.is_authoritative(),
        }
    }
}

// ============================================================================
// Web Strategy
// ============================================================================

/// Claude web strategy using a harvested or manually pasted cookie header.
pub struct ClaudeWebStrategy;

impl ClaudeWebStrategy {
    /// Creates a new web strategy.
    pub fn new() -> Self {
        Self
    }

    async fn resolve_cookie_header(&self, ctx: &FetchContext) -> Result<String, FetchError> {
        if let Some(manual) = ctx.settings.manual_cookie_header.as_deref() {
            if !manual.trim().is_empty() {
                return Ok(manual.trim().to_string());
            }
        }

        match ctx.settings.cookie_source {
            CookieSource::Off => Err(FetchError::NoCredentials),
            CookieSource::Manual => match ctx.credentials.load_cookie_header().await? {
                Some(header) if !header.trim().is_empty() => Ok(header),
                _ => Err(FetchError::NoCredentials),
            },
            CookieSource::Auto => {
                let domains = web::COOKIE_DOMAINS.iter().map(ToString::to_string).collect();
                let session = ctx
                    .browser
                    .import_session(domains, Browser::default_import_order().to_vec())
                    .await?;
                debug!(source = %session.source_label, cookies = session.cookies.len(), "Imported claude.ai session");
                Ok(session.cookie_header())
            }
        }
    }
}

impl Default for ClaudeWebStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for ClaudeWebStrategy {
    fn id(&self) -> &str {
        "claude.web"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Web
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        if ctx.settings.cookie_source == CookieSource::Off {
            return false;
        }
        if ctx
            .settings
            .manual_cookie_header
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
        {
            return true;
        }
        // Browser presence only; actual cookie import stays in fetch().
        !ctx.browser
            .available_browsers(Browser::default_import_order())
            .is_empty()
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        let cookie_header = self.resolve_cookie_header(ctx).await?;

        if !web::has_session_cookie(&cookie_header) {
            return Err(FetchError::NotLoggedIn(
                "no claude.ai session cookie found in any browser".to_string(),
            ));
        }

        web::fetch_usage(ctx, &cookie_header).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_identities() {
        assert_eq!(ClaudeOAuthStrategy::new().id(), "claude.oauth");
        assert_eq!(ClaudeOAuthStrategy::new().kind(), StrategyKind::OAuth);
        assert_eq!(ClaudeWebStrategy::new().id(), "claude.web");
        assert_eq!(ClaudeWebStrategy::new().kind(), StrategyKind::Web);
    }

    #[tokio::test]
    async fn test_oauth_falls_back_on_missing_credentials() {
        let strategy = ClaudeOAuthStrategy::new();
        let ctx = FetchContext::new();
        assert!(strategy.should_fallback(&FetchError::NoCredentials, &ctx));
        assert!(strategy.should_fallback(
            &FetchError::InvalidStoredData("bad json".to_string()),
            &ctx
        ));
        // Confirmed-expired sessions stay authoritative.
        assert!(!strategy.should_fallback(
            &FetchError::AuthenticationFailed("refresh rejected".to_string()),
            &ctx
        ));
        assert!(!strategy.should_fallback(
            &FetchError::UnsupportedConfiguration("bad grant".to_string()),
            &ctx
        ));
    }

    #[tokio::test]
    async fn test_web_unavailable_when_cookies_off() {
        let strategy = ClaudeWebStrategy::new();
        let ctx = FetchContext::builder().cookie_source(CookieSource::Off).build();
        assert!(!strategy.is_available(&ctx).await);
    }

    #[tokio::test]
    async fn test_web_available_with_manual_header() {
        let strategy = ClaudeWebStrategy::new();
        let ctx = FetchContext::builder()
            .cookie_source(CookieSource::Manual)
            .manual_cookie_header("sessionKey=abc")
            .build();
        assert!(strategy.is_available(&ctx).await);
    }

    #[tokio::test]
    async fn test_web_rejects_header_without_session_cookie() {
        let strategy = ClaudeWebStrategy::new();
        let ctx = FetchContext::builder()
            .cookie_source(CookieSource::Manual)
            .manual_cookie_header("tracking=1; theme=dark")
            .build();

        let err = strategy.fetch(&ctx).await.unwrap_err();
        assert!(matches!(err, FetchError::NotLoggedIn(_)));
    }
}
