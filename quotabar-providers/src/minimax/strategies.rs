//! MiniMax fetch strategies.
//!
//! The platform authenticates single-page-app style: cookies are tried
//! first, and when they are missing or rejected the strategy falls back to
//! bearer tokens scraped from browser local/session storage (including the
//! group id claim the remains endpoint wants).

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::host::browser::Browser;
use quotabar_fetch::{CookieSource, FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument, warn};

use super::web;

/// MiniMax web strategy.
pub struct MiniMaxWebStrategy;

impl MiniMaxWebStrategy {
    /// Creates a new web strategy.
    pub fn new() -> Self {
        Self
    }

    /// Cookie header from manual settings or the browser importer; `None`
    /// when no cookie source produced anything.
    async fn resolve_cookie_header(&self, ctx: &FetchContext) -> Option<String> {
        if let Some(manual) = ctx.settings.manual_cookie_header.as_deref() {
            if !manual.trim().is_empty() {
                return Some(manual.trim().to_string());
            }
        }
        if let Some(env_header) = ctx.env_var(web::COOKIE_ENV) {
            return Some(env_header);
        }
        if ctx.settings.cookie_source == CookieSource::Off {
            return None;
        }

        let domains = web::COOKIE_DOMAINS.iter().map(ToString::to_string).collect();
        let sessions = ctx
            .browser
            .import_sessions(domains, Browser::default_import_order().to_vec())
            .await
            .ok()?;

        // Prefer the profile that actually carries the session cookie.
        let best = sessions
            .iter()
            .find(|s| s.cookies.iter().any(|c| c.name == web::SESSION_COOKIE))
            .or_else(|| sessions.first())?;
        debug!(source = %best.source_label, "Using MiniMax cookie session");
        Some(best.cookie_header())
    }

    async fn fetch_via_storage_tokens(
        &self,
        ctx: &FetchContext,
    ) -> Result<UsageSnapshot, FetchError> {
        let hints = web::ORIGIN_HINTS.iter().map(ToString::to_string).collect();
        let tokens = ctx
            .browser
            .import_storage_tokens(hints, Browser::default_import_order().to_vec())
            .await;

        if tokens.is_empty() {
            return Err(FetchError::NoCredentials);
        }

        let mut last_error = FetchError::NoCredentials;
        for token in &tokens {
            debug!(source = %token.source_label, "Trying storage token");
            match web::fetch_with_token(ctx, &token.token, token.group_id.as_deref()).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) => {
                    warn!(source = %token.source_label, error = %e, "Storage token rejected");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

impl Default for MiniMaxWebStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for MiniMaxWebStrategy {
    fn id(&self) -> &str {
        "minimax.web"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Web
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        if ctx
            .settings
            .manual_cookie_header
            .as_deref()
            .is_some_and(|h| !h.trim().is_empty())
            || ctx.env_var(web::COOKIE_ENV).is_some()
        {
            return true;
        }
        if ctx.settings.cookie_source == CookieSource::Off {
            return false;
        }
        !ctx.browser
            .available_browsers(Browser::default_import_order())
            .is_empty()
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        // Cookies first; storage tokens only when cookies are absent or
        // rejected.
        if let Some(cookie_header) = self.resolve_cookie_header(ctx).await {
            match web::fetch_with_cookies(ctx, &cookie_header).await {
                Ok(snapshot) => return Ok(snapshot),
                Err(e) if matches!(e, FetchError::ParseFailed(_)) => return Err(e),
                Err(e) => {
                    debug!(error = %e, "Cookie fetch failed, trying storage tokens");
                }
            }
        }

        self.fetch_via_storage_tokens(ctx).await
    }
}

// ============================================================================
// Tests
// ============================================================================
