//! Augment fetch strategies.

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::host::browser::Browser;
use quotabar_fetch::{CookieSource, FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument};

use super::web;

/// Augment web strategy over a harvested or manual cookie header.
pub struct AugmentWebStrategy;

impl AugmentWebStrategy {
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
                debug!(source = %session.source_label, cookies = session.cookies.len(), "Imported Augment session");
                Ok(session.cookie_header())
            }
        }
    }
}

impl Default for AugmentWebStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for AugmentWebStrategy {
    fn id(&self) -> &str {
        "augment.web"
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
        !ctx.browser
            .available_browsers(Browser::default_import_order())
            .is_empty()
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        let cookie_header = self.resolve_cookie_header(ctx).await?;
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
    fn test_strategy_identity() {
        let strategy = AugmentWebStrategy::new();
        assert_eq!(strategy.id(), "augment.web");
        assert_eq!(strategy.kind(), StrategyKind::Web);
    }

    #[tokio::test]
    async fn test_unavailable_when_cookies_off() {
        let ctx = FetchContext::builder().cookie_source(CookieSource::Off).build();
        assert!(!AugmentWebStrategy::new().is_available(&ctx).await);
    }

    #[tokio::test]
    async fn test_manual_mode_without_header_is_no_credentials() {
        let strategy = AugmentWebStrategy::new();
        let ctx = FetchContext::builder()
            .cookie_source(CookieSource::Manual)
            .build();
        assert!(matches!(
            strategy.resolve_cookie_header(&ctx).await,
            Err(FetchError::NoCredentials)
        ));
    }

    #[tokio::test]
    async fn test_manual_header_wins() {
        let strategy = AugmentWebStrategy::new();
        let ctx = FetchContext::builder()
            .manual_cookie_header("  _session=abc  ")
            .build();
        assert_eq!(
            strategy.resolve_cookie_header(&ctx).await.unwrap(),
            "_session=abc"
        );
    }
}
