//! Copilot fetch strategies.

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::{FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument};

use super::api;

/// Environment variables that may carry a GitHub token.
const TOKEN_ENV_VARS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

/// Copilot API-token strategy.
///
/// Token resolution order: manual override, the secure credential store,
/// then the conventional GitHub token environment variables.
pub struct CopilotApiStrategy;

impl CopilotApiStrategy {
    /// Creates a new API-token strategy.
    pub fn new() -> Self {
        Self
    }

    async fn resolve_token(&self, ctx: &FetchContext) -> Result<String, FetchError> {
        if let Some(manual) = ctx.settings.manual_token.as_deref() {
            if !manual.trim().is_empty() {
                return Ok(manual.trim().to_string());
            }
        }

        if ctx.preflight.will_prompt("quotabar:copilot", "token") {
            debug!("Secure store read may raise an interactive prompt");
        }
        if let Some(stored) = ctx.credentials.load_token().await? {
            if !stored.trim().is_empty() {
                return Ok(stored.trim().to_string());
            }
        }

        for var in TOKEN_ENV_VARS {
            if let Some(token) = ctx.env_var(var) {
                return Ok(token);
            }
        }

        Err(FetchError::NoCredentials)
    }
}

impl Default for CopilotApiStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for CopilotApiStrategy {
    fn id(&self) -> &str {
        "copilot.api"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Api
    }

    async fn is_available(&self, _ctx: &FetchContext) -> bool {
        // Probing the secure store here could raise an interactive prompt,
        // and manual/env tokens cannot be ruled out cheaply either way;
        // stay lazy and let fetch() classify the failure.
        true
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        let token = self.resolve_token(ctx).await?;
        api::fetch_usage(ctx, &token).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotabar_fetch::MemoryCredentialStore;
    use std::sync::Arc;

    #[test]
    fn test_strategy_identity() {
        let strategy = CopilotApiStrategy::new();
        assert_eq!(strategy.id(), "copilot.api");
        assert_eq!(strategy.kind(), StrategyKind::Api);
    }

    #[tokio::test]
    async fn test_token_resolution_order() {
        let strategy = CopilotApiStrategy::new();

        // Manual override wins over the store.
        let ctx = FetchContext::builder()
            .manual_token("manual-tok")
            .credentials(Arc::new(MemoryCredentialStore::with_token("store-tok")))
            .build();
        assert_eq!(strategy.resolve_token(&ctx).await.unwrap(), "manual-tok");

        // Store wins over the environment.
        let ctx = FetchContext::builder()
            .credentials(Arc::new(MemoryCredentialStore::with_token("store-tok")))
            .env("GITHUB_TOKEN", "env-tok")
            .build();
        assert_eq!(strategy.resolve_token(&ctx).await.unwrap(), "store-tok");

        // Environment as the last resort.
        let ctx = FetchContext::builder().env("GITHUB_TOKEN", "env-tok").build();
        assert_eq!(strategy.resolve_token(&ctx).await.unwrap(), "env-tok");
    }

    #[tokio::test]
    async fn test_no_token_anywhere() {
        // A real token in the surrounding environment would make this
        // assertion meaningless; skip in that case.
        if std::env::var("GITHUB_TOKEN").is_ok() || std::env::var("GH_TOKEN").is_ok() {
            return;
        }

        let strategy = CopilotApiStrategy::new();
        let ctx = FetchContext::new();
        assert!(matches!(
            strategy.resolve_token(&ctx).await,
            Err(FetchError::NoCredentials)
        ));
    }

    #[test]
    fn test_enterprise_host_override() {
        let ctx = FetchContext::builder()
            .env(api::ENTERPRISE_HOST_ENV, "https://github.example.com/api/v3/")
            .build();
        assert_eq!(api::resolve_host(&ctx), "https://github.example.com/api/v3");

        let ctx = FetchContext::new();
        assert_eq!(api::resolve_host(&ctx), "https://api.github.com");
    }
}
