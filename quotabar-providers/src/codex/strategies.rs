//! Codex fetch strategies.

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::{FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument};

use super::session_log::SessionLogReader;

/// Codex CLI-log strategy.
///
/// Parses the structured session logs the Codex CLI writes locally; no
/// network involved.
pub struct CodexCliStrategy;

impl CodexCliStrategy {
    /// Creates a new CLI-log strategy.
    pub fn new() -> Self {
        Self
    }
}

impl Default for CodexCliStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for CodexCliStrategy {
    fn id(&self) -> &str {
        "codex.cli"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Cli
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        // Session logs on disk, or at least the binary on PATH (so the
        // NotInstalled error from fetch() stays accurate).
        SessionLogReader::from_context(ctx).is_some_and(|r| r.has_sessions())
            || which::which("codex").is_ok()
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        debug!("Fetching Codex usage from session logs");

        let reader = SessionLogReader::from_context(ctx).ok_or_else(|| {
            FetchError::NotInstalled("could not determine home directory".to_string())
        })?;

        // Log scanning is file IO; keep it off the async worker.
        let scan_reader = reader.clone();
        let mut snapshot = tokio::task::spawn_blocking(move || scan_reader.latest_snapshot())
            .await
            .map_err(|e| FetchError::ParseFailed(format!("scan task failed: {e}")))??;

        snapshot.identity = reader.account_identity();
        Ok(snapshot)
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
        let strategy = CodexCliStrategy::new();
        assert_eq!(strategy.id(), "codex.cli");
        assert_eq!(strategy.kind(), StrategyKind::Cli);
    }

    #[tokio::test]
    async fn test_fetch_with_custom_home() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let sessions = dir.path().join("sessions");
        std::fs::create_dir_all(&sessions).unwrap();
        let mut file =
            std::fs::File::create(sessions.join("rollout-2025-11-16.jsonl")).unwrap();
        writeln!(
            file,
            r#"{{"type":"token_count","payload":{{"rate_limits":{{"primary":{{"used_percent":25,"resets_at":1763320800}}}}}}}}"#
        )
        .unwrap();

        let ctx = FetchContext::builder()
            .env(super::super::session_log::CODEX_HOME_ENV, dir.path().display().to_string())
            .build();

        let strategy = CodexCliStrategy::new();
        assert!(strategy.is_available(&ctx).await);

        let snapshot = strategy.fetch(&ctx).await.unwrap();
        assert_eq!(snapshot.primary.used_percent, 25.0);
        assert_eq!(snapshot.primary.remaining_percent(), 75.0);
    }
}
