//! Provider strategy registry and the fetch orchestrator.
//!
//! Each provider's strategy list is static configuration: the preference
//! order below is built once at first use and reused for every fetch. The
//! orchestrator resolves `(provider, source mode)` to that list and runs it
//! through the sequential pipeline.

use std::sync::OnceLock;

use quotabar_core::ProviderKind;
use quotabar_fetch::{FetchContext, FetchOutcome, FetchStrategy, StrategyPipeline};

use crate::augment::AugmentWebStrategy;
use crate::claude::{ClaudeOAuthStrategy, ClaudeWebStrategy};
use crate::codex::CodexCliStrategy;
use crate::copilot::CopilotApiStrategy;
use crate::jetbrains::JetBrainsQuotaStrategy;
use crate::minimax::MiniMaxWebStrategy;

// ============================================================================
// Static strategy tables
// ============================================================================

/// Builds one provider's strategies in preference order.
fn build_strategies(provider: ProviderKind) -> Vec<Box<dyn FetchStrategy>> {
    match provider {
        ProviderKind::Codex => vec![Box::new(CodexCliStrategy::new())],
        // OAuth before the costlier, more fragile web scrape.
        ProviderKind::Claude => vec![
            Box::new(ClaudeOAuthStrategy::new()),
            Box::new(ClaudeWebStrategy::new()),
        ],
        ProviderKind::Copilot => vec![Box::new(CopilotApiStrategy::new())],
        ProviderKind::Augment => vec![Box::new(AugmentWebStrategy::new())],
        ProviderKind::MiniMax => vec![Box::new(MiniMaxWebStrategy::new())],
        ProviderKind::JetBrains => vec![Box::new(JetBrainsQuotaStrategy::new())],
    }
}

static PIPELINES: OnceLock<Vec<(ProviderKind, StrategyPipeline)>> = OnceLock::new();

fn pipelines() -> &'static [(ProviderKind, StrategyPipeline)] {
    PIPELINES.get_or_init(|| {
        ProviderKind::all()
            .iter()
            .map(|kind| (*kind, StrategyPipeline::new(build_strategies(*kind))))
            .collect()
    })
}

/// The static pipeline for one provider.
pub fn pipeline_for(provider: ProviderKind) -> &'static StrategyPipeline {
    pipelines()
        .iter()
        .find(|(kind, _)| *kind == provider)
        .map(|(_, pipeline)| pipeline)
        .expect("every provider kind has a pipeline")
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Resolves and executes fetch strategies for providers.
///
/// The orchestrator performs no I/O itself; all side effects live in the
/// strategies it runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator;

impl Orchestrator {
    /// Creates an orchestrator.
    pub fn new() -> Self {
        Self
    }

    /// Fetches a usage snapshot for `provider` under the context's source
    /// mode. Returns exactly one snapshot or exactly one error, plus the
    /// per-attempt provenance.
    pub async fn fetch(&self, provider: ProviderKind, ctx: &FetchContext) -> FetchOutcome {
        pipeline_for(provider).execute(ctx).await
    }

    /// Strategy ids the given context would admit for `provider`, in order.
    pub fn strategy_ids(&self, provider: ProviderKind, ctx: &FetchContext) -> Vec<String> {
        pipeline_for(provider)
            .eligible_ids(ctx)
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotabar_fetch::{FetchError, SourceMode};

    #[test]
    fn test_every_provider_has_strategies() {
        for kind in ProviderKind::all() {
            assert!(
                !pipeline_for(*kind).is_empty(),
                "{kind:?} must register at least one strategy"
            );
        }
    }

    #[test]
    fn test_claude_prefers_oauth_over_web() {
        let ctx = FetchContext::new();
        let ids = Orchestrator::new().strategy_ids(ProviderKind::Claude, &ctx);
        assert_eq!(ids, vec!["claude.oauth", "claude.web"]);
    }

    #[test]
    fn test_mode_restricts_strategy_list() {
        let ctx = FetchContext::builder().source_mode(SourceMode::Web).build();
        let ids = Orchestrator::new().strategy_ids(ProviderKind::Claude, &ctx);
        assert_eq!(ids, vec!["claude.web"]);
    }

    #[tokio::test]
    async fn test_mode_without_matching_strategy() {
        let ctx = FetchContext::builder().source_mode(SourceMode::OAuth).build();
        let outcome = Orchestrator::new().fetch(ProviderKind::Codex, &ctx).await;
        assert!(matches!(
            outcome.result,
            Err(FetchError::NoStrategyAvailable)
        ));
    }

    #[tokio::test]
    async fn test_codex_fetch_end_to_end_with_source_label() {
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
            .env(
                crate::codex::session_log::CODEX_HOME_ENV,
                dir.path().display().to_string(),
            )
            .build();

        let outcome = Orchestrator::new().fetch(ProviderKind::Codex, &ctx).await;
        let result = outcome.result.unwrap();
        assert_eq!(result.source_label(), "cli");
        assert_eq!(result.strategy_id, "codex.cli");
        assert_eq!(result.snapshot.primary.used_percent, 25.0);
        assert_eq!(result.snapshot.primary.remaining_percent(), 75.0);
    }
}
