//! Sequential strategy execution with fallback.
//!
//! A [`StrategyPipeline`] owns one provider's preference-ordered strategy
//! list. Execution is strictly sequential: no strategy starts before the
//! previous one's outcome is known, a success returns immediately, and an
//! authoritative failure stops the pipeline instead of being masked by a
//! weaker fallback.

use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::context::FetchContext;
use crate::error::FetchError;
use crate::strategy::{FetchResult, FetchStrategy, StrategyKind};

// ============================================================================
// Attempt Bookkeeping
// ============================================================================

/// Record of a single strategy attempt, for diagnostics.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    /// The strategy that was attempted.
    pub strategy_id: String,
    /// The strategy's acquisition method.
    pub kind: StrategyKind,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error description for failed attempts ("not available" for skips).
    pub error: Option<String>,
    /// How long the attempt took.
    pub duration: Duration,
}

impl FetchAttempt {
    fn success(strategy_id: &str, kind: StrategyKind, duration: Duration) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            kind,
            success: true,
            error: None,
            duration,
        }
    }

    fn failure(strategy_id: &str, kind: StrategyKind, error: String, duration: Duration) -> Self {
        Self {
            strategy_id: strategy_id.to_string(),
            kind,
            success: false,
            error: Some(error),
            duration,
        }
    }
}

/// The outcome of one pipeline execution.
///
/// `result` is the caller-facing contract: exactly one snapshot or exactly
/// one error. `attempts` carries the provenance of every strategy tried.
#[derive(Debug)]
pub struct FetchOutcome {
    /// The final result.
    pub result: Result<FetchResult, FetchError>,
    /// Every attempt made, in execution order.
    pub attempts: Vec<FetchAttempt>,
    /// Total wall-clock duration.
    pub duration: Duration,
}

impl FetchOutcome {
    /// Returns true if the fetch succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// The strategy that produced the snapshot, if any.
    pub fn successful_strategy(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|r| r.strategy_id.as_str())
    }
}

// ============================================================================
// Strategy Pipeline
// ============================================================================

/// One provider's ordered strategy list.
pub struct StrategyPipeline {
    strategies: Vec<Box<dyn FetchStrategy>>,
}

impl StrategyPipeline {
    /// Creates a pipeline. Order is the provider's preference order; it is
    /// preserved as given.
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>) -> Self {
        Self { strategies }
    }

    /// Number of registered strategies (before mode filtering).
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    /// Returns true if no strategies are registered.
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Strategy ids admitted by the context's source mode, in order.
    pub fn eligible_ids(&self, ctx: &FetchContext) -> Vec<&str> {
        self.strategies
            .iter()
            .filter(|s| ctx.settings.source_mode.allows(s.kind()))
            .map(|s| s.id())
            .collect()
    }

    /// Executes the pipeline against one fetch context.
    #[instrument(skip(self, ctx), fields(strategies = self.strategies.len()))]
    pub async fn execute(&self, ctx: &FetchContext) -> FetchOutcome {
        let start = Instant::now();
        let mut attempts = Vec::new();
        let mut last_error: Option<FetchError> = None;

        let eligible: Vec<&dyn FetchStrategy> = self
            .strategies
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| ctx.settings.source_mode.allows(s.kind()))
            .collect();

        if eligible.is_empty() {
            return FetchOutcome {
                result: Err(FetchError::NoStrategyAvailable),
                attempts,
                duration: start.elapsed(),
            };
        }

        info!(count = eligible.len(), "Executing fetch pipeline");

        for strategy in eligible {
            if ctx.cancel.is_cancelled() {
                debug!("Fetch cancelled before next strategy");
                return FetchOutcome {
                    result: Err(FetchError::Cancelled),
                    attempts,
                    duration: start.elapsed(),
                };
            }

            let strategy_id = strategy.id();
            let kind = strategy.kind();

            if !strategy.is_available(ctx).await {
                debug!(strategy = %strategy_id, "Strategy not available, skipping");
                attempts.push(FetchAttempt::failure(
                    strategy_id,
                    kind,
                    "not available".to_string(),
                    Duration::ZERO,
                ));
                continue;
            }

            let attempt_start = Instant::now();
            debug!(strategy = %strategy_id, "Executing strategy");

            let result = tokio::select! {
                res = strategy.fetch(ctx) => res,
                () = ctx.cancel.cancelled() => Err(FetchError::Cancelled),
            };

            match result {
                Ok(snapshot) => {
                    let duration = attempt_start.elapsed();
                    info!(strategy = %strategy_id, ?duration, "Strategy succeeded");
                    attempts.push(FetchAttempt::success(strategy_id, kind, duration));
                    return FetchOutcome {
                        result: Ok(FetchResult::new(snapshot, strategy_id, kind)),
                        attempts,
                        duration: start.elapsed(),
                    };
                }
                Err(error) => {
                    let duration = attempt_start.elapsed();
                    warn!(strategy = %strategy_id, error = %error, ?duration, "Strategy failed");
                    attempts.push(FetchAttempt::failure(
                        strategy_id,
                        kind,
                        error.to_string(),
                        duration,
                    ));

                    let stop = matches!(error, FetchError::Cancelled)
                        || !strategy.should_fallback(&error, ctx);
                    if stop {
                        debug!(strategy = %strategy_id, "Error is authoritative, stopping pipeline");
                        return FetchOutcome {
                            result: Err(error),
                            attempts,
                            duration: start.elapsed(),
                        };
                    }
                    last_error = Some(error);
                }
            }
        }

        // Exhausted: surface the last real failure, or report that nothing
        // could even be attempted.
        let result = match last_error {
            Some(error) => Err(error),
            None => Err(FetchError::NoStrategyAvailable),
        };
        FetchOutcome {
            result,
            attempts,
            duration: start.elapsed(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quotabar_core::{RateWindow, UsageSnapshot};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockStrategy {
        id: String,
        kind: StrategyKind,
        available: bool,
        fails: bool,
        fallback: bool,
        calls: Arc<AtomicUsize>,
        delay: Option<Duration>,
    }

    impl MockStrategy {
        fn succeeding(id: &str) -> Self {
            Self {
                id: id.to_string(),
                kind: StrategyKind::Cli,
                available: true,
                fails: false,
                fallback: true,
                calls: Arc::new(AtomicUsize::new(0)),
                delay: None,
            }
        }

        fn failing(id: &str, fallback: bool) -> Self {
            Self {
                fails: true,
                fallback,
                ..Self::succeeding(id)
            }
        }

        fn unavailable(id: &str) -> Self {
            Self {
                available: false,
                ..Self::succeeding(id)
            }
        }

        fn kind(mut self, kind: StrategyKind) -> Self {
            self.kind = kind;
            self
        }

        fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn call_counter(&self) -> Arc<AtomicUsize> {
            Arc::clone(&self.calls)
        }
    }

    #[async_trait]
    impl FetchStrategy for MockStrategy {
        fn id(&self) -> &str {
            &self.id
        }

        fn kind(&self) -> StrategyKind {
            self.kind
        }

        async fn is_available(&self, _ctx: &FetchContext) -> bool {
            self.available
        }

        async fn fetch(&self, _ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fails {
                Err(FetchError::ParseFailed("mock failure".to_string()))
            } else {
                Ok(UsageSnapshot::new(RateWindow::new(10.0)))
            }
        }

        fn should_fallback(&self, _error: &FetchError, _ctx: &FetchContext) -> bool {
            self.fallback
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline() {
        let pipeline = StrategyPipeline::new(vec![]);
        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert!(matches!(outcome.result, Err(FetchError::NoStrategyAvailable)));
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let second = MockStrategy::succeeding("test.second");
        let second_calls = second.call_counter();

        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::succeeding("test.first")),
            Box::new(second),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert_eq!(outcome.successful_strategy(), Some("test.first"));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::failing("test.fail", true)),
            Box::new(MockStrategy::succeeding("test.success")),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert!(outcome.is_success());
        assert_eq!(outcome.successful_strategy(), Some("test.success"));
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_no_fallback_stops_pipeline() {
        let second = MockStrategy::succeeding("test.never");
        let second_calls = second.call_counter();

        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::failing("test.authoritative", false)),
            Box::new(second),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.attempts.len(), 1);
        // The later strategy must never have been invoked.
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_unavailable() {
        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::unavailable("test.unavailable")),
            Box::new(MockStrategy::succeeding("test.available")),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert_eq!(outcome.successful_strategy(), Some("test.available"));
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
    }

    #[tokio::test]
    async fn test_all_unavailable_reports_no_strategy() {
        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::unavailable("test.a")),
            Box::new(MockStrategy::unavailable("test.b")),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert!(matches!(outcome.result, Err(FetchError::NoStrategyAvailable)));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::failing("test.a", true)),
            Box::new(MockStrategy::failing("test.b", true)),
        ]);

        let outcome = pipeline.execute(&FetchContext::new()).await;
        assert!(matches!(outcome.result, Err(FetchError::ParseFailed(_))));
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[tokio::test]
    async fn test_mode_filters_strategies() {
        let cli = MockStrategy::succeeding("test.cli").kind(StrategyKind::Cli);
        let cli_calls = cli.call_counter();
        let web = MockStrategy::succeeding("test.web").kind(StrategyKind::Web);

        let pipeline = StrategyPipeline::new(vec![Box::new(cli), Box::new(web)]);

        let ctx = FetchContext::builder()
            .source_mode(crate::context::SourceMode::Web)
            .build();
        let outcome = pipeline.execute(&ctx).await;

        assert_eq!(outcome.successful_strategy(), Some("test.web"));
        assert_eq!(cli_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mode_with_no_matching_strategies() {
        let pipeline = StrategyPipeline::new(vec![
            Box::new(MockStrategy::succeeding("test.cli").kind(StrategyKind::Cli)),
        ]);

        let ctx = FetchContext::builder()
            .source_mode(crate::context::SourceMode::OAuth)
            .build();
        let outcome = pipeline.execute(&ctx).await;
        assert!(matches!(outcome.result, Err(FetchError::NoStrategyAvailable)));
    }

    #[tokio::test]
    async fn test_cancel_before_execute() {
        let strategy = MockStrategy::succeeding("test.s");
        let calls = strategy.call_counter();
        let pipeline = StrategyPipeline::new(vec![Box::new(strategy)]);

        let ctx = FetchContext::new();
        ctx.cancel.cancel();

        let outcome = pipeline.execute(&ctx).await;
        assert!(matches!(outcome.result, Err(FetchError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_strategy() {
        let slow =
            MockStrategy::succeeding("test.slow").delayed(Duration::from_secs(30));
        let second = MockStrategy::succeeding("test.after");
        let second_calls = second.call_counter();

        let pipeline = StrategyPipeline::new(vec![Box::new(slow), Box::new(second)]);
        let ctx = FetchContext::new();
        let cancel = ctx.cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), pipeline.execute(&ctx))
                .await
                .expect("cancellation must interrupt the slow strategy");
        assert!(matches!(outcome.result, Err(FetchError::Cancelled)));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }
}
