//! Fetch strategy trait and types.
//!
//! A strategy is one concrete method of obtaining a usage snapshot for a
//! provider (session-log parse, API-token call, OAuth call, cookie-backed
//! web call). Providers register an ordered list of strategies that the
//! orchestrator executes with fallback.

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::FetchContext;
use crate::error::FetchError;

// ============================================================================
// Strategy Kind
// ============================================================================

/// The acquisition method a strategy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Local CLI state: session logs, auth files, IDE preference files.
    Cli,
    /// REST call with a stored personal/device token.
    Api,
    /// REST call with refreshable OAuth credentials.
    OAuth,
    /// Authenticated web endpoint reached with harvested browser cookies.
    Web,
}

impl StrategyKind {
    /// Stable source label recorded on successful fetch results.
    pub fn source_label(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Api => "api",
            Self::OAuth => "oauth",
            Self::Web => "web",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Cli => "CLI",
            Self::Api => "API Token",
            Self::OAuth => "OAuth",
            Self::Web => "Web Session",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Fetch Result
// ============================================================================

/// The result of a successful fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched usage snapshot.
    pub snapshot: UsageSnapshot,
    /// The strategy that produced it.
    pub strategy_id: String,
    /// The acquisition method used.
    pub kind: StrategyKind,
}

impl FetchResult {
    /// Creates a new fetch result.
    pub fn new(snapshot: UsageSnapshot, strategy_id: impl Into<String>, kind: StrategyKind) -> Self {
        Self {
            snapshot,
            strategy_id: strategy_id.into(),
            kind,
        }
    }

    /// Stable source label for this result.
    pub fn source_label(&self) -> &'static str {
        self.kind.source_label()
    }
}

// ============================================================================
// Fetch Strategy Trait
// ============================================================================

/// A strategy for fetching usage data from a provider.
///
/// Strategies receive an immutable [`FetchContext`] per attempt and must not
/// mutate shared state through it.
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    /// Unique identifier, formatted `{provider}.{method}`.
    fn id(&self) -> &str;

    /// The acquisition method this strategy uses.
    fn kind(&self) -> StrategyKind;

    /// Human-readable name for diagnostics.
    fn display_name(&self) -> String {
        format!("{} ({})", self.id(), self.kind().display_name())
    }

    /// Cheap, local precondition check.
    ///
    /// Must not perform network I/O, and must not trigger interactive
    /// credential prompts. A manual token being non-empty, a session-log
    /// directory existing, cookies not being disabled — that level of check.
    async fn is_available(&self, ctx: &FetchContext) -> bool;

    /// Performs the actual fetch.
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError>;

    /// Whether the orchestrator should try the next strategy after `error`.
    ///
    /// Authoritative failures (wrong grant type, confirmed logout) stop the
    /// pipeline so a weaker fallback cannot mask them with a different,
    /// less accurate error.
    fn should_fallback(&self, error: &FetchError, _ctx: &FetchContext) -> bool {
        !error.is_authoritative()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_labels() {
        assert_eq!(StrategyKind::Cli.source_label(), "cli");
        assert_eq!(StrategyKind::Api.source_label(), "api");
        assert_eq!(StrategyKind::OAuth.source_label(), "oauth");
        assert_eq!(StrategyKind::Web.source_label(), "web");
    }

    #[test]
    fn test_result_source_label() {
        use quotabar_core::{RateWindow, UsageSnapshot};

        let result = FetchResult::new(
            UsageSnapshot::new(RateWindow::new(10.0)),
            "claude.web",
            StrategyKind::Web,
        );
        assert_eq!(result.source_label(), "web");
        assert_eq!(result.strategy_id, "claude.web");
    }
}
