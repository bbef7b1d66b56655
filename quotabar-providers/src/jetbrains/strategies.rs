//! JetBrains AI fetch strategies.

use async_trait::async_trait;
use quotabar_core::UsageSnapshot;
use quotabar_fetch::{FetchContext, FetchError, FetchStrategy, StrategyKind};
use tracing::{debug, instrument};

use super::quota_xml;

/// JetBrains AI quota strategy: reads the IDE's local options XML.
pub struct JetBrainsQuotaStrategy;

impl JetBrainsQuotaStrategy {
    /// Creates a new quota-file strategy.
    pub fn new() -> Self {
        Self
    }
}

impl Default for JetBrainsQuotaStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchStrategy for JetBrainsQuotaStrategy {
    fn id(&self) -> &str {
        "jetbrains.quota"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Cli
    }

    async fn is_available(&self, ctx: &FetchContext) -> bool {
        !quota_xml::quota_files(ctx).is_empty()
    }

    #[instrument(skip(self, ctx))]
    async fn fetch(&self, ctx: &FetchContext) -> Result<UsageSnapshot, FetchError> {
        let files = quota_xml::quota_files(ctx);
        if files.is_empty() {
            return Err(FetchError::NotInstalled(
                "no JetBrains AI quota file found".to_string(),
            ));
        }

        let mut last_error: Option<FetchError> = None;
        for path in files {
            debug!(path = %path.display(), "Reading JetBrains quota file");
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    last_error = Some(FetchError::ParseFailed(format!(
                        "could not read {}: {e}",
                        path.display()
                    )));
                    continue;
                }
            };
            match quota_xml::parse_quota_xml(&content) {
                Ok(parsed) => return Ok(parsed.into_usage_snapshot()),
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error.unwrap_or(FetchError::NoStrategyAvailable))
    }
}

// ============================================================================
// Tests
// ============================================================================
