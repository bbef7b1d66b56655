//! Copilot usage API client.
//!
//! `GET <host>/copilot_internal/user` with `Authorization: token <bearer>`
//! returns per-bucket quota snapshots (percent remaining) and the plan
//! label. The host defaults to api.github.com and can be pointed at a
//! GitHub Enterprise instance.

use quotabar_core::decode::decode_flexible_timestamp;
use quotabar_core::{LoginMethod, ProviderIdentity, RateWindow, UsageSnapshot};
use quotabar_fetch::{FetchContext, FetchError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Default API host.
const DEFAULT_HOST: &str = "https://api.github.com";

/// Usage endpoint path.
const USAGE_PATH: &str = "/copilot_internal/user";

/// Environment variable pointing at a GitHub Enterprise host.
pub const ENTERPRISE_HOST_ENV: &str = "GITHUB_ENTERPRISE_URL";

/// Resolves the API base URL, honoring the enterprise override.
pub fn resolve_host(ctx: &FetchContext) -> String {
    ctx.env_var(ENTERPRISE_HOST_ENV)
        .map_or_else(|| DEFAULT_HOST.to_string(), |host| host.trim_end_matches('/').to_string())
}

// ============================================================================
// Response structures
// ============================================================================

/// Response from the Copilot user endpoint.
#[derive(Debug, Deserialize)]
pub struct CopilotUserResponse {
    /// Per-bucket quota snapshots.
    #[serde(default)]
    pub quota_snapshots: Option<QuotaSnapshots>,
    /// Plan label (e.g. "individual", "business").
    #[serde(default)]
    pub copilot_plan: Option<String>,
    /// Shared reset date for the quota buckets (date or timestamp).
    #[serde(default)]
    pub quota_reset_date: Option<Value>,
}

/// The quota buckets the endpoint reports.
#[derive(Debug, Deserialize)]
pub struct QuotaSnapshots {
    /// Premium interaction quota (the one users run out of).
    #[serde(default)]
    pub premium_interactions: Option<QuotaBucket>,
    /// Chat quota.
    #[serde(default)]
    pub chat: Option<QuotaBucket>,
    /// Completions quota.
    #[serde(default)]
    pub completions: Option<QuotaBucket>,
}

/// One quota bucket.
#[derive(Debug, Deserialize)]
pub struct QuotaBucket {
    /// Percent of the bucket still available.
    #[serde(default)]
    pub percent_remaining: Option<f64>,
    /// Unlimited buckets have no meaningful percentage.
    #[serde(default)]
    pub unlimited: bool,
}

impl QuotaBucket {
    fn to_rate_window(&self, resets_at: Option<chrono::DateTime<chrono::Utc>>) -> RateWindow {
        let used_percent = if self.unlimited {
            0.0
        } else {
            self.percent_remaining.map_or(0.0, |r| 100.0 - r)
        };
        RateWindow {
            used_percent,
            window_minutes: None,
            resets_at,
            reset_description: None,
        }
    }
}

impl CopilotUserResponse {
    /// Converts the response into a snapshot.
    pub fn into_snapshot(self) -> Result<UsageSnapshot, FetchError> {
        let resets_at = self.quota_reset_date.as_ref().and_then(parse_reset_date);

        let Some(snapshots) = self.quota_snapshots else {
            return Err(FetchError::ParseFailed(
                "response carried no quota snapshots".to_string(),
            ));
        };

        // Premium interactions lead; chat and completions trail behind.
        let primary = snapshots
            .premium_interactions
            .as_ref()
            .or(snapshots.chat.as_ref())
            .or(snapshots.completions.as_ref())
            .ok_or_else(|| {
                FetchError::ParseFailed("quota snapshots were all empty".to_string())
            })?
            .to_rate_window(resets_at);

        let mut snapshot = UsageSnapshot::new(primary);
        if snapshots.premium_interactions.is_some() {
            snapshot.secondary = snapshots.chat.as_ref().map(|b| b.to_rate_window(resets_at));
            snapshot.tertiary = snapshots
                .completions
                .as_ref()
                .map(|b| b.to_rate_window(resets_at));
        }

        snapshot.identity = Some(ProviderIdentity {
            plan: self.copilot_plan,
            login_method: Some(LoginMethod::ApiToken),
            ..Default::default()
        });

        Ok(snapshot)
    }
}

/// The reset date arrives as `YYYY-MM-DD`, an ISO timestamp, or an epoch.
fn parse_reset_date(value: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Some(dt) = decode_flexible_timestamp(value) {
        return Some(dt);
    }
    let date = value.as_str()?;
    let naive = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(naive.and_hms_opt(0, 0, 0)?.and_utc())
}

// ============================================================================
// Client
// ============================================================================

/// Fetches Copilot usage with a bearer token.
#[instrument(skip(ctx, token))]
pub async fn fetch_usage(ctx: &FetchContext, token: &str) -> Result<UsageSnapshot, FetchError> {
    let url = format!("{}{USAGE_PATH}", resolve_host(ctx));
    debug!(url = %url, "Fetching Copilot usage");

    let response = ctx
        .http
        .get_with_auth(&url, &format!("token {token}"))
        .await
        .map_err(FetchError::from)?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::AuthenticationFailed(format!(
            "Copilot API rejected the token (HTTP {status})"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Copilot API returned an error");
        return Err(FetchError::Api(format!("HTTP {status}: {body}")));
    }

    let parsed: CopilotUserResponse = response.json().await?;
    parsed.into_snapshot()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_response() {
        let json = r#"{
            "copilot_plan": "individual",
            "quota_reset_date": "2026-02-01",
            "quota_snapshots": {
                "premium_interactions": {"percent_remaining": 12.5, "unlimited": false},
                "chat": {"percent_remaining": 100.0, "unlimited": true},
                "completions": {"percent_remaining": 80.0, "unlimited": false}
            }
        }"#;

        let response: CopilotUserResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();

        assert!((snapshot.primary.used_percent - 87.5).abs() < f64::EPSILON);
        // Unlimited chat bucket reads as unused.
        assert_eq!(snapshot.secondary.as_ref().unwrap().used_percent, 0.0);
        assert!((snapshot.tertiary.as_ref().unwrap().used_percent - 20.0).abs() < f64::EPSILON);
        assert_eq!(
            snapshot.identity.unwrap().plan.as_deref(),
            Some("individual")
        );

        let resets = snapshot.primary.resets_at.unwrap();
        assert_eq!(resets.format("%Y-%m-%d").to_string(), "2026-02-01");
    }

    #[test]
    fn test_chat_bucket_promoted_without_premium() {
        let json = r#"{
            "quota_snapshots": {"chat": {"percent_remaining": 40.0}}
        }"#;
        let response: CopilotUserResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();
        assert!((snapshot.primary.used_percent - 60.0).abs() < f64::EPSILON);
        assert!(snapshot.secondary.is_none());
    }

    #[test]
    fn test_missing_quota_snapshots_is_parse_failure() {
        let json = r#"{"copilot_plan": "individual"}"#;
        let response: CopilotUserResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_snapshot(),
            Err(FetchError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_epoch_reset_date() {
        let json = r#"{
            "quota_reset_date": 1763320800,
            "quota_snapshots": {"premium_interactions": {"percent_remaining": 50.0}}
        }"#;
        let response: CopilotUserResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();
        assert_eq!(snapshot.primary.resets_at.unwrap().timestamp(), 1_763_320_800);
    }
}
