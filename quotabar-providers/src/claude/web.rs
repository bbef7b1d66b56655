//! Claude web client over harvested browser cookies.

use quotabar_core::decode::decode_flexible_timestamp;
use quotabar_core::{LoginMethod, ProviderIdentity, RateWindow, UsageSnapshot};
use quotabar_fetch::{FetchContext, FetchError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Cookie domains for claude.ai sessions.
pub const COOKIE_DOMAINS: &[&str] = &["claude.ai"];

/// Web usage endpoint.
const USAGE_ENDPOINT: &str = "https://claude.ai/api/organizations/default/usage";

/// Cookie names that indicate a logged-in session.
const SESSION_COOKIE_NAMES: &[&str] = &["sessionkey", "__secure-next-auth.session-token"];

/// Returns true if the cookie header carries a session cookie.
pub fn has_session_cookie(cookie_header: &str) -> bool {
    let lower = cookie_header.to_lowercase();
    SESSION_COOKIE_NAMES.iter().any(|name| lower.contains(name))
}

// ============================================================================
// Response structures
// ============================================================================

/// Response from the web usage endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebUsageResponse {
    /// Usage windows.
    pub usage: Option<WebUsage>,
    /// User info.
    pub user: Option<WebUser>,
    /// Organization info.
    pub organization: Option<WebOrganization>,
}

/// Usage windows from the web endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebUsage {
    /// Session window.
    pub session: Option<WebWindow>,
    /// Weekly window.
    pub weekly: Option<WebWindow>,
    /// Premium-tier window.
    #[serde(alias = "opus")]
    pub premium: Option<WebWindow>,
}

/// One window from the web endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebWindow {
    /// Percent used.
    pub used_percent: Option<f64>,
    /// Remaining percent.
    pub remaining_percent: Option<f64>,
    /// Alternative spelling shipped at some point.
    pub utilization: Option<f64>,
    /// Reset time.
    #[serde(default)]
    pub resets_at: Option<Value>,
    /// Human-readable reset description.
    pub reset_description: Option<String>,
}

impl WebWindow {
    fn into_rate_window(self, window_minutes: Option<u32>) -> RateWindow {
        let used_percent = self
            .used_percent
            .or(self.utilization)
            .or_else(|| self.remaining_percent.map(|r| 100.0 - r))
            .unwrap_or(0.0);
        RateWindow {
            used_percent,
            window_minutes,
            resets_at: self.resets_at.as_ref().and_then(decode_flexible_timestamp),
            reset_description: self.reset_description,
        }
    }
}

/// User info from the web endpoint.
#[derive(Debug, Deserialize)]
pub struct WebUser {
    /// Account email.
    pub email: Option<String>,
}

/// Organization info from the web endpoint.
#[derive(Debug, Deserialize)]
pub struct WebOrganization {
    /// Organization name.
    pub name: Option<String>,
}

impl WebUsageResponse {
    /// Converts the response into a snapshot; errors when no session window
    /// is present.
    pub fn into_snapshot(self) -> Result<UsageSnapshot, FetchError> {
        let usage = self.usage.ok_or_else(|| {
            FetchError::ParseFailed("web response carried no usage object".to_string())
        })?;
        let session = usage.session.ok_or_else(|| {
            FetchError::ParseFailed("web response carried no session window".to_string())
        })?;

        let mut snapshot = UsageSnapshot::new(session.into_rate_window(Some(300)));
        snapshot.secondary = usage.weekly.map(|w| w.into_rate_window(Some(10_080)));
        snapshot.tertiary = usage.premium.map(|w| w.into_rate_window(Some(10_080)));

        if self.user.is_some() || self.organization.is_some() {
            let mut identity = ProviderIdentity {
                login_method: Some(LoginMethod::BrowserCookies),
                ..Default::default()
            };
            if let Some(user) = self.user {
                identity.account_email = user.email;
            }
            if let Some(org) = self.organization {
                identity.account_organization = org.name;
            }
            snapshot.identity = Some(identity);
        }

        Ok(snapshot)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Fetches usage from claude.ai with a cookie header.
#[instrument(skip(ctx, cookie_header))]
pub async fn fetch_usage(
    ctx: &FetchContext,
    cookie_header: &str,
) -> Result<UsageSnapshot, FetchError> {
    debug!("Fetching Claude usage via web session");

    let response = ctx
        .http
        .get_with_cookies(USAGE_ENDPOINT, cookie_header)
        .await
        .map_err(FetchError::from)?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::AuthenticationFailed(
            "claude.ai rejected the session cookies; log in again in the browser".to_string(),
        ));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Web usage endpoint returned an error");
        return Err(FetchError::Api(format!("HTTP {status}: {body}")));
    }

    let parsed: WebUsageResponse = response.json().await?;
    parsed.into_snapshot()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_session_cookie() {
        assert!(has_session_cookie("sessionKey=abc123"));
        assert!(has_session_cookie("other=1; __Secure-next-auth.session-token=x"));
        assert!(!has_session_cookie("other=1; foo=bar"));
    }

    #[test]
    fn test_parse_web_response() {
        let json = r#"{
            "usage": {
                "session": {"usedPercent": 25.0, "resetsAt": "2025-01-01T12:00:00Z"},
                "weekly": {"remainingPercent": 55.0},
                "opus": {"utilization": 30.0}
            },
            "user": {"email": "user@example.com"},
            "organization": {"name": "Acme"}
        }"#;

        let response: WebUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();

        assert_eq!(snapshot.primary.used_percent, 25.0);
        assert_eq!(snapshot.primary.window_minutes, Some(300));
        assert!((snapshot.secondary.as_ref().unwrap().used_percent - 45.0).abs() < 0.01);
        assert_eq!(snapshot.tertiary.as_ref().unwrap().used_percent, 30.0);
        assert_eq!(
            snapshot.identity.unwrap().account_email.as_deref(),
            Some("user@example.com")
        );
    }

    #[test]
    fn test_missing_session_window_errors() {
        let json = r#"{"usage": {"weekly": {"usedPercent": 5.0}}}"#;
        let response: WebUsageResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_snapshot(),
            Err(FetchError::ParseFailed(_))
        ));
    }
}
