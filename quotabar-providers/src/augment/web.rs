//! Augment web client over harvested browser cookies.

use quotabar_core::decode::decode_flexible_timestamp;
use quotabar_core::{Credits, LoginMethod, ProviderIdentity, RateWindow, UsageSnapshot};
use quotabar_fetch::{FetchContext, FetchError, SessionProbePlan};
use quotabar_fetch::host::browser::Browser;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Cookie domains for app.augmentcode.com sessions.
pub const COOKIE_DOMAINS: &[&str] = &["app.augmentcode.com", "augmentcode.com"];

/// Credits endpoint.
const CREDITS_ENDPOINT: &str = "https://app.augmentcode.com/api/credits";

/// Web origin, sent as Origin/Referer on session probes.
const WEB_ORIGIN: &str = "https://app.augmentcode.com";

/// Keepalive probe plan for the Augment browser session.
///
/// Candidate endpoints in order; the NextAuth-style session endpoint is
/// the one that actually rotates cookies, the rest are fallbacks.
pub fn probe_plan() -> SessionProbePlan {
    SessionProbePlan {
        endpoints: vec![
            format!("{WEB_ORIGIN}/api/auth/session"),
            format!("{WEB_ORIGIN}/api/session"),
            format!("{WEB_ORIGIN}/api/user"),
        ],
        origin: Some(WEB_ORIGIN.to_string()),
        domains: COOKIE_DOMAINS.iter().map(ToString::to_string).collect(),
        browser_order: Browser::default_import_order().to_vec(),
    }
}

// ============================================================================
// Response structures
// ============================================================================

/// Response from the credits endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditsResponse {
    /// Credits still available this cycle.
    #[serde(alias = "creditsAvailable")]
    pub usage_units_available: Option<f64>,
    /// Credits consumed this cycle.
    #[serde(alias = "creditsUsed")]
    pub usage_units_used_this_billing_cycle: Option<f64>,
    /// When the billing cycle renews.
    #[serde(default)]
    pub renewal_date: Option<Value>,
    /// Account email, when the endpoint includes it.
    pub email: Option<String>,
    /// Plan name.
    pub plan_name: Option<String>,
}

impl CreditsResponse {
    /// Converts the response into a snapshot.
    pub fn into_snapshot(self) -> Result<UsageSnapshot, FetchError> {
        let available = self.usage_units_available.ok_or_else(|| {
            FetchError::ParseFailed("credits response carried no available units".to_string())
        })?;
        let used = self.usage_units_used_this_billing_cycle.unwrap_or(0.0);
        let total = available + used;

        let used_percent = if total > 0.0 { (used / total) * 100.0 } else { 0.0 };

        let mut window = RateWindow::new(used_percent);
        window.resets_at = self.renewal_date.as_ref().and_then(decode_flexible_timestamp);

        let mut snapshot = UsageSnapshot::new(window);
        snapshot.credits = Some(Credits {
            remaining: available,
            total: (total > 0.0).then_some(total),
        });

        if self.email.is_some() || self.plan_name.is_some() {
            snapshot.identity = Some(ProviderIdentity {
                account_email: self.email,
                account_organization: None,
                plan: self.plan_name,
                login_method: Some(LoginMethod::BrowserCookies),
            });
        }

        Ok(snapshot)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Fetches the credit balance with a cookie header.
#[instrument(skip(ctx, cookie_header))]
pub async fn fetch_usage(
    ctx: &FetchContext,
    cookie_header: &str,
) -> Result<UsageSnapshot, FetchError> {
    debug!("Fetching Augment credits via web session");

    let response = ctx
        .http
        .inner()
        .get(CREDITS_ENDPOINT)
        .header(reqwest::header::COOKIE, cookie_header)
        .header(reqwest::header::ACCEPT, "application/json")
        .header(reqwest::header::ORIGIN, WEB_ORIGIN)
        .header(reqwest::header::REFERER, WEB_ORIGIN)
        .timeout(ctx.timeout())
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::NotLoggedIn(
            "Augment session expired; log in again in the browser".to_string(),
        ));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Credits endpoint returned an error");
        return Err(FetchError::Api(format!("HTTP {status}: {body}")));
    }

    let parsed: CreditsResponse = response.json().await?;
    parsed.into_snapshot()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_credits_response() {
        let json = r#"{
            "usageUnitsAvailable": 3000.0,
            "usageUnitsUsedThisBillingCycle": 1000.0,
            "renewalDate": "2025-12-01T00:00:00Z",
            "email": "dev@example.com",
            "planName": "Developer"
        }"#;

        let response: CreditsResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();

        assert!((snapshot.primary.used_percent - 25.0).abs() < f64::EPSILON);
        let credits = snapshot.credits.unwrap();
        assert_eq!(credits.remaining, 3000.0);
        assert_eq!(credits.total, Some(4000.0));
        assert!(snapshot.primary.resets_at.is_some());

        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.account_email.as_deref(), Some("dev@example.com"));
        assert_eq!(identity.plan, Some("Developer".to_string()));
    }

    #[test]
    fn test_zero_usage() {
        let json = r#"{"usageUnitsAvailable": 500.0}"#;
        let response: CreditsResponse = serde_json::from_str(json).unwrap();
        let snapshot = response.into_snapshot().unwrap();
        assert_eq!(snapshot.primary.used_percent, 0.0);
        assert_eq!(snapshot.credits.unwrap().remaining, 500.0);
    }

    #[test]
    fn test_missing_units_is_parse_failure() {
        let json = r#"{"planName": "Developer"}"#;
        let response: CreditsResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_snapshot(),
            Err(FetchError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_probe_plan_shape() {
        let plan = probe_plan();
        assert_eq!(plan.endpoints.len(), 3);
        assert!(plan.endpoints[0].ends_with("/api/auth/session"));
        assert_eq!(plan.origin.as_deref(), Some("https://app.augmentcode.com"));
        assert!(plan.domains.contains(&"augmentcode.com".to_string()));
    }
}
