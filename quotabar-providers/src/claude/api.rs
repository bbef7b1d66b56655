//! Claude OAuth usage API client.

use quotabar_core::decode::decode_flexible_timestamp;
use quotabar_core::{
    LoginMethod, OAuthCredentials, ProviderIdentity, RateWindow, UsageSnapshot,
};
use quotabar_fetch::{FetchContext, FetchError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// OAuth usage endpoint.
const USAGE_ENDPOINT: &str = "https://api.anthropic.com/api/oauth/usage";

/// Beta header required by the OAuth surface.
const BETA_HEADER: &str = "oauth-2025-04-20";

// ============================================================================
// Response structures
// ============================================================================

/// Response from the OAuth usage endpoint.
#[derive(Debug, Deserialize)]
pub struct OAuthUsageResponse {
    /// Session window (5 hours).
    #[serde(default)]
    pub five_hour: Option<ApiWindow>,
    /// Weekly window.
    #[serde(default)]
    pub seven_day: Option<ApiWindow>,
    /// Premium-tier weekly window.
    #[serde(default, alias = "seven_day_opus")]
    pub seven_day_premium: Option<ApiWindow>,
    /// Account info.
    #[serde(default)]
    pub account: Option<ApiAccount>,
    /// Organization info.
    #[serde(default)]
    pub organization: Option<ApiOrganization>,
}

/// One usage window as the API reports it.
#[derive(Debug, Deserialize)]
pub struct ApiWindow {
    /// Percent used; the API has shipped several names for this.
    #[serde(alias = "utilization", alias = "usage_percent", alias = "percent")]
    pub used_percent: Option<f64>,
    /// Remaining percent, on responses that report the inverse.
    #[serde(alias = "remaining_percent")]
    pub remaining: Option<f64>,
    /// Window duration in minutes.
    #[serde(alias = "duration_minutes")]
    pub window_minutes: Option<u32>,
    /// Reset time; epoch or ISO-8601 depending on response vintage.
    #[serde(default, alias = "reset_at")]
    pub resets_at: Option<Value>,
    /// Human-readable reset description.
    #[serde(alias = "reset_in")]
    pub reset_description: Option<String>,
}

impl ApiWindow {
    fn into_rate_window(self) -> RateWindow {
        let used_percent = self
            .used_percent
            .or_else(|| self.remaining.map(|r| 100.0 - r))
            .unwrap_or(0.0);
        RateWindow {
            used_percent,
            window_minutes: self.window_minutes,
            resets_at: self.resets_at.as_ref().and_then(decode_flexible_timestamp),
            reset_description: self.reset_description,
        }
    }
}

/// Account info.
#[derive(Debug, Deserialize)]
pub struct ApiAccount {
    /// Account email.
    pub email: Option<String>,
}

/// Organization info.
#[derive(Debug, Deserialize)]
pub struct ApiOrganization {
    /// Organization name.
    pub name: Option<String>,
}

impl OAuthUsageResponse {
    /// Converts the response into a snapshot.
    ///
    /// The session window is required; a response without one cannot
    /// produce a usable snapshot.
    pub fn into_snapshot(self, creds: &OAuthCredentials) -> Result<UsageSnapshot, FetchError> {
        let Some(five_hour) = self.five_hour else {
            return Err(FetchError::ParseFailed(
                "usage response carried no session window".to_string(),
            ));
        };

        let mut snapshot = UsageSnapshot::new(five_hour.into_rate_window());
        snapshot.secondary = self.seven_day.map(ApiWindow::into_rate_window);
        snapshot.tertiary = self.seven_day_premium.map(ApiWindow::into_rate_window);

        let mut identity = ProviderIdentity {
            login_method: Some(LoginMethod::OAuth),
            plan: creds.tier.clone(),
            ..Default::default()
        };
        if let Some(account) = self.account {
            identity.account_email = account.email;
        }
        if let Some(org) = self.organization {
            identity.account_organization = org.name;
        }
        snapshot.identity = Some(identity);

        Ok(snapshot)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Fetches usage from the OAuth endpoint with a bearer token.
#[instrument(skip(ctx, creds))]
pub async fn fetch_usage(
    ctx: &FetchContext,
    creds: &OAuthCredentials,
) -> Result<UsageSnapshot, FetchError> {
    debug!("Fetching Claude usage via OAuth API");

    let response = ctx
        .http
        .inner()
        .get(USAGE_ENDPOINT)
        .bearer_auth(&creds.access_token)
        .header("anthropic-beta", BETA_HEADER)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(ctx.timeout())
        .send()
        .await?;

    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::AuthenticationFailed(format!(
            "usage endpoint rejected the token (HTTP {status})"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Usage endpoint returned an error");
        return Err(FetchError::Api(format!("HTTP {status}: {body}")));
    }

    let parsed: OAuthUsageResponse = response.json().await?;
    parsed.into_snapshot(creds)
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
            "five_hour": {"utilization": 25.0, "resets_at": "2025-11-16T12:00:00Z"},
            "seven_day": {"utilization": 40.0, "resets_at": 1763320800},
            "seven_day_opus": {"utilization": 10.0},
            "account": {"email": "user@example.com"},
            "organization": {"name": "Acme"}
        }"#;

        let response: OAuthUsageResponse = serde_json::from_str(json).unwrap();
        let creds = OAuthCredentials::new("tok");
        let snapshot = response.into_snapshot(&creds).unwrap();

        assert_eq!(snapshot.primary.used_percent, 25.0);
        assert_eq!(snapshot.secondary.as_ref().unwrap().used_percent, 40.0);
        assert_eq!(
            snapshot.secondary.as_ref().unwrap().resets_at.unwrap().timestamp(),
            1_763_320_800
        );
        assert_eq!(snapshot.tertiary.as_ref().unwrap().used_percent, 10.0);

        let identity = snapshot.identity.unwrap();
        assert_eq!(identity.account_email.as_deref(), Some("user@example.com"));
        assert_eq!(identity.account_organization.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_parse_remaining_percent_variant() {
        let json = r#"{"five_hour": {"remaining_percent": 70.0}}"#;
        let response: OAuthUsageResponse = serde_json::from_str(json).unwrap();
        let snapshot = response
            .into_snapshot(&OAuthCredentials::new("tok"))
            .unwrap();
        assert!((snapshot.primary.used_percent - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_session_window_is_parse_failure() {
        let json = r#"{"seven_day": {"utilization": 40.0}}"#;
        let response: OAuthUsageResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            response.into_snapshot(&OAuthCredentials::new("tok")),
            Err(FetchError::ParseFailed(_))
        ));
    }

    #[test]
    fn test_tier_flows_into_identity() {
        let json = r#"{"five_hour": {"utilization": 1.0}}"#;
        let response: OAuthUsageResponse = serde_json::from_str(json).unwrap();
        let mut creds = OAuthCredentials::new("tok");
        creds.tier = Some("max".to_string());

        let snapshot = response.into_snapshot(&creds).unwrap();
        assert_eq!(snapshot.identity.unwrap().plan.as_deref(), Some("max"));
    }
}
