//! MiniMax web client: cookie session or storage-scraped bearer token.

use quotabar_core::decode::decode_flexible_timestamp;
use quotabar_core::{LoginMethod, ProviderIdentity, RateWindow, UsageSnapshot};
use quotabar_fetch::{FetchContext, FetchError};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

/// Cookie domains for MiniMax sessions (both TLD spellings in the wild).
pub const COOKIE_DOMAINS: &[&str] = &[
    "platform.minimax.io",
    "www.minimax.io",
    "minimax.io",
    "platform.minimaxi.com",
    "minimaxi.com",
];

/// Origin fragments used to gate storage scans.
pub const ORIGIN_HINTS: &[&str] = &["minimax.io", "minimaxi.com"];

/// The session cookie MiniMax issues to logged-in users.
pub const SESSION_COOKIE: &str = "HERTZ-SESSION";

/// Environment variable carrying a manually exported cookie header.
pub const COOKIE_ENV: &str = "MINIMAX_COOKIE";

/// Environment variable overriding the platform host.
pub const HOST_ENV: &str = "MINIMAX_HOST";

const DEFAULT_HOST: &str = "https://platform.minimax.io";
const REMAINS_PATH: &str = "/v1/api/coding_plan/remains";

fn remains_url(ctx: &FetchContext) -> String {
    let host = ctx
        .env_var(HOST_ENV)
        .map_or_else(|| DEFAULT_HOST.to_string(), |h| h.trim_end_matches('/').to_string());
    format!("{host}{REMAINS_PATH}")
}

// ============================================================================
// Response parsing
// ============================================================================

/// Quota fields as the remains endpoint reports them; key names vary by
/// deployment, hence the aliases.
#[derive(Debug, Deserialize)]
struct RemainsData {
    #[serde(alias = "usage_percent", alias = "percent")]
    used_percent: Option<f64>,
    #[serde(alias = "remains", alias = "remaining_count", alias = "left_count")]
    remaining: Option<f64>,
    #[serde(alias = "total_count", alias = "quota", alias = "limit")]
    total: Option<f64>,
    #[serde(alias = "used_count")]
    used: Option<f64>,
    #[serde(default, alias = "refresh_time", alias = "next_refresh_time")]
    resets_at: Option<Value>,
    #[serde(alias = "plan_name", alias = "coding_plan")]
    plan: Option<String>,
}

/// Converts a remains response body into a snapshot.
///
/// Accepts both the bare object and the `{"data": {...}}` envelope.
pub fn remains_to_snapshot(body: &Value) -> Result<UsageSnapshot, FetchError> {
    let data = body.get("data").unwrap_or(body);
    let parsed: RemainsData = serde_json::from_value(data.clone())
        .map_err(|e| FetchError::ParseFailed(format!("unexpected remains shape: {e}")))?;

    let used_percent = parsed.used_percent.or_else(|| {
        let total = parsed.total?;
        if total <= 0.0 {
            return None;
        }
        let used = parsed
            .used
            .or_else(|| parsed.remaining.map(|r| total - r))?;
        Some((used / total) * 100.0)
    });

    let Some(used_percent) = used_percent else {
        return Err(FetchError::ParseFailed(
            "remains response carried no usable quota fields".to_string(),
        ));
    };

    let mut window = RateWindow::new(used_percent);
    window.resets_at = parsed.resets_at.as_ref().and_then(decode_flexible_timestamp);

    let mut snapshot = UsageSnapshot::new(window);
    if parsed.plan.is_some() {
        snapshot.identity = Some(ProviderIdentity {
            plan: parsed.plan,
            login_method: Some(LoginMethod::BrowserCookies),
            ..Default::default()
        });
    }
    Ok(snapshot)
}

// ============================================================================
// Clients
// ============================================================================

async fn handle_response(response: reqwest::Response) -> Result<UsageSnapshot, FetchError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(FetchError::NotLoggedIn(
            "MiniMax session rejected; log in again in the browser".to_string(),
        ));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Remains endpoint returned an error");
        return Err(FetchError::Api(format!("HTTP {status}: {body}")));
    }

    let body: Value = response.json().await?;
    remains_to_snapshot(&body)
}

/// Fetches the coding-plan remains with a cookie header.
#[instrument(skip(ctx, cookie_header))]
pub async fn fetch_with_cookies(
    ctx: &FetchContext,
    cookie_header: &str,
) -> Result<UsageSnapshot, FetchError> {
    debug!("Fetching MiniMax remains via cookie session");

    let response = ctx
        .http
        .get_with_cookies(&remains_url(ctx), cookie_header)
        .await
        .map_err(FetchError::from)?;
    handle_response(response).await
}

/// Fetches the coding-plan remains with a storage-scraped bearer token.
#[instrument(skip(ctx, token, group_id))]
pub async fn fetch_with_token(
    ctx: &FetchContext,
    token: &str,
    group_id: Option<&str>,
) -> Result<UsageSnapshot, FetchError> {
    debug!(has_group = group_id.is_some(), "Fetching MiniMax remains via bearer token");

    let mut request = ctx
        .http
        .inner()
        .get(remains_url(ctx))
        .bearer_auth(token)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(ctx.timeout());
    if let Some(group) = group_id {
        request = request.query(&[("GroupId", group)]);
    }

    let response = request.send().await?;
    handle_response(response).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remains_with_explicit_percent() {
        let body = json!({"data": {"used_percent": 62.5, "plan": "coding-pro"}});
        let snapshot = remains_to_snapshot(&body).unwrap();
        assert!((snapshot.primary.used_percent - 62.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.identity.unwrap().plan.as_deref(), Some("coding-pro"));
    }

    #[test]
    fn test_remains_from_counts() {
        let body = json!({"data": {"remains": 300.0, "total": 1000.0}});
        let snapshot = remains_to_snapshot(&body).unwrap();
        assert!((snapshot.primary.used_percent - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remains_without_envelope() {
        let body = json!({"used_count": 25.0, "total_count": 100.0});
        let snapshot = remains_to_snapshot(&body).unwrap();
        assert!((snapshot.primary.used_percent - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_remains_refresh_time() {
        let body = json!({"data": {"used_percent": 10.0, "refresh_time": 1763320800}});
        let snapshot = remains_to_snapshot(&body).unwrap();
        assert_eq!(snapshot.primary.resets_at.unwrap().timestamp(), 1_763_320_800);
    }

    #[test]
    fn test_remains_unusable_shape() {
        let body = json!({"data": {"something": "else"}});
        assert!(matches!(
            remains_to_snapshot(&body),
            Err(FetchError::ParseFailed(_))
        ));
    }
}
