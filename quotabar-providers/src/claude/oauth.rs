//! Claude OAuth credential loading and refresh.
//!
//! The Claude CLI stores OAuth credentials either in
//! `~/.claude/.credentials.json` or in the external secure store. The file
//! is tried first because reading it never raises a credential prompt.
//!
//! Stored format:
//!
//! ```json
//! {
//!   "claudeAiOauth": {
//!     "accessToken": "...",
//!     "refreshToken": "...",
//!     "expiresAt": 1735000000000,
//!     "scopes": ["user:profile"],
//!     "subscriptionType": "pro"
//!   }
//! }
//! ```

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use quotabar_core::decode::normalize_epoch_seconds;
use quotabar_core::OAuthCredentials;
use quotabar_fetch::{FetchContext, FetchError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Token refresh endpoint.
const TOKEN_ENDPOINT: &str = "https://console.anthropic.com/v1/oauth/token";

/// OAuth client id used by the Claude CLI.
const CLIENT_ID: &str = "9d1c250a-e61b-44d9-88ed-5944d1962f5e";

/// Environment variable overriding the Claude config directory.
pub const CLAUDE_CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

// ============================================================================
// Stored formats
// ============================================================================

/// Root of `.credentials.json`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    claude_ai_oauth: Option<StoredOAuth>,
}

/// The OAuth blob as stored by the CLI (file or secure store).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOAuth {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Expiry as epoch milliseconds (sometimes seconds; normalized on load).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Subscription tier label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
}

impl StoredOAuth {
    fn into_credentials(self) -> OAuthCredentials {
        let expires_at = self.expires_at.and_then(epoch_to_datetime);
        OAuthCredentials {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scopes: self.scopes,
            tier: self.subscription_type,
        }
    }

    fn from_credentials(creds: &OAuthCredentials) -> Self {
        Self {
            access_token: creds.access_token.clone(),
            refresh_token: creds.refresh_token.clone(),
            expires_at: creds.expires_at.map(|dt| dt.timestamp_millis()),
            scopes: creds.scopes.clone(),
            subscription_type: creds.tier.clone(),
        }
    }
}

fn epoch_to_datetime(raw: i64) -> Option<DateTime<Utc>> {
    #[allow(clippy::cast_precision_loss)]
    let seconds = normalize_epoch_seconds(raw as f64);
    #[allow(clippy::cast_possible_truncation)]
    Utc.timestamp_opt(seconds as i64, 0).single()
}

// ============================================================================
// Loading
// ============================================================================

fn credentials_file_path(ctx: &FetchContext) -> Option<PathBuf> {
    let dir = match ctx.env_var(CLAUDE_CONFIG_DIR_ENV) {
        Some(custom) => PathBuf::from(custom),
        None => dirs::home_dir()?.join(".claude"),
    };
    Some(dir.join(".credentials.json"))
}

fn parse_stored(json: &str) -> Result<OAuthCredentials, FetchError> {
    if let Ok(file) = serde_json::from_str::<CredentialsFile>(json) {
        if let Some(oauth) = file.claude_ai_oauth {
            return Ok(oauth.into_credentials());
        }
    }
    if let Ok(oauth) = serde_json::from_str::<StoredOAuth>(json) {
        return Ok(oauth.into_credentials());
    }
    Err(FetchError::InvalidStoredData(
        "unrecognized OAuth credential format".to_string(),
    ))
}

/// Loads Claude OAuth credentials: credentials file first (no prompt), then
/// the secure store.
#[instrument(skip(ctx))]
pub async fn load_credentials(ctx: &FetchContext) -> Result<OAuthCredentials, FetchError> {
    if let Some(path) = credentials_file_path(ctx) {
        if path.exists() {
            debug!(path = %path.display(), "Reading credentials file");
            let content = std::fs::read_to_string(&path)
                .map_err(|e| FetchError::InvalidStoredData(e.to_string()))?;
            return parse_stored(&content);
        }
    }

    if ctx.preflight.will_prompt("quotabar:claude", "token") {
        debug!("Secure store read may raise an interactive prompt");
    }
    match ctx.credentials.load_token().await? {
        Some(stored) => parse_stored(&stored),
        None => Err(FetchError::NoCredentials),
    }
}

// ============================================================================
// Refresh
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorBody {
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchanges the refresh token for a fresh access token and persists the
/// rotated grant through the credential store.
#[instrument(skip(ctx, creds))]
pub async fn refresh_credentials(
    ctx: &FetchContext,
    creds: &OAuthCredentials,
) -> Result<OAuthCredentials, FetchError> {
    let Some(refresh_token) = creds.refresh_token.as_deref().filter(|t| !t.is_empty()) else {
        return Err(FetchError::AuthenticationFailed(
            "OAuth token expired with no refresh path; run `claude login`".to_string(),
        ));
    };

    debug!("Refreshing Claude OAuth token");
    let body = serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
        "client_id": CLIENT_ID,
    });

    let response = ctx.http.post_json(TOKEN_ENDPOINT, &body).await?;
    let status = response.status();

    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        let parsed: Option<TokenErrorBody> = serde_json::from_str(&text).ok();
        let code = parsed
            .as_ref()
            .and_then(|b| b.error.as_deref())
            .unwrap_or("")
            .to_string();

        if code == "unsupported_grant_type" || code == "invalid_client" {
            // Every retry with this grant hits the same wall; do not let a
            // weaker strategy mask it.
            return Err(FetchError::UnsupportedConfiguration(format!(
                "token refresh rejected: {}",
                parsed
                    .and_then(|b| b.error_description)
                    .unwrap_or_else(|| code.to_string())
            )));
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::AuthenticationFailed(format!(
                "token refresh failed (HTTP {status})"
            )));
        }
        return Err(FetchError::Api(format!("token refresh failed (HTTP {status})")));
    }

    let token: TokenResponse = response.json().await?;
    let refreshed = OAuthCredentials {
        access_token: token.access_token,
        refresh_token: token
            .refresh_token
            .or_else(|| Some(refresh_token.to_string())),
        expires_at: token
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        scopes: creds.scopes.clone(),
        tier: creds.tier.clone(),
    };

    // Best-effort persistence of the rotated grant.
    let stored = StoredOAuth::from_credentials(&refreshed);
    if let Ok(json) = serde_json::to_string(&stored) {
        if let Err(e) = ctx.credentials.store_token(&json).await {
            warn!(error = %e, "Could not persist refreshed OAuth token");
        }
    }

    Ok(refreshed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_format() {
        let json = r#"{
            "claudeAiOauth": {
                "accessToken": "tok",
                "refreshToken": "ref",
                "expiresAt": 1735000000000,
                "scopes": ["user:profile"],
                "subscriptionType": "pro"
            }
        }"#;

        let creds = parse_stored(json).unwrap();
        assert_eq!(creds.access_token, "tok");
        assert_eq!(creds.refresh_token.as_deref(), Some("ref"));
        // Millisecond expiry normalized to seconds.
        assert_eq!(creds.expires_at.unwrap().timestamp(), 1_735_000_000);
        assert_eq!(creds.tier.as_deref(), Some("pro"));
        assert!(creds.has_scope("user:profile"));
    }

    #[test]
    fn test_parse_direct_format_with_second_expiry() {
        let json = r#"{"accessToken": "tok", "expiresAt": 1735000000}"#;
        let creds = parse_stored(json).unwrap();
        assert_eq!(creds.expires_at.unwrap().timestamp(), 1_735_000_000);
    }

    #[test]
    fn test_parse_garbage_is_invalid_stored_data() {
        assert!(matches!(
            parse_stored("not json"),
            Err(FetchError::InvalidStoredData(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_credentials_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join(".credentials.json")).unwrap();
        write!(
            file,
            r#"{{"claudeAiOauth":{{"accessToken":"file-tok","expiresAt":1735000000000}}}}"#
        )
        .unwrap();

        let ctx = FetchContext::builder()
            .env(CLAUDE_CONFIG_DIR_ENV, dir.path().display().to_string())
            .build();

        let creds = load_credentials(&ctx).await.unwrap();
        assert_eq!(creds.access_token, "file-tok");
    }

    #[tokio::test]
    async fn test_load_falls_back_to_store() {
        use quotabar_fetch::MemoryCredentialStore;
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap(); // empty: no credentials file
        let store = MemoryCredentialStore::with_token(
            r#"{"accessToken":"store-tok","refreshToken":"r"}"#,
        );

        let ctx = FetchContext::builder()
            .env(CLAUDE_CONFIG_DIR_ENV, dir.path().display().to_string())
            .credentials(Arc::new(store))
            .build();

        let creds = load_credentials(&ctx).await.unwrap();
        assert_eq!(creds.access_token, "store-tok");
        assert!(creds.can_refresh());
    }

    #[tokio::test]
    async fn test_load_without_any_source() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = FetchContext::builder()
            .env(CLAUDE_CONFIG_DIR_ENV, dir.path().display().to_string())
            .build();

        assert!(matches!(
            load_credentials(&ctx).await,
            Err(FetchError::NoCredentials)
        ));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_is_authoritative() {
        let ctx = FetchContext::new();
        let creds = OAuthCredentials::new("expired");
        let err = refresh_credentials(&ctx, &creds).await.unwrap_err();
        assert!(matches!(err, FetchError::AuthenticationFailed(_)));
        assert!(err.is_authoritative());
    }
}
