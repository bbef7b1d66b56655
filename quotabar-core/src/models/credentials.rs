//! OAuth credential model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A refreshable OAuth credential set as loaded from a credential store.
///
/// Expiry handling fails safe: credentials with no known expiry are treated
/// as expired so that callers refresh before trusting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCredentials {
    /// Bearer access token.
    pub access_token: String,
    /// Refresh token, when the grant supports refresh.
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token.
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Tier label attached to the grant (e.g. "pro", "max").
    pub tier: Option<String>,
}

impl OAuthCredentials {
    /// Creates credentials with only an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
            tier: None,
        }
    }

    /// Returns true if the token must not be used without a refresh.
    ///
    /// Unknown expiry counts as expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() >= expires_at,
            None => true,
        }
    }

    /// Returns true if the stored grant can be refreshed.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns true if the given scope was granted.
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_is_expired_fails_safe_without_expiry() {
        let creds = OAuthCredentials::new("token");
        assert!(creds.is_expired());
    }

    #[test]
    fn test_is_expired_future() {
        let mut creds = OAuthCredentials::new("token");
        creds.expires_at = Some(Utc::now() + Duration::hours(1));
        assert!(!creds.is_expired());
    }

    #[test]
    fn test_is_expired_past() {
        let mut creds = OAuthCredentials::new("token");
        creds.expires_at = Some(Utc::now() - Duration::hours(1));
        assert!(creds.is_expired());
    }

    #[test]
    fn test_can_refresh() {
        let mut creds = OAuthCredentials::new("token");
        assert!(!creds.can_refresh());

        creds.refresh_token = Some(String::new());
        assert!(!creds.can_refresh());

        creds.refresh_token = Some("refresh".to_string());
        assert!(creds.can_refresh());
    }

    #[test]
    fn test_has_scope() {
        let mut creds = OAuthCredentials::new("token");
        creds.scopes = vec!["user:profile".to_string()];
        assert!(creds.has_scope("user:profile"));
        assert!(!creds.has_scope("admin:write"));
    }
}
