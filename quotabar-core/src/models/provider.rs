//! Provider identification types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// Provider Kind
// ============================================================================

/// The providers QuotaBar knows how to fetch usage for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI Codex CLI (session-log based).
    Codex,
    /// Anthropic Claude (OAuth + claude.ai web).
    Claude,
    /// GitHub Copilot (API token).
    Copilot,
    /// Augment Code (browser session).
    Augment,
    /// MiniMax open platform (browser session + storage tokens).
    MiniMax,
    /// JetBrains AI Assistant (local IDE quota file).
    JetBrains,
}

impl ProviderKind {
    /// Returns all provider kinds in display order.
    pub fn all() -> &'static [ProviderKind] {
        &[
            Self::Codex,
            Self::Claude,
            Self::Copilot,
            Self::Augment,
            Self::MiniMax,
            Self::JetBrains,
        ]
    }

    /// Short machine name, used on the command line and in strategy ids.
    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::Copilot => "copilot",
            Self::Augment => "augment",
            Self::MiniMax => "minimax",
            Self::JetBrains => "jetbrains",
        }
    }

    /// Human-readable display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Codex => "Codex",
            Self::Claude => "Claude",
            Self::Copilot => "Copilot",
            Self::Augment => "Augment",
            Self::MiniMax => "MiniMax",
            Self::JetBrains => "JetBrains AI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .find(|kind| kind.cli_name() == normalized)
            .copied()
            .ok_or_else(|| CoreError::UnknownProvider(s.to_string()))
    }
}

// ============================================================================
// Identity
// ============================================================================

/// How the account behind a snapshot was authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginMethod {
    /// OAuth access/refresh token pair.
    OAuth,
    /// Personal or device API token.
    ApiToken,
    /// Cookies harvested from an installed browser.
    BrowserCookies,
    /// Local CLI tool state (session logs, auth files).
    Cli,
}

/// Account identity attached to a usage snapshot.
///
/// All fields are optional; providers fill in whatever their source exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    /// Account email address.
    pub account_email: Option<String>,
    /// Organization or team name.
    pub account_organization: Option<String>,
    /// Plan or tier label (e.g. "pro", "copilot_business").
    pub plan: Option<String>,
    /// How the account was authenticated.
    pub login_method: Option<LoginMethod>,
}

impl ProviderIdentity {
    /// Creates an empty identity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if no field is populated.
    pub fn is_empty(&self) -> bool {
        self.account_email.is_none()
            && self.account_organization.is_none()
            && self.plan.is_none()
            && self.login_method.is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_name_round_trip() {
        for kind in ProviderKind::all() {
            let parsed: ProviderKind = kind.cli_name().parse().unwrap();
            assert_eq!(parsed, *kind);
        }
    }

    #[test]
    fn test_from_str_case_insensitive() {
        assert_eq!("Claude".parse::<ProviderKind>().unwrap(), ProviderKind::Claude);
        assert_eq!(" codex ".parse::<ProviderKind>().unwrap(), ProviderKind::Codex);
    }

    #[test]
    fn test_from_str_unknown() {
        assert!("not-a-provider".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_identity_is_empty() {
        assert!(ProviderIdentity::new().is_empty());

        let identity = ProviderIdentity {
            account_email: Some("user@example.com".to_string()),
            ..Default::default()
        };
        assert!(!identity.is_empty());
    }
}
