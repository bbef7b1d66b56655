//! Output formatting for fetch results.

use quotabar_core::{ProviderKind, RateWindow};
use quotabar_fetch::FetchResult;

/// Renders a fetch result as human-readable text.
pub fn usage_text(provider: ProviderKind, result: &FetchResult) -> String {
    let snapshot = &result.snapshot;
    let mut out = format!(
        "{} (via {})\n",
        provider.display_name(),
        result.source_label()
    );

    out.push_str(&window_line("session", &snapshot.primary));
    if let Some(ref weekly) = snapshot.secondary {
        out.push_str(&window_line("weekly", weekly));
    }
    if let Some(ref premium) = snapshot.tertiary {
        out.push_str(&window_line("premium", premium));
    }

    if let Some(ref credits) = snapshot.credits {
        match credits.total {
            Some(total) => {
                out.push_str(&format!("  credits: {:.1} of {total:.1} left\n", credits.remaining));
            }
            None => out.push_str(&format!("  credits: {:.1} left\n", credits.remaining)),
        }
    }

    if let Some(ref identity) = snapshot.identity {
        let mut parts = Vec::new();
        if let Some(ref email) = identity.account_email {
            parts.push(email.clone());
        }
        if let Some(ref org) = identity.account_organization {
            parts.push(org.clone());
        }
        if let Some(ref plan) = identity.plan {
            parts.push(format!("plan: {plan}"));
        }
        if !parts.is_empty() {
            out.push_str(&format!("  account: {}\n", parts.join(", ")));
        }
    }

    out
}

fn window_line(label: &str, window: &RateWindow) -> String {
    let mut line = format!(
        "  {label}: {:.0}% used ({:.0}% remaining)",
        window.used_percent,
        window.remaining_percent()
    );
    if let Some(ref description) = window.reset_description {
        line.push_str(&format!(", resets {description}"));
    } else if let Some(resets_at) = window.resets_at {
        line.push_str(&format!(", resets {}", resets_at.format("%Y-%m-%d %H:%M UTC")));
    }
    line.push('\n');
    line
}

/// Renders a fetch result as pretty JSON.
pub fn usage_json(provider: ProviderKind, result: &FetchResult) -> anyhow::Result<String> {
    let value = serde_json::json!({
        "provider": provider.cli_name(),
        "source": result.source_label(),
        "strategy": result.strategy_id,
        "snapshot": result.snapshot,
    });
    Ok(serde_json::to_string_pretty(&value)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quotabar_core::{Credits, UsageSnapshot};
    use quotabar_fetch::StrategyKind;

    fn sample_result() -> FetchResult {
        let mut snapshot = UsageSnapshot::new(RateWindow::new(25.0));
        snapshot.secondary = Some(RateWindow::new(40.0));
        snapshot.credits = Some(Credits {
            remaining: 750.0,
            total: Some(1000.0),
        });
        FetchResult::new(snapshot, "claude.oauth", StrategyKind::OAuth)
    }

    #[test]
    fn test_usage_text() {
        let text = usage_text(ProviderKind::Claude, &sample_result());
        assert!(text.contains("Claude (via oauth)"));
        assert!(text.contains("session: 25% used (75% remaining)"));
        assert!(text.contains("weekly: 40% used"));
        assert!(text.contains("credits: 750.0 of 1000.0 left"));
    }

    #[test]
    fn test_usage_json_round_trips() {
        let json = usage_json(ProviderKind::Claude, &sample_result()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["provider"], "claude");
        assert_eq!(value["source"], "oauth");
        assert_eq!(value["snapshot"]["primary"]["used_percent"], 25.0);
    }
}
