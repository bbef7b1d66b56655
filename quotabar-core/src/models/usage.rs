//! Usage-related types.
//!
//! This module contains the point-in-time usage model:
//! - [`UsageSnapshot`] - One read of a provider's quota state
//! - [`RateWindow`] - One quota window's usage percentage and reset time
//! - [`Credits`] - Credit balances for providers that meter in credits

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderIdentity;

// ============================================================================
// Rate Window
// ============================================================================

/// A single quota window: usage percentage, optional duration, reset time.
///
/// Windows are immutable once constructed; a new fetch produces new windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateWindow {
    /// Percentage of quota used. Upstream values outside [0, 100] are kept
    /// as reported; [`RateWindow::remaining_percent`] clamps instead.
    pub used_percent: f64,
    /// Window duration in minutes (300 = 5 hours, 10080 = 1 week).
    pub window_minutes: Option<u32>,
    /// When this window resets.
    pub resets_at: Option<DateTime<Utc>>,
    /// Human-readable reset description (e.g. "in 2 hours").
    pub reset_description: Option<String>,
}

impl RateWindow {
    /// Creates a window with the given usage percentage and nothing else.
    pub fn new(used_percent: f64) -> Self {
        Self {
            used_percent,
            window_minutes: None,
            resets_at: None,
            reset_description: None,
        }
    }

    /// Remaining percentage, clamped to zero for malformed over-100 inputs.
    pub fn remaining_percent(&self) -> f64 {
        (100.0 - self.used_percent).max(0.0)
    }

    /// Returns true if usage has reached the limit.
    pub fn is_exhausted(&self) -> bool {
        self.used_percent >= 100.0
    }

    /// Time until reset relative to now, if a reset time is known.
    pub fn time_until_reset(&self) -> Option<Duration> {
        self.resets_at.map(|reset| reset - Utc::now())
    }
}

// ============================================================================
// Credits
// ============================================================================

/// Credit balance for providers that meter in credits rather than percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    /// Remaining credits.
    pub remaining: f64,
    /// Total credits, if the plan exposes one.
    pub total: Option<f64>,
}

impl Credits {
    /// Creates a balance with the given remaining amount.
    pub fn new(remaining: f64) -> Self {
        Self {
            remaining,
            total: None,
        }
    }

    /// Usage percentage, if the total is known and positive.
    pub fn used_percent(&self) -> Option<f64> {
        self.total.and_then(|total| {
            (total > 0.0).then(|| ((total - self.remaining) / total) * 100.0)
        })
    }
}

// ============================================================================
// Usage Snapshot
// ============================================================================

/// One point-in-time usage read for a provider.
///
/// The primary window is always present; secondary and tertiary windows are
/// provider-dependent (e.g. weekly and premium-tier quotas). Snapshots are
/// never mutated, only replaced by the next fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Primary usage window (typically the session window).
    pub primary: RateWindow,
    /// Secondary usage window (typically weekly/monthly).
    pub secondary: Option<RateWindow>,
    /// Tertiary usage window (premium tier, where the provider has one).
    pub tertiary: Option<RateWindow>,
    /// Credit balance, for credit-metered providers.
    pub credits: Option<Credits>,
    /// When this snapshot was captured.
    pub updated_at: DateTime<Utc>,
    /// Account identity, where the source exposes one.
    pub identity: Option<ProviderIdentity>,
}

impl UsageSnapshot {
    /// Creates a snapshot with the given primary window, captured now.
    pub fn new(primary: RateWindow) -> Self {
        Self {
            primary,
            secondary: None,
            tertiary: None,
            credits: None,
            updated_at: Utc::now(),
            identity: None,
        }
    }

    /// Returns the highest usage percentage across all windows.
    pub fn max_used_percent(&self) -> f64 {
        let mut max = self.primary.used_percent;
        if let Some(ref w) = self.secondary {
            max = max.max(w.used_percent);
        }
        if let Some(ref w) = self.tertiary {
            max = max.max(w.used_percent);
        }
        max
    }

    /// Returns true if any window is above the given threshold.
    pub fn is_above(&self, threshold: f64) -> bool {
        self.max_used_percent() > threshold
    }

    /// Returns true if this snapshot is older than the given threshold.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        Utc::now() - self.updated_at > threshold
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_percent() {
        assert_eq!(RateWindow::new(0.0).remaining_percent(), 100.0);
        assert_eq!(RateWindow::new(25.0).remaining_percent(), 75.0);
        assert_eq!(RateWindow::new(100.0).remaining_percent(), 0.0);
    }

    #[test]
    fn test_remaining_percent_clamps_malformed_input() {
        // Upstream occasionally reports >100%; remaining must clamp to zero.
        assert_eq!(RateWindow::new(130.0).remaining_percent(), 0.0);
    }

    #[test]
    fn test_is_exhausted() {
        assert!(!RateWindow::new(99.9).is_exhausted());
        assert!(RateWindow::new(100.0).is_exhausted());
    }

    #[test]
    fn test_credits_used_percent() {
        let mut credits = Credits::new(25.0);
        assert_eq!(credits.used_percent(), None);

        credits.total = Some(100.0);
        assert_eq!(credits.used_percent(), Some(75.0));

        credits.total = Some(0.0);
        assert_eq!(credits.used_percent(), None);
    }

    #[test]
    fn test_snapshot_max_used_percent() {
        let mut snapshot = UsageSnapshot::new(RateWindow::new(50.0));
        snapshot.secondary = Some(RateWindow::new(85.0));
        snapshot.tertiary = Some(RateWindow::new(30.0));

        assert_eq!(snapshot.max_used_percent(), 85.0);
        assert!(snapshot.is_above(80.0));
        assert!(!snapshot.is_above(90.0));
    }

    #[test]
    fn test_snapshot_staleness() {
        let mut snapshot = UsageSnapshot::new(RateWindow::new(10.0));
        assert!(!snapshot.is_stale(Duration::minutes(5)));

        snapshot.updated_at = Utc::now() - Duration::minutes(10);
        assert!(snapshot.is_stale(Duration::minutes(5)));
    }
}
