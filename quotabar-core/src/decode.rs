//! Flexible timestamp and rate-window decoding.
//!
//! Upstream sources disagree on units and key names: epoch seconds vs.
//! milliseconds vs. microseconds, `resets_at` vs. `resetAt` vs.
//! `reset_at_ms`, numbers serialized as strings. The helpers here normalize
//! all of that into [`RateWindow`] values so fetch strategies can stay
//! oblivious to the mess.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::RateWindow;

/// Reset-time keys in fallback order. The first present and parseable key
/// wins; `_ms`-suffixed keys run through magnitude normalization regardless
/// of the value's own magnitude.
const RESET_KEYS: &[&str] = &[
    "resets_at",
    "reset_at",
    "resetsAt",
    "resetAt",
    "resets_at_ms",
    "reset_at_ms",
];

// ============================================================================
// Epoch normalization
// ============================================================================

/// Normalizes a numeric timestamp to epoch seconds.
///
/// Values above `1e14` are interpreted as microseconds, above `1e11` as
/// milliseconds, otherwise as seconds. Already-normalized values pass
/// through unchanged, so the function is idempotent.
pub fn normalize_epoch_seconds(value: f64) -> f64 {
    if value > 1e14 {
        return value / 1_000_000.0;
    }
    if value > 1e11 {
        return value / 1_000.0;
    }
    value
}

fn timestamp_from_epoch(value: f64) -> Option<DateTime<Utc>> {
    let seconds = normalize_epoch_seconds(value);
    let secs = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos)
}

// ============================================================================
// Flexible timestamps
// ============================================================================

/// Decodes a timestamp from a JSON value of unknown shape.
///
/// Numbers go through the epoch magnitude rule. Purely numeric strings do
/// the same. Other strings are tried as ISO-8601, first with fractional
/// seconds, then without.
pub fn decode_flexible_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => timestamp_from_epoch(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return timestamp_from_epoch(s.parse::<f64>().ok()?);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            // Timezone-less timestamps show up in some session logs.
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc())
        }
        _ => None,
    }
}

fn decode_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

// ============================================================================
// Rate windows
// ============================================================================

/// Decodes one rate-limit window object into a [`RateWindow`].
///
/// The reset time is resolved through [`RESET_KEYS`] in order. When no key
/// resolves, the event's `captured_at` timestamp is used, then `created_at`.
pub fn decode_rate_window(
    value: &Value,
    created_at: DateTime<Utc>,
    captured_at: Option<DateTime<Utc>>,
) -> RateWindow {
    let Some(object) = value.as_object() else {
        return RateWindow {
            used_percent: 0.0,
            window_minutes: None,
            resets_at: Some(captured_at.unwrap_or(created_at)),
            reset_description: None,
        };
    };

    let used_percent = object
        .get("used_percent")
        .and_then(decode_numeric)
        .unwrap_or(0.0);

    let window_minutes = object
        .get("window_minutes")
        .and_then(Value::as_u64)
        .and_then(|m| u32::try_from(m).ok());

    let mut resets_at = None;
    for key in RESET_KEYS {
        let Some(raw) = object.get(*key) else { continue };
        let decoded = if key.ends_with("_ms") {
            decode_numeric(raw).and_then(timestamp_from_epoch)
        } else {
            decode_flexible_timestamp(raw)
        };
        if let Some(dt) = decoded {
            resets_at = Some(dt);
            break;
        }
    }

    let reset_description = object
        .get("reset_description")
        .and_then(Value::as_str)
        .map(str::to_string);

    RateWindow {
        used_percent,
        window_minutes,
        resets_at: resets_at.or(captured_at).or(Some(created_at)),
        reset_description,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_epoch_normalization_thresholds() {
        // seconds pass through unchanged
        assert_eq!(normalize_epoch_seconds(1_700_000_000.0), 1_700_000_000.0);
        // milliseconds divide by 1e3
        assert_eq!(normalize_epoch_seconds(1_700_000_000_000.0), 1_700_000_000.0);
        // microseconds divide by 1e6
        assert_eq!(
            normalize_epoch_seconds(1_700_000_000_000_000.0),
            1_700_000_000.0
        );
    }

    #[test]
    fn test_epoch_normalization_idempotent() {
        let once = normalize_epoch_seconds(1_700_000_000_000.0);
        assert_eq!(normalize_epoch_seconds(once), once);
    }

    #[test]
    fn test_flexible_timestamp_numeric_string() {
        let dt = decode_flexible_timestamp(&json!("1700000000")).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);

        let dt = decode_flexible_timestamp(&json!("1700000000000")).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_flexible_timestamp_iso() {
        let with_fraction = decode_flexible_timestamp(&json!("2025-01-01T12:00:00.500Z")).unwrap();
        assert_eq!(with_fraction.timestamp(), 1_735_732_800);

        let without_fraction = decode_flexible_timestamp(&json!("2025-01-01T12:00:00Z")).unwrap();
        assert_eq!(without_fraction.timestamp(), 1_735_732_800);

        let naive = decode_flexible_timestamp(&json!("2025-01-01T12:00:00")).unwrap();
        assert_eq!(naive.timestamp(), 1_735_732_800);
    }

    #[test]
    fn test_flexible_timestamp_rejects_garbage() {
        assert!(decode_flexible_timestamp(&json!("next tuesday")).is_none());
        assert!(decode_flexible_timestamp(&json!(null)).is_none());
        assert!(decode_flexible_timestamp(&json!([1, 2, 3])).is_none());
    }

    #[test]
    fn test_reset_key_order_stops_at_first_present() {
        let now = Utc::now();
        // resets_at must win even though reset_at_ms is also present.
        let window = decode_rate_window(
            &json!({"used_percent": 10, "resets_at": 100, "reset_at_ms": 999_000}),
            now,
            None,
        );
        assert_eq!(window.resets_at.unwrap().timestamp(), 100);
    }

    #[test]
    fn test_ms_suffix_applies_magnitude_normalization() {
        let now = Utc::now();
        let window = decode_rate_window(
            &json!({"reset_at_ms": 1_700_000_000_000_i64}),
            now,
            None,
        );
        assert_eq!(window.resets_at.unwrap().timestamp(), 1_700_000_000);

        // _ms keys accept numeric strings but not ISO timestamps.
        let window = decode_rate_window(&json!({"reset_at_ms": "1700000000000"}), now, None);
        assert_eq!(window.resets_at.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_reset_fallback_prefers_captured_at() {
        let created = DateTime::from_timestamp(1_000, 0).unwrap();
        let captured = DateTime::from_timestamp(2_000, 0).unwrap();

        let window = decode_rate_window(&json!({"used_percent": 5}), created, Some(captured));
        assert_eq!(window.resets_at, Some(captured));

        let window = decode_rate_window(&json!({"used_percent": 5}), created, None);
        assert_eq!(window.resets_at, Some(created));
    }

    #[test]
    fn test_used_percent_from_string() {
        let window = decode_rate_window(&json!({"used_percent": "42.5"}), Utc::now(), None);
        assert_eq!(window.used_percent, 42.5);
    }

    #[test]
    fn test_window_minutes_and_description() {
        let window = decode_rate_window(
            &json!({"used_percent": 1, "window_minutes": 300, "reset_description": "in 2h"}),
            Utc::now(),
            None,
        );
        assert_eq!(window.window_minutes, Some(300));
        assert_eq!(window.reset_description.as_deref(), Some("in 2h"));
    }
}
