//! JetBrains AI Assistant quota file parser.
//!
//! The IDE persists quota state in an options XML file whose attribute
//! values hold entity-encoded JSON:
//!
//! ```xml
//! <component name="AIAssistantQuotaManager2">
//!   <option name="quotaInfo" value="{&quot;current&quot;:&quot;7478.3&quot;,...}" />
//!   <option name="nextRefill" value="{&quot;next&quot;:&quot;2026-01-16T14:00:54Z&quot;,...}" />
//! </component>
//! ```
//!
//! Parsing is regex-based and attribute-order-insensitive; numeric fields
//! arrive as JSON strings.

use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use quotabar_core::{Credits, RateWindow, UsageSnapshot};
use quotabar_fetch::{FetchContext, FetchError};
use regex::Regex;
use serde_json::Value;

/// Component holding the quota options.
const COMPONENT_NAME: &str = "AIAssistantQuotaManager2";

/// Environment variable overriding the JetBrains config root.
pub const CONFIG_ROOT_ENV: &str = "JETBRAINS_CONFIG_DIR";

fn component_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(&format!(
            r#"(?s)<component[^>]*name\s*=\s*["']{COMPONENT_NAME}["'][^>]*>(.*?)</component>"#
        ))
        .expect("static regex")
    })
}

fn option_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<option\b[^>]*/?>").expect("static regex"))
}

fn attr_regex(name: &str) -> Regex {
    Regex::new(&format!(r#"{name}\s*=\s*(?:"([^"]*)"|'([^']*)')"#)).expect("static regex")
}

// ============================================================================
// Parsed shapes
// ============================================================================

/// Quota state from the `quotaInfo` option.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaInfo {
    /// Quota type label ("Available", "free", ...).
    pub kind: Option<String>,
    /// Units used so far.
    pub used: f64,
    /// Maximum units.
    pub maximum: f64,
    /// Units still available, when the tariff block reports it.
    pub available: Option<f64>,
    /// End of the current quota period.
    pub until: Option<DateTime<Utc>>,
}

/// Refill state from the `nextRefill` option.
#[derive(Debug, Clone, PartialEq)]
pub struct RefillInfo {
    /// Refill type label ("Known", ...).
    pub kind: Option<String>,
    /// Next refill time.
    pub next: Option<DateTime<Utc>>,
    /// Units granted per refill.
    pub amount: Option<f64>,
}

/// Everything the quota file yields.
#[derive(Debug, Clone)]
pub struct QuotaFileSnapshot {
    /// Quota state (required).
    pub quota: QuotaInfo,
    /// Refill state (optional).
    pub refill: Option<RefillInfo>,
}

impl QuotaFileSnapshot {
    /// Converts the file state into a usage snapshot.
    pub fn into_usage_snapshot(self) -> UsageSnapshot {
        let used_percent = if self.quota.maximum > 0.0 {
            (self.quota.used / self.quota.maximum) * 100.0
        } else {
            0.0
        };

        let mut window = RateWindow::new(used_percent);
        window.resets_at = self
            .refill
            .as_ref()
            .and_then(|r| r.next)
            .or(self.quota.until);

        let mut snapshot = UsageSnapshot::new(window);
        if let Some(available) = self.quota.available {
            snapshot.credits = Some(Credits {
                remaining: available,
                total: (self.quota.maximum > 0.0).then_some(self.quota.maximum),
            });
        }
        snapshot
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Decodes the XML entities JetBrains emits into attribute values.
fn decode_entities(value: &str) -> String {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let numeric = NUMERIC.get_or_init(|| Regex::new(r"&#(\d+);").expect("static regex"));

    let named = value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">");

    let decoded = numeric.replace_all(&named, |caps: &regex::Captures<'_>| {
        caps[1]
            .parse::<u32>()
            .ok()
            .and_then(char::from_u32)
            .map_or_else(String::new, String::from)
    });

    // &amp; last, so "&amp;quot;" does not double-decode.
    decoded.replace("&amp;", "&")
}

/// Numeric fields arrive as JSON strings ("7478.3") or plain numbers.
fn json_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn json_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value.and_then(quotabar_core::decode::decode_flexible_timestamp)
}

/// Extracts the named option values out of the component block.
fn option_values(xml: &str) -> Option<std::collections::HashMap<String, String>> {
    let component = component_regex().captures(xml)?;
    let block = component.get(1)?.as_str();

    let name_re = attr_regex("name");
    let value_re = attr_regex("value");

    let mut values = std::collections::HashMap::new();
    for tag in option_regex().find_iter(block) {
        let tag = tag.as_str();
        let name = name_re
            .captures(tag)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string());
        let value = value_re
            .captures(tag)
            .and_then(|c| c.get(1).or_else(|| c.get(2)))
            .map(|m| m.as_str().to_string());
        if let (Some(name), Some(value)) = (name, value) {
            values.insert(name, decode_entities(&value));
        }
    }
    Some(values)
}

/// Parses the quota XML into a [`QuotaFileSnapshot`].
pub fn parse_quota_xml(xml: &str) -> Result<QuotaFileSnapshot, FetchError> {
    let options = option_values(xml)
        .ok_or_else(|| FetchError::ParseFailed("no AI quota component in file".to_string()))?;

    let quota_json = options
        .get("quotaInfo")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| FetchError::ParseFailed("no quota info in file".to_string()))?;

    let quota_value: Value = serde_json::from_str(quota_json)
        .map_err(|e| FetchError::ParseFailed(format!("quota info is not JSON: {e}")))?;

    let tariff = quota_value.get("tariffQuota");
    let quota = QuotaInfo {
        kind: quota_value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string),
        used: json_number(quota_value.get("current")).unwrap_or(0.0),
        maximum: json_number(quota_value.get("maximum")).unwrap_or(0.0),
        available: json_number(tariff.and_then(|t| t.get("available"))).or_else(|| {
            let max = json_number(quota_value.get("maximum"))?;
            let used = json_number(quota_value.get("current"))?;
            Some(max - used)
        }),
        until: json_timestamp(quota_value.get("until")),
    };

    let refill = options
        .get("nextRefill")
        .filter(|v| !v.trim().is_empty())
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .map(|value| RefillInfo {
            kind: value.get("type").and_then(Value::as_str).map(str::to_string),
            next: json_timestamp(value.get("next")),
            amount: json_number(value.get("tariff").and_then(|t| t.get("amount"))),
        });

    Ok(QuotaFileSnapshot { quota, refill })
}

// ============================================================================
// File discovery
// ============================================================================

fn config_roots(ctx: &FetchContext) -> Vec<PathBuf> {
    if let Some(custom) = ctx.env_var(CONFIG_ROOT_ENV) {
        return vec![PathBuf::from(custom)];
    }
    let Some(home) = dirs::home_dir() else {
        return Vec::new();
    };
    if cfg!(target_os = "macos") {
        vec![home.join("Library/Application Support/JetBrains")]
    } else {
        vec![home.join(".config/JetBrains")]
    }
}

/// Finds quota option files across installed IDE versions, newest first.
pub fn quota_files(ctx: &FetchContext) -> Vec<PathBuf> {
    let mut found: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();

    for root in config_roots(ctx) {
        let Ok(ide_dirs) = std::fs::read_dir(&root) else {
            continue;
        };
        for ide in ide_dirs.flatten() {
            let options = ide.path().join("options");
            let Ok(files) = std::fs::read_dir(&options) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) != Some("xml") {
                    continue;
                }
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                if !content.contains(COMPONENT_NAME) {
                    continue;
                }
                if let Ok(modified) = file.metadata().and_then(|m| m.modified()) {
                    found.push((path, modified));
                }
            }
        }
    }

    found.sort_by(|a, b| b.1.cmp(&a.1));
    found.into_iter().map(|(path, _)| path).collect()
}

// ============================================================================
// Tests
// ============================================================================
