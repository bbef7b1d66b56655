//! Heuristic bearer-token and claim extraction from opaque browser storage.
//!
//! Single-page apps stash their tokens in local/session storage under
//! whatever key and wrapping their framework picked, so this module is
//! pattern matching, not parsing. It returns zero or more *plausible*
//! candidates ordered by the tier that produced them; callers must treat
//! every candidate as unverified.
//!
//! Tiers, evaluated in order with first-non-empty-wins per source value:
//!
//! 1. Key-name hints (`access_token`, `accessToken`, `id_token`, `idToken`)
//!    adjacent to a token-shaped run of characters.
//! 2. Recursive JSON value scan against a known token-key set.
//! 3. A generic three-segment dot-delimited token (JWT-shaped) regex.

use std::sync::OnceLock;

use base64::Engine;
use regex::Regex;
use serde_json::Value;

/// Key-name hint patterns, tier 1.
const HINT_PATTERNS: &[&str] = &[
    r"access_token[^A-Za-z0-9._\-+=/]+([A-Za-z0-9._\-+=/]{20,})",
    r"accessToken[^A-Za-z0-9._\-+=/]+([A-Za-z0-9._\-+=/]{20,})",
    r"id_token[^A-Za-z0-9._\-+=/]+([A-Za-z0-9._\-+=/]{20,})",
    r"idToken[^A-Za-z0-9._\-+=/]+([A-Za-z0-9._\-+=/]{20,})",
];

/// JSON keys whose string values are taken as tokens, tier 2.
const TOKEN_KEYS: &[&str] = &[
    "access_token",
    "accessToken",
    "id_token",
    "idToken",
    "token",
    "authToken",
    "authorization",
    "bearer",
];

/// Claim keys checked directly for a group/tenant identifier.
const GROUP_CLAIM_KEYS: &[&str] = &[
    "group_id", "groupId", "groupID", "gid", "tenant_id", "tenantId", "org_id", "orgId",
];

fn hint_regexes() -> &'static Vec<Regex> {
    static REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    REGEXES.get_or_init(|| {
        HINT_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("static regex"))
            .collect()
    })
}

fn jwt_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}")
            .expect("static regex")
    })
}

fn digit_run_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"[0-9]{4,}").expect("static regex"))
}

// ============================================================================
// Token extraction
// ============================================================================

/// Length/charset gate for token candidates.
///
/// Dot-segmented (JWT-shaped) values need three segments and 60+ chars;
/// opaque values need 60+ chars of token-safe characters.
pub fn looks_like_token(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.contains('.') && trimmed.split('.').count() >= 3 {
        return trimmed.len() >= 60;
    }
    trimmed.len() >= 60
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+' | '=' | '/'))
}

/// Extracts plausible bearer-token candidates from one storage value.
///
/// Evaluates the three tiers in order and stops at the first tier that
/// yields anything. Candidates are deduped preserving discovery order.
pub fn extract_token_candidates(value: &str) -> Vec<String> {
    let hinted = dedup(
        hint_regexes()
            .iter()
            .flat_map(|re| {
                re.captures_iter(value)
                    .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
            })
            .filter(|t| looks_like_token(t)),
    );
    if !hinted.is_empty() {
        return hinted;
    }

    if let Ok(json) = serde_json::from_str::<Value>(value) {
        let mut collected = Vec::new();
        collect_json_tokens(&json, &mut collected);
        let collected = dedup(collected.into_iter());
        if !collected.is_empty() {
            return collected;
        }
    }

    dedup(
        jwt_regex()
            .find_iter(value)
            .map(|m| m.as_str().to_string())
            .filter(|t| looks_like_token(t)),
    )
}

fn dedup(values: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for value in values {
        if seen.insert(value.clone()) {
            out.push(value);
        }
    }
    out
}

/// Recursively collects token-keyed strings from a JSON value. String
/// leaves that are themselves JSON (double-encoded state blobs) are
/// descended into.
fn collect_json_tokens(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if TOKEN_KEYS.contains(&key.as_str()) {
                    if let Some(s) = child.as_str() {
                        if looks_like_token(s) {
                            out.push(s.to_string());
                            continue;
                        }
                    }
                }
                collect_json_tokens(child, out);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect_json_tokens(child, out);
            }
        }
        Value::String(s) => {
            // Bare strings only count when reached through a token key, but
            // double-encoded JSON blobs still get descended into.
            if !looks_like_token(s) {
                if let Ok(nested) = serde_json::from_str::<Value>(s) {
                    collect_json_tokens(&nested, out);
                }
            }
        }
        _ => {}
    }
}

// ============================================================================
// Claim extraction
// ============================================================================

/// Decodes the middle (claims) segment of a JWT-shaped token.
///
/// The signature is neither read nor validated; only the base64url JSON
/// payload is of interest.
pub fn decode_jwt_claims(token: &str) -> Option<Value> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(payload))
        .ok()?;

    let value: Value = serde_json::from_slice(&decoded).ok()?;
    value.is_object().then_some(value)
}

/// Extracts a group/tenant identifier from a JWT's claims.
///
/// Checks the fixed candidate-key list first, then falls back to the first
/// claim (recursively) whose key contains "group".
pub fn group_id_from_jwt(token: &str) -> Option<String> {
    if !token.contains('.') {
        return None;
    }
    let claims = decode_jwt_claims(token)?;
    let map = claims.as_object()?;

    for key in GROUP_CLAIM_KEYS {
        if let Some(id) = map.get(*key).and_then(string_id) {
            return Some(id);
        }
    }

    find_group_value(&claims)
}

fn find_group_value(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if key.to_lowercase().contains("group") {
                    if let Some(id) = string_id(child) {
                        return Some(id);
                    }
                }
                if let Some(nested) = find_group_value(child) {
                    return Some(nested);
                }
            }
            None
        }
        Value::Array(items) => items.iter().find_map(find_group_value),
        _ => None,
    }
}

/// Normalizes a claim value into an identifier string. Numeric claims are
/// stringified; string claims yield their longest 4+ digit run when one
/// exists, else the trimmed string.
fn string_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            let longest = digit_run_regex()
                .find_iter(trimmed)
                .map(|m| m.as_str())
                .max_by_key(|m| m.len());
            Some(longest.unwrap_or(trimmed).to_string())
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn make_jwt(claims: &serde_json::Value) -> String {
        let engine = &base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = engine.encode(claims.to_string().as_bytes());
        // Signature is irrelevant to the decoder but must be long enough to
        // pass the token shape gate.
        format!("{header}.{payload}.{}", "x".repeat(43))
    }

    const OPAQUE: &str =
        "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789abcd";

    #[test]
    fn test_looks_like_token() {
        assert!(looks_like_token(OPAQUE));
        assert!(!looks_like_token("short"));
        assert!(!looks_like_token(&"contains spaces ".repeat(10)));

        let jwt = make_jwt(&serde_json::json!({"sub": "1"}));
        assert!(looks_like_token(&jwt));
    }

    #[test]
    fn test_hint_tier_wins() {
        let jwt = make_jwt(&serde_json::json!({"sub": "1"}));
        let blob = format!("noise access_token=\"{OPAQUE}\" other {jwt} trailing");

        // The hint tier finds the opaque token and short-circuits; the bare
        // JWT from tier 3 must not appear.
        let tokens = extract_token_candidates(&blob);
        assert_eq!(tokens, vec![OPAQUE.to_string()]);
    }

    #[test]
    fn test_json_tier() {
        let blob = serde_json::json!({
            "state": { "auth": { "accessToken": OPAQUE } },
            "unrelated": 42
        })
        .to_string();

        let tokens = extract_token_candidates(&blob);
        assert_eq!(tokens, vec![OPAQUE.to_string()]);
    }

    #[test]
    fn test_json_tier_double_encoded() {
        let inner = serde_json::json!({"access_token": OPAQUE}).to_string();
        let blob = serde_json::json!({"persist:root": inner}).to_string();

        let tokens = extract_token_candidates(&blob);
        assert_eq!(tokens, vec![OPAQUE.to_string()]);
    }

    #[test]
    fn test_jwt_regex_tier() {
        let jwt = make_jwt(&serde_json::json!({"sub": "user"}));
        let blob = format!("garbage {jwt} more garbage");

        let tokens = extract_token_candidates(&blob);
        assert_eq!(tokens, vec![jwt]);
    }

    #[test]
    fn test_no_candidates() {
        assert!(extract_token_candidates("nothing token-like here").is_empty());
    }

    #[test]
    fn test_dedup_preserves_order() {
        let blob = format!("access_token: {OPAQUE}; accessToken: {OPAQUE}");
        let tokens = extract_token_candidates(&blob);
        assert_eq!(tokens.len(), 1);
    }

    #[test]
    fn test_decode_jwt_claims() {
        let jwt = make_jwt(&serde_json::json!({"email": "a@b.c", "GroupID": 12345}));
        let claims = decode_jwt_claims(&jwt).unwrap();
        assert_eq!(claims["email"], "a@b.c");
    }

    #[test]
    fn test_decode_jwt_claims_rejects_non_jwt() {
        assert!(decode_jwt_claims("no-dots-here").is_none());
        assert!(decode_jwt_claims("a.b").is_none());
    }

    #[test]
    fn test_group_id_direct_key() {
        let jwt = make_jwt(&serde_json::json!({"group_id": 987654}));
        assert_eq!(group_id_from_jwt(&jwt), Some("987654".to_string()));
    }

    #[test]
    fn test_group_id_fuzzy_key() {
        let jwt = make_jwt(&serde_json::json!({"UserGroupRef": "grp-20240101"}));
        assert_eq!(group_id_from_jwt(&jwt), Some("20240101".to_string()));
    }

    #[test]
    fn test_group_id_nested() {
        let jwt = make_jwt(&serde_json::json!({"profile": {"groupId": "555566"}}));
        assert_eq!(group_id_from_jwt(&jwt), Some("555566".to_string()));
    }

    #[test]
    fn test_group_id_absent() {
        let jwt = make_jwt(&serde_json::json!({"sub": "user"}));
        assert_eq!(group_id_from_jwt(&jwt), None);
    }
}
