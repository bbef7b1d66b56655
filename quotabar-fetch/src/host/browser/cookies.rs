//! Cookie records, store kinds, and physical store readers.
//!
//! A browser profile may hold cookies in more than one physical store
//! (Chromium's legacy `Cookies` database and the newer `Network/Cookies`,
//! Safari's keychain-backed store). Records from all stores of a profile are
//! merged by `(name, domain, path)` key; a session cookie (no expiry) beats
//! any dated cookie for the same key, and a later expiry beats an earlier
//! one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::BrowserError;

use super::Browser;

/// Microseconds between the Windows epoch (1601) and the Unix epoch (1970).
const WINDOWS_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

/// Seconds between the Mac absolute epoch (2001) and the Unix epoch (1970).
const MAC_EPOCH_OFFSET_SECS: f64 = 978_307_200.0;

// ============================================================================
// Store Kinds & Records
// ============================================================================

/// The physical cookie store a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CookieStoreKind {
    /// Chromium's `Network/Cookies` database (current location).
    Network,
    /// Chromium's profile-root `Cookies` database (legacy location).
    Primary,
    /// Safari's keychain-backed store.
    SafariKeychain,
}

impl CookieStoreKind {
    /// Merge priority; lower wins ties so the network store is preferred.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Network => 0,
            Self::Primary => 1,
            Self::SafariKeychain => 2,
        }
    }
}

/// One cookie as read from a browser store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Cookie name.
    pub name: String,
    /// Domain the cookie belongs to (may carry a leading dot).
    pub domain: String,
    /// Path the cookie is valid for.
    pub path: String,
    /// Cookie value.
    pub value: String,
    /// Expiration time; `None` for session cookies.
    pub expires: Option<DateTime<Utc>>,
    /// The physical store this record came from.
    pub store_kind: CookieStoreKind,
}

impl CookieRecord {
    /// Dedup key: `(name, domain, path)`.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.name, self.domain, self.path)
    }

    /// Returns true if the cookie has a fixed expiry in the past.
    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|exp| exp < Utc::now())
    }

    /// Returns true if this cookie applies to the given domain.
    pub fn matches_domain(&self, domain: &str) -> bool {
        let cookie_domain = self.domain.trim_start_matches('.');
        domain == cookie_domain
            || domain.ends_with(&format!(".{cookie_domain}"))
            || cookie_domain.ends_with(&format!(".{domain}"))
    }
}

/// Builds a `Cookie:` header value from records.
pub fn cookie_header(records: &[CookieRecord]) -> String {
    records
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Merging
// ============================================================================

/// Returns true if `candidate` should replace `existing` for the same key.
///
/// Session cookies (no expiry) win over any dated cookie; between dated
/// cookies the later expiry wins. Two session cookies keep the first seen,
/// which (given store-priority ordering) is the network-kind record.
fn should_replace(existing: &CookieRecord, candidate: &CookieRecord) -> bool {
    match (existing.expires, candidate.expires) {
        (Some(_), None) => true,
        (Some(lhs), Some(rhs)) => rhs > lhs,
        (None, _) => false,
    }
}

/// Merges records from all of a profile's stores by `(name, domain, path)`.
pub fn merge_records(mut records: Vec<CookieRecord>) -> Vec<CookieRecord> {
    records.sort_by_key(|r| r.store_kind.priority());

    let mut merged: Vec<CookieRecord> = Vec::with_capacity(records.len());
    for record in records {
        match merged.iter_mut().find(|r| r.key() == record.key()) {
            Some(existing) => {
                if should_replace(existing, &record) {
                    *existing = record;
                }
            }
            None => merged.push(record),
        }
    }
    merged
}

// ============================================================================
// Store Readers
// ============================================================================

/// Copies a locked database to a temp path before opening.
///
/// Browsers keep their cookie stores write-locked while running; reading a
/// copy keeps the import best-effort instead of failing on contention.
fn copy_to_temp(source: &Path) -> Result<PathBuf, BrowserError> {
    let temp_path = std::env::temp_dir().join(format!(
        "quotabar_cookies_{}_{}.sqlite",
        std::process::id(),
        source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("store")
    ));

    fs::copy(source, &temp_path)
        .map_err(|e| BrowserError::ReadFailed(format!("failed to copy store: {e}")))?;

    Ok(temp_path)
}

fn open_read_only(path: &Path) -> Result<Connection, BrowserError> {
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| BrowserError::ReadFailed(format!("SQLite open error: {e}")))
}

/// Reads Firefox cookies (`moz_cookies`) matching any of the given domains.
pub fn read_firefox_cookies(
    db_path: &Path,
    domains: &[String],
) -> Result<Vec<CookieRecord>, BrowserError> {
    debug!(path = %db_path.display(), "Reading Firefox cookies");

    let temp_path = copy_to_temp(db_path)?;
    let result = read_firefox_inner(&temp_path, domains);
    let _ = fs::remove_file(&temp_path);
    result
}

fn read_firefox_inner(
    path: &Path,
    domains: &[String],
) -> Result<Vec<CookieRecord>, BrowserError> {
    let conn = open_read_only(path)?;

    let mut stmt = conn
        .prepare("SELECT name, value, host, path, expiry FROM moz_cookies")
        .map_err(|e| BrowserError::ReadFailed(format!("prepare error: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let expiry: i64 = row.get(4)?;
            Ok(CookieRecord {
                name: row.get(0)?,
                value: row.get(1)?,
                domain: row.get(2)?,
                path: row.get(3)?,
                expires: (expiry > 0).then(|| Utc.timestamp_opt(expiry, 0).single()).flatten(),
                store_kind: CookieStoreKind::Primary,
            })
        })
        .map_err(|e| BrowserError::ReadFailed(format!("query error: {e}")))?
        .filter_map(Result::ok)
        .filter(|c| !c.is_expired() && domains.iter().any(|d| c.matches_domain(d)))
        .collect();

    Ok(rows)
}

/// Reads a Chromium cookie database matching any of the given domains.
///
/// `store_kind` tags where the database lives (`Network/Cookies` vs. the
/// legacy profile-root `Cookies`).
pub fn read_chromium_cookies(
    db_path: &Path,
    domains: &[String],
    browser: Browser,
    store_kind: CookieStoreKind,
) -> Result<Vec<CookieRecord>, BrowserError> {
    debug!(path = %db_path.display(), browser = %browser.display_name(), "Reading Chromium cookies");

    let temp_path = copy_to_temp(db_path)?;
    let result = read_chromium_inner(&temp_path, domains, browser, store_kind);
    let _ = fs::remove_file(&temp_path);
    result
}

fn read_chromium_inner(
    path: &Path,
    domains: &[String],
    browser: Browser,
    store_kind: CookieStoreKind,
) -> Result<Vec<CookieRecord>, BrowserError> {
    let conn = open_read_only(path)?;

    let mut stmt = conn
        .prepare(
            "SELECT name, value, encrypted_value, host_key, path, expires_utc FROM cookies",
        )
        .map_err(|e| BrowserError::ReadFailed(format!("prepare error: {e}")))?;

    type Row = (String, String, Vec<u8>, String, String, i64);
    let raw_rows: Vec<Row> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .map_err(|e| BrowserError::ReadFailed(format!("query error: {e}")))?
        .filter_map(Result::ok)
        .collect();

    let mut cookies = Vec::new();
    for (name, value, encrypted_value, host_key, path, expires_utc) in raw_rows {
        if !domains.iter().any(|d| domain_matches(&host_key, d)) {
            continue;
        }

        // Chromium stores expiry as microseconds since the Windows epoch.
        let expires = (expires_utc > 0)
            .then(|| {
                let unix_secs = (expires_utc - WINDOWS_EPOCH_OFFSET_MICROS) / 1_000_000;
                Utc.timestamp_opt(unix_secs, 0).single()
            })
            .flatten();

        let cookie_value = if !value.is_empty() {
            value
        } else if !encrypted_value.is_empty() {
            match decrypt_chromium_value(&encrypted_value, browser) {
                Ok(decrypted) => decrypted,
                Err(e) => {
                    trace!(name = %name, error = %e, "Skipping undecryptable cookie");
                    continue;
                }
            }
        } else {
            continue;
        };

        let record = CookieRecord {
            name,
            domain: host_key,
            path,
            value: cookie_value,
            expires,
            store_kind,
        };
        if !record.is_expired() {
            cookies.push(record);
        }
    }

    Ok(cookies)
}

fn domain_matches(host_key: &str, domain: &str) -> bool {
    let host = host_key.trim_start_matches('.');
    host == domain || host.ends_with(&format!(".{domain}")) || domain.ends_with(&format!(".{host}"))
}

/// Reads Safari's cookie store matching any of the given domains.
///
/// Only the SQLite layout is supported; the legacy `binarycookies` format
/// is reported as a read failure and callers fall through to other
/// browsers.
pub fn read_safari_cookies(
    db_path: &Path,
    domains: &[String],
) -> Result<Vec<CookieRecord>, BrowserError> {
    if db_path.extension().and_then(|e| e.to_str()) == Some("binarycookies") {
        return Err(BrowserError::ReadFailed(
            "Safari binarycookies format is not supported".to_string(),
        ));
    }

    debug!(path = %db_path.display(), "Reading Safari cookies");

    let temp_path = copy_to_temp(db_path)?;
    let result = read_safari_inner(&temp_path, domains);
    let _ = fs::remove_file(&temp_path);
    result
}

fn read_safari_inner(path: &Path, domains: &[String]) -> Result<Vec<CookieRecord>, BrowserError> {
    let conn = open_read_only(path)?;

    let mut stmt = conn
        .prepare("SELECT name, value, domain, path, expires FROM cookies")
        .map_err(|e| BrowserError::ReadFailed(format!("prepare error: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let expires_raw: Option<f64> = row.get(4).ok();
            // Safari stores Mac absolute time (seconds since 2001-01-01).
            let expires = expires_raw.and_then(|ts| {
                let unix = ts + MAC_EPOCH_OFFSET_SECS;
                Utc.timestamp_opt(unix as i64, 0).single()
            });
            Ok(CookieRecord {
                name: row.get(0)?,
                value: row.get(1)?,
                domain: row.get(2)?,
                path: row.get(3)?,
                expires,
                store_kind: CookieStoreKind::SafariKeychain,
            })
        })
        .map_err(|e| BrowserError::ReadFailed(format!("query error: {e}")))?
        .filter_map(Result::ok)
        .filter(|c| !c.is_expired() && domains.iter().any(|d| c.matches_domain(d)))
        .collect();

    Ok(rows)
}

// ============================================================================
// Chromium value decryption
// ============================================================================

/// Decrypts a Chromium `v10`/`v11` cookie value on macOS.
///
/// The per-browser encryption key lives in the login keychain under the
/// browser's "Safe Storage" service; the actual key is derived with
/// PBKDF2-HMAC-SHA1 (salt `saltysalt`, 1003 iterations, 16 bytes) and the
/// value is AES-128-CBC encrypted with a space-filled IV.
#[cfg(target_os = "macos")]
fn decrypt_chromium_value(encrypted: &[u8], browser: Browser) -> Result<String, BrowserError> {
    use std::io::Write;
    use std::num::NonZeroU32;
    use std::process::{Command, Stdio};

    if encrypted.len() < 4 {
        return Err(BrowserError::DecryptionFailed("data too short".to_string()));
    }

    let version = &encrypted[0..3];
    if version != b"v10" && version != b"v11" {
        return Err(BrowserError::DecryptionFailed(format!(
            "unknown encryption version: {version:?}"
        )));
    }

    let service_name = browser.safe_storage_service().ok_or_else(|| {
        BrowserError::DecryptionFailed(format!(
            "{} does not use Safe Storage",
            browser.display_name()
        ))
    })?;

    let entry = keyring::Entry::new(service_name, "")
        .map_err(|e| BrowserError::DecryptionFailed(format!("keychain error: {e}")))?;
    let password = entry
        .get_password()
        .map_err(|e| BrowserError::DecryptionFailed(format!("no Safe Storage entry: {e}")))?;

    let mut key = [0u8; 16];
    ring::pbkdf2::derive(
        ring::pbkdf2::PBKDF2_HMAC_SHA1,
        NonZeroU32::new(1003).unwrap(),
        b"saltysalt",
        password.as_bytes(),
        &mut key,
    );

    let iv = [b' '; 16];
    let ciphertext = &encrypted[3..];

    // Key material goes through the environment, not argv, so it never
    // shows up in process listings.
    let mut child = Command::new("sh")
        .arg("-c")
        .arg("openssl enc -d -aes-128-cbc -K \"$QUOTABAR_KEY\" -iv \"$QUOTABAR_IV\"")
        .env("QUOTABAR_KEY", hex_encode(&key))
        .env("QUOTABAR_IV", hex_encode(&iv))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| BrowserError::DecryptionFailed(e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(ciphertext)
            .map_err(|e| BrowserError::DecryptionFailed(e.to_string()))?;
    }

    let output = child
        .wait_with_output()
        .map_err(|e| BrowserError::DecryptionFailed(e.to_string()))?;

    if !output.status.success() {
        return Err(BrowserError::DecryptionFailed("openssl failed".to_string()));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| BrowserError::DecryptionFailed(format!("UTF-8 error: {e}")))
}

#[cfg(not(target_os = "macos"))]
fn decrypt_chromium_value(_encrypted: &[u8], _browser: Browser) -> Result<String, BrowserError> {
    Err(BrowserError::DecryptionFailed(
        "Chromium cookie decryption is only supported on macOS".to_string(),
    ))
}

#[cfg(target_os = "macos")]
fn hex_encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(name: &str, expires: Option<DateTime<Utc>>, kind: CookieStoreKind) -> CookieRecord {
        CookieRecord {
            name: name.to_string(),
            domain: ".example.com".to_string(),
            path: "/".to_string(),
            value: format!("{name}-{kind:?}"),
            expires,
            store_kind: kind,
        }
    }

    #[test]
    fn test_session_cookie_wins_merge() {
        let dated = record(
            "session",
            Some(Utc::now() + Duration::hours(1)),
            CookieStoreKind::Primary,
        );
        let sessiony = record("session", None, CookieStoreKind::Network);

        let merged = merge_records(vec![dated.clone(), sessiony.clone()]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].expires, None);

        // Order of input must not matter.
        let merged = merge_records(vec![sessiony, dated]);
        assert_eq!(merged[0].expires, None);
    }

    #[test]
    fn test_later_expiry_wins_merge() {
        let t1 = Utc::now() + Duration::hours(1);
        let t2 = Utc::now() + Duration::hours(2);

        let merged = merge_records(vec![
            record("auth", Some(t1), CookieStoreKind::Network),
            record("auth", Some(t2), CookieStoreKind::Primary),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].expires, Some(t2));
    }

    #[test]
    fn test_network_store_preferred_on_equal_candidates() {
        let merged = merge_records(vec![
            record("token", None, CookieStoreKind::Primary),
            record("token", None, CookieStoreKind::Network),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].store_kind, CookieStoreKind::Network);
    }

    #[test]
    fn test_distinct_keys_not_merged() {
        let mut other = record("other", None, CookieStoreKind::Network);
        other.domain = ".elsewhere.com".to_string();

        let merged = merge_records(vec![
            record("token", None, CookieStoreKind::Network),
            other,
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_matches_domain() {
        let cookie = record("s", None, CookieStoreKind::Network);
        assert!(cookie.matches_domain("example.com"));
        assert!(cookie.matches_domain("app.example.com"));
        assert!(!cookie.matches_domain("notexample.com"));
    }

    #[test]
    fn test_cookie_header() {
        let mut a = record("a", None, CookieStoreKind::Network);
        a.value = "1".to_string();
        let mut b = record("b", None, CookieStoreKind::Network);
        b.value = "2".to_string();

        assert_eq!(cookie_header(&[a, b]), "a=1; b=2");
    }

    #[test]
    fn test_is_expired() {
        let past = record(
            "old",
            Some(Utc::now() - Duration::hours(1)),
            CookieStoreKind::Primary,
        );
        assert!(past.is_expired());

        let session = record("live", None, CookieStoreKind::Primary);
        assert!(!session.is_expired());
    }

    #[test]
    fn test_store_kind_priority_order() {
        assert!(CookieStoreKind::Network.priority() < CookieStoreKind::Primary.priority());
        assert!(CookieStoreKind::Primary.priority() < CookieStoreKind::SafariKeychain.priority());
    }
}
