//! Browser credential import.
//!
//! Produces per-profile cookie sessions and best-effort storage tokens for
//! a provider's domain set. Browsers are visited in a configurable priority
//! order and skipped entirely when they have no profile data on disk, so a
//! fetch never triggers a credential-store prompt for a browser the user
//! does not use.

pub mod cookies;
pub mod storage;
pub mod tokens;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

use crate::error::BrowserError;

pub use cookies::{cookie_header, CookieRecord, CookieStoreKind};
pub use storage::StorageToken;

// ============================================================================
// Browser Enum
// ============================================================================

/// Browsers whose credential stores QuotaBar can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    /// Brave (Chromium-based).
    Brave,
    /// Google Chrome.
    Chrome,
    /// Microsoft Edge (Chromium-based).
    Edge,
    /// Arc (Chromium-based).
    Arc,
    /// Vivaldi (Chromium-based).
    Vivaldi,
    /// Plain Chromium.
    Chromium,
    /// Mozilla Firefox.
    Firefox,
    /// Apple Safari (macOS only).
    Safari,
}

impl Browser {
    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Brave => "Brave",
            Self::Chrome => "Chrome",
            Self::Edge => "Edge",
            Self::Arc => "Arc",
            Self::Vivaldi => "Vivaldi",
            Self::Chromium => "Chromium",
            Self::Firefox => "Firefox",
            Self::Safari => "Safari",
        }
    }

    /// Default import order: privacy-preserving browser first, then the
    /// major Chromium variants, then Firefox and Safari. Providers may pass
    /// their own order to the importer.
    pub fn default_import_order() -> &'static [Browser] {
        &[
            Self::Brave,
            Self::Chrome,
            Self::Edge,
            Self::Arc,
            Self::Vivaldi,
            Self::Chromium,
            Self::Firefox,
            Self::Safari,
        ]
    }

    /// Returns true for Chromium-family browsers.
    pub fn is_chromium(&self) -> bool {
        !matches!(self, Self::Firefox | Self::Safari)
    }

    /// macOS keychain service holding the browser's cookie encryption key.
    pub fn safe_storage_service(&self) -> Option<&'static str> {
        match self {
            Self::Brave => Some("Brave Safe Storage"),
            Self::Chrome => Some("Chrome Safe Storage"),
            Self::Edge => Some("Microsoft Edge Safe Storage"),
            Self::Arc => Some("Arc Safe Storage"),
            Self::Vivaldi => Some("Vivaldi Safe Storage"),
            Self::Chromium => Some("Chromium Safe Storage"),
            Self::Firefox | Self::Safari => None,
        }
    }

    /// Root of the browser's user data (profiles live under it).
    #[cfg(target_os = "macos")]
    pub fn user_data_root(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let support = home.join("Library/Application Support");
        let path = match self {
            Self::Brave => support.join("BraveSoftware/Brave-Browser"),
            Self::Chrome => support.join("Google/Chrome"),
            Self::Edge => support.join("Microsoft Edge"),
            Self::Arc => support.join("Arc/User Data"),
            Self::Vivaldi => support.join("Vivaldi"),
            Self::Chromium => support.join("Chromium"),
            Self::Firefox => support.join("Firefox/Profiles"),
            Self::Safari => home.join("Library/Cookies"),
        };
        Some(path)
    }

    /// Root of the browser's user data (profiles live under it).
    #[cfg(not(target_os = "macos"))]
    pub fn user_data_root(&self) -> Option<PathBuf> {
        let home = dirs::home_dir()?;
        let path = match self {
            Self::Brave => home.join(".config/BraveSoftware/Brave-Browser"),
            Self::Chrome => home.join(".config/google-chrome"),
            Self::Edge => home.join(".config/microsoft-edge"),
            Self::Vivaldi => home.join(".config/vivaldi"),
            Self::Chromium => home.join(".config/chromium"),
            Self::Firefox => home.join(".mozilla/firefox"),
            Self::Arc | Self::Safari => return None,
        };
        Some(path)
    }

    /// Returns true if the browser left profile data on disk. Browsers
    /// without data are skipped to avoid pointless credential-store access.
    pub fn has_profile_data(&self) -> bool {
        self.user_data_root().is_some_and(|root| root.exists())
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// One browser profile with data on disk.
#[derive(Debug, Clone)]
pub struct BrowserProfile {
    /// Owning browser.
    pub browser: Browser,
    /// Profile directory name ("Default", "Profile 2", ...).
    pub name: String,
    /// Absolute profile path.
    pub path: PathBuf,
}

impl BrowserProfile {
    /// Label used in session/source reporting, e.g. "Chrome Default".
    pub fn label(&self) -> String {
        format!("{} {}", self.browser.display_name(), self.name)
    }

    /// Cookie stores belonging to this profile, tagged by kind.
    pub fn cookie_stores(&self) -> Vec<(PathBuf, CookieStoreKind)> {
        match self.browser {
            Browser::Firefox => {
                vec![(self.path.join("cookies.sqlite"), CookieStoreKind::Primary)]
            }
            Browser::Safari => vec![
                (self.path.join("Cookies.sqlite"), CookieStoreKind::SafariKeychain),
                (
                    self.path.join("Cookies.binarycookies"),
                    CookieStoreKind::SafariKeychain,
                ),
            ],
            _ => vec![
                (self.path.join("Network/Cookies"), CookieStoreKind::Network),
                (self.path.join("Cookies"), CookieStoreKind::Primary),
            ],
        }
    }

    /// Local-storage LevelDB directory (Chromium only).
    pub fn local_storage_dir(&self) -> Option<PathBuf> {
        self.browser
            .is_chromium()
            .then(|| self.path.join("Local Storage/leveldb"))
    }

    /// Session-storage LevelDB directory (Chromium only).
    pub fn session_storage_dir(&self) -> Option<PathBuf> {
        self.browser
            .is_chromium()
            .then(|| self.path.join("Session Storage"))
    }
}

fn chromium_profiles(browser: Browser, root: &Path) -> Vec<BrowserProfile> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut profiles: Vec<BrowserProfile> = entries
        .flatten()
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            (name == "Default" || name.starts_with("Profile ")).then(|| BrowserProfile {
                browser,
                name,
                path: e.path(),
            })
        })
        .collect();
    profiles.sort_by(|a, b| a.name.cmp(&b.name));
    profiles
}

fn firefox_profiles(root: &Path) -> Vec<BrowserProfile> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut release = Vec::new();
    let mut default = Vec::new();
    let mut other = Vec::new();

    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let profile = BrowserProfile {
            browser: Browser::Firefox,
            name: name.clone(),
            path: entry.path(),
        };
        if name.ends_with(".default-release") {
            release.push(profile);
        } else if name.ends_with(".default") {
            default.push(profile);
        } else {
            other.push(profile);
        }
    }

    release.into_iter().chain(default).chain(other).collect()
}

/// Discovers the profiles of one browser.
pub fn profiles_for(browser: Browser) -> Vec<BrowserProfile> {
    let Some(root) = browser.user_data_root() else {
        return Vec::new();
    };
    if !root.exists() {
        return Vec::new();
    }

    match browser {
        Browser::Firefox => firefox_profiles(&root),
        Browser::Safari => vec![BrowserProfile {
            browser,
            name: "Default".to_string(),
            path: root,
        }],
        _ => chromium_profiles(browser, &root),
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Cookies for one provider domain set from one browser profile.
#[derive(Debug, Clone)]
pub struct BrowserSession {
    /// Merged, non-expired cookie records.
    pub cookies: Vec<CookieRecord>,
    /// Where the session came from, e.g. "Brave Default".
    pub source_label: String,
}

impl BrowserSession {
    /// Builds the `Cookie:` header value for this session.
    pub fn cookie_header(&self) -> String {
        cookie_header(&self.cookies)
    }

    /// Earliest fixed expiry among the session's cookies, if any has one.
    pub fn earliest_expiry(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.cookies.iter().filter_map(|c| c.expires).min()
    }
}

// ============================================================================
// Importer
// ============================================================================

/// Imports cookie sessions and storage tokens from installed browsers.
#[derive(Debug, Clone, Default)]
pub struct BrowserImporter;

impl BrowserImporter {
    /// Creates a new importer.
    pub fn new() -> Self {
        Self
    }

    /// Browsers from `order` that have profile data on this machine.
    pub fn available_browsers(&self, order: &[Browser]) -> Vec<Browser> {
        order.iter().filter(|b| b.has_profile_data()).copied().collect()
    }

    /// Imports one session per profile holding cookies for `domains`.
    ///
    /// Browsers are visited in `order`; per-store read failures are
    /// tolerated (the browser may hold write locks). An empty overall
    /// result is [`BrowserError::NoCookies`].
    #[instrument(skip(self, domains, order), fields(domains = %domains.join(",")))]
    pub async fn import_sessions(
        &self,
        domains: Vec<String>,
        order: Vec<Browser>,
    ) -> Result<Vec<BrowserSession>, BrowserError> {
        tokio::task::spawn_blocking(move || import_sessions_blocking(&domains, &order))
            .await
            .map_err(|e| BrowserError::ReadFailed(format!("import task failed: {e}")))?
    }

    /// Imports the first available session for `domains`.
    pub async fn import_session(
        &self,
        domains: Vec<String>,
        order: Vec<Browser>,
    ) -> Result<BrowserSession, BrowserError> {
        let joined = domains.join(", ");
        self.import_sessions(domains, order)
            .await?
            .into_iter()
            .next()
            .ok_or(BrowserError::NoCookies(joined))
    }

    /// Scrapes bearer-token candidates for `origins` from local storage,
    /// falling back to session storage when local storage yields nothing.
    ///
    /// Best-effort: failures and empty profiles produce an empty list, not
    /// an error.
    #[instrument(skip(self, origin_hints, order))]
    pub async fn import_storage_tokens(
        &self,
        origin_hints: Vec<String>,
        order: Vec<Browser>,
    ) -> Vec<StorageToken> {
        tokio::task::spawn_blocking(move || import_storage_tokens_blocking(&origin_hints, &order))
            .await
            .unwrap_or_default()
    }
}

fn import_sessions_blocking(
    domains: &[String],
    order: &[Browser],
) -> Result<Vec<BrowserSession>, BrowserError> {
    let installed: Vec<Browser> = order
        .iter()
        .filter(|b| b.has_profile_data())
        .copied()
        .collect();
    if installed.is_empty() {
        return Err(BrowserError::NoBrowsersAvailable);
    }

    let mut sessions = Vec::new();

    for browser in &installed {
        for profile in profiles_for(*browser) {
            let mut records = Vec::new();
            for (store_path, kind) in profile.cookie_stores() {
                if !store_path.exists() {
                    continue;
                }
                let read = match (browser, kind) {
                    (Browser::Firefox, _) => cookies::read_firefox_cookies(&store_path, domains),
                    (Browser::Safari, _) => cookies::read_safari_cookies(&store_path, domains),
                    (b, kind) => cookies::read_chromium_cookies(&store_path, domains, *b, kind),
                };
                match read {
                    Ok(mut found) => records.append(&mut found),
                    Err(e) => {
                        trace!(store = %store_path.display(), error = %e, "Cookie store skipped");
                    }
                }
            }

            let merged = cookies::merge_records(records);
            if merged.is_empty() {
                continue;
            }

            debug!(
                profile = %profile.label(),
                count = merged.len(),
                "Imported cookie session"
            );
            sessions.push(BrowserSession {
                cookies: merged,
                source_label: profile.label(),
            });
        }
    }

    if sessions.is_empty() {
        return Err(BrowserError::NoCookies(domains.join(", ")));
    }
    Ok(sessions)
}

fn import_storage_tokens_blocking(
    origin_hints: &[String],
    order: &[Browser],
) -> Vec<StorageToken> {
    let mut found = Vec::new();

    for browser in order.iter().filter(|b| b.is_chromium() && b.has_profile_data()) {
        for profile in profiles_for(*browser) {
            if let Some(dir) = profile.local_storage_dir() {
                found.extend(storage::tokens_from_dir(&dir, origin_hints, &profile.label()));
            }
        }
    }

    if !found.is_empty() {
        return found;
    }

    // Session storage only when local storage was dry everywhere.
    for browser in order.iter().filter(|b| b.is_chromium() && b.has_profile_data()) {
        for profile in profiles_for(*browser) {
            if let Some(dir) = profile.session_storage_dir() {
                let label = format!("{} (Session Storage)", profile.label());
                found.extend(storage::tokens_from_dir(&dir, origin_hints, &label));
            }
        }
    }

    found
}

// ============================================================================
// Tests
// ============================================================================
