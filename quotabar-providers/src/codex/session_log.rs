//! Codex session-log reader.
//!
//! The Codex CLI appends newline-delimited JSON events to
//! `$CODEX_HOME/sessions/**/rollout-*.jsonl` (default `~/.codex`). Rate
//! limit state rides along on `token_count` events. The reader scans the
//! newest session file tail-first and returns the most recent event that
//! carries a `rate_limits` object; unrelated events are skipped silently.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use quotabar_core::decode::{decode_flexible_timestamp, decode_rate_window};
use quotabar_core::{LoginMethod, ProviderIdentity, UsageSnapshot};
use quotabar_fetch::host::browser::tokens::decode_jwt_claims;
use quotabar_fetch::{FetchContext, FetchError};
use serde_json::Value;
use tracing::{debug, trace};

/// Bytes read from the end of a session file before falling back to a full
/// scan. Rate-limit events cluster near the tail of active sessions.
const TAIL_WINDOW_BYTES: u64 = 512 * 1024;

/// Environment variable overriding the Codex home directory.
pub const CODEX_HOME_ENV: &str = "CODEX_HOME";

// ============================================================================
// Reader
// ============================================================================

/// Reads usage snapshots out of local Codex session logs.
#[derive(Debug, Clone)]
pub struct SessionLogReader {
    home: PathBuf,
}

impl SessionLogReader {
    /// Resolves the Codex home from the context's environment, falling back
    /// to `~/.codex`.
    pub fn from_context(ctx: &FetchContext) -> Option<Self> {
        let home = match ctx.env_var(CODEX_HOME_ENV) {
            Some(custom) => PathBuf::from(custom),
            None => dirs::home_dir()?.join(".codex"),
        };
        Some(Self { home })
    }

    /// Creates a reader rooted at an explicit home directory.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    fn sessions_dir(&self) -> PathBuf {
        self.home.join("sessions")
    }

    /// Cheap availability check: the sessions directory exists.
    pub fn has_sessions(&self) -> bool {
        self.sessions_dir().is_dir()
    }

    /// Scans session logs newest-first and returns the latest usage snapshot.
    pub fn latest_snapshot(&self) -> Result<UsageSnapshot, FetchError> {
        let files = self.session_files_sorted()?;

        for file in &files {
            trace!(file = %file.display(), "Scanning session log");
            if let Some(snapshot) = scan_file(file)? {
                return Ok(snapshot);
            }
        }

        Err(FetchError::ParseFailed(
            "found Codex sessions, but no rate limit events yet".to_string(),
        ))
    }

    /// Session files, newest modification first.
    fn session_files_sorted(&self) -> Result<Vec<PathBuf>, FetchError> {
        let sessions = self.sessions_dir();
        if !sessions.is_dir() {
            return Err(FetchError::NotInstalled(
                "no Codex sessions found yet; run at least one Codex prompt first".to_string(),
            ));
        }

        let mut files: Vec<(PathBuf, SystemTime)> = Vec::new();
        collect_session_files(&sessions, &mut files);

        if files.is_empty() {
            return Err(FetchError::NotInstalled(
                "no Codex sessions found yet; run at least one Codex prompt first".to_string(),
            ));
        }

        files.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(files.into_iter().map(|(path, _)| path).collect())
    }

    /// Account identity from `auth.json`'s id token claims, if present.
    pub fn account_identity(&self) -> Option<ProviderIdentity> {
        let auth_path = self.home.join("auth.json");
        let content = fs::read_to_string(auth_path).ok()?;
        let auth: Value = serde_json::from_str(&content).ok()?;

        let id_token = auth
            .get("tokens")
            .and_then(|t| t.get("id_token"))
            .and_then(Value::as_str)?;
        let claims = decode_jwt_claims(id_token)?;

        let email = claims
            .get("email")
            .or_else(|| claims.get("https://api.openai.com/profile").and_then(|p| p.get("email")))
            .and_then(Value::as_str)
            .map(str::to_string);

        let plan = claims
            .get("https://api.openai.com/auth")
            .and_then(|a| a.get("chatgpt_plan_type"))
            .or_else(|| claims.get("chatgpt_plan_type"))
            .and_then(Value::as_str)
            .map(str::to_string);

        if email.is_none() && plan.is_none() {
            return None;
        }

        Some(ProviderIdentity {
            account_email: email,
            account_organization: None,
            plan,
            login_method: Some(LoginMethod::Cli),
        })
    }
}

fn collect_session_files(dir: &Path, out: &mut Vec<(PathBuf, SystemTime)>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_session_files(&path, out);
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.starts_with("rollout-") || !name.ends_with(".jsonl") {
            continue;
        }
        if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
            out.push((path, modified));
        }
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// Scans one file for the newest rate-limit event: tail window first, full
/// scan only when the tail had nothing.
fn scan_file(path: &Path) -> Result<Option<UsageSnapshot>, FetchError> {
    let (tail, truncated) = read_tail(path, TAIL_WINDOW_BYTES)
        .map_err(|e| FetchError::ParseFailed(format!("could not read session log: {e}")))?;

    if let Some(snapshot) = scan_lines_newest_first(&tail) {
        return Ok(Some(snapshot));
    }

    if truncated {
        debug!(file = %path.display(), "Tail window empty, falling back to full scan");
        let full = fs::read_to_string(path)
            .map_err(|e| FetchError::ParseFailed(format!("could not read session log: {e}")))?;
        return Ok(scan_lines_newest_first(&full));
    }

    Ok(None)
}

/// Reads up to `window` bytes from the end of the file. The first
/// (potentially partial) line is dropped when the read did not start at
/// offset zero. Returns the text and whether the file was truncated.
fn read_tail(path: &Path, window: u64) -> std::io::Result<(String, bool)> {
    let mut file = fs::File::open(path)?;
    let len = file.metadata()?.len();
    let truncated = len > window;
    let start = len.saturating_sub(window);

    file.seek(SeekFrom::Start(start))?;
    let mut buffer = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buffer)?;

    let mut text = String::from_utf8_lossy(&buffer).into_owned();
    if truncated {
        if let Some(newline) = text.find('\n') {
            text = text.split_off(newline + 1);
        } else {
            text.clear();
        }
    }
    Ok((text, truncated))
}

fn scan_lines_newest_first(text: &str) -> Option<UsageSnapshot> {
    text.lines().rev().find_map(snapshot_from_line)
}

/// Decodes one log line into a snapshot, or `None` for lines that are not
/// usage updates. Malformed lines are skipped, never errors.
fn snapshot_from_line(line: &str) -> Option<UsageSnapshot> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let json: Value = serde_json::from_str(line).ok()?;
    let json = json.as_object()?;

    // Modern logs nest the event under `payload`; older ones are flat.
    let payload = json
        .get("payload")
        .and_then(Value::as_object)
        .unwrap_or(json);

    let event_type = payload
        .get("type")
        .or_else(|| json.get("type"))
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)?;
    let recognized = event_type == "token_count"
        || event_type.contains("ratelimits")
        || event_type.contains("rate_limits");
    if !recognized {
        return None;
    }

    let rate = payload
        .get("rate_limits")
        .or_else(|| json.get("rate_limits"))
        .and_then(Value::as_object)?;

    let created_at = json
        .get("timestamp")
        .and_then(|v| decode_flexible_timestamp(v))
        .or_else(|| payload.get("timestamp").and_then(|v| decode_flexible_timestamp(v)))
        .or_else(|| payload.get("created_at").and_then(|v| decode_flexible_timestamp(v)))
        .unwrap_or_else(Utc::now);

    let captured_at: Option<DateTime<Utc>> =
        rate.get("captured_at").and_then(|v| decode_flexible_timestamp(v));

    let primary = decode_rate_window(
        rate.get("primary").unwrap_or(&Value::Null),
        created_at,
        captured_at,
    );

    let mut snapshot = UsageSnapshot::new(primary);
    if let Some(secondary) = rate.get("secondary") {
        snapshot.secondary = Some(decode_rate_window(secondary, created_at, captured_at));
    }
    snapshot.updated_at = captured_at.unwrap_or(created_at);
    Some(snapshot)
}

// ============================================================================
// Tests
// ============================================================================
