//! Best-effort token scraping from browser local/session storage.
//!
//! Chromium keeps per-origin local and session storage in LevelDB
//! directories. No LevelDB schema is assumed here: the scanner walks the
//! raw `.ldb`/`.log` files, lifts printable runs out of the bytes, checks
//! for an origin signal, and hands the runs to the token heuristics. This
//! is deliberately lossy; it exists as a fallback for single-page apps
//! whose cookies alone cannot authenticate API calls.

use std::fs;
use std::path::Path;

use tracing::{debug, trace};

use crate::error::BrowserError;

use super::tokens;

/// Minimum printable-run length worth keeping. Shorter runs cannot contain
/// a token and mostly encode LevelDB structure.
const MIN_RUN_LEN: usize = 20;

/// Upper bound on bytes read per storage file. Storage files are small in
/// practice; the cap keeps a corrupt store from ballooning the scan.
const MAX_FILE_BYTES: u64 = 16 * 1024 * 1024;

/// A bearer token candidate recovered from browser storage.
#[derive(Debug, Clone)]
pub struct StorageToken {
    /// The candidate token.
    pub token: String,
    /// Group/tenant identifier recovered from the token's claims, if any.
    pub group_id: Option<String>,
    /// Human-readable source (browser, profile, store).
    pub source_label: String,
}

/// Extracts printable ASCII runs from raw bytes.
fn printable_runs(bytes: &[u8], min_len: usize) -> Vec<String> {
    let mut runs = Vec::new();
    let mut current = String::new();

    for &byte in bytes {
        if (0x20..0x7f).contains(&byte) {
            current.push(byte as char);
        } else if current.len() >= min_len {
            runs.push(std::mem::take(&mut current));
        } else {
            current.clear();
        }
    }
    if current.len() >= min_len {
        runs.push(current);
    }
    runs
}

fn is_storage_data_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("ldb") | Some("log")
    )
}

/// Scans one LevelDB-backed storage directory for token candidates.
///
/// Returns an empty list when the directory carries no trace of the target
/// origins — scanning an unrelated profile must not produce candidates.
pub fn scan_storage_dir(dir: &Path, origin_hints: &[String]) -> Result<Vec<String>, BrowserError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut runs: Vec<String> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_storage_data_file(&path) {
            continue;
        }
        if entry.metadata().map(|m| m.len()).unwrap_or(0) > MAX_FILE_BYTES {
            trace!(path = %path.display(), "Skipping oversized storage file");
            continue;
        }
        // The browser may hold a write lock; an unreadable file is skipped,
        // not fatal.
        match fs::read(&path) {
            Ok(bytes) => runs.extend(printable_runs(&bytes, MIN_RUN_LEN)),
            Err(e) => trace!(path = %path.display(), error = %e, "Skipping unreadable storage file"),
        }
    }

    let has_origin_signal = runs
        .iter()
        .any(|run| origin_hints.iter().any(|hint| run.contains(hint.as_str())));
    if !has_origin_signal {
        return Ok(Vec::new());
    }

    let mut seen = std::collections::HashSet::new();
    let mut candidates = Vec::new();
    for run in &runs {
        for token in tokens::extract_token_candidates(run) {
            if seen.insert(token.clone()) {
                candidates.push(token);
            }
        }
    }

    debug!(dir = %dir.display(), count = candidates.len(), "Storage scan complete");
    Ok(candidates)
}

/// Wraps scanned candidates with their claim-derived group id and source.
pub fn tokens_from_dir(
    dir: &Path,
    origin_hints: &[String],
    source_label: &str,
) -> Vec<StorageToken> {
    let candidates = match scan_storage_dir(dir, origin_hints) {
        Ok(candidates) => candidates,
        Err(e) => {
            trace!(dir = %dir.display(), error = %e, "Storage scan failed");
            return Vec::new();
        }
    };

    candidates
        .into_iter()
        .map(|token| {
            let group_id = tokens::group_id_from_jwt(&token);
            StorageToken {
                token,
                group_id,
                source_label: source_label.to_string(),
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
