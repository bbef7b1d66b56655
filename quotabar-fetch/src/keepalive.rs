//! Background session keepalive.
//!
//! One keepalive runs per monitored browser session. On a fixed tick it
//! decides whether the session's cookies are close enough to expiry to be
//! worth refreshing, probes a small list of candidate identity endpoints
//! with the current cookie header, and re-imports cookies when the probe
//! succeeds so foreground fetches never stall on a cold import.
//!
//! The refresh decision and probe-body classification are pure functions so
//! the timing rules are directly testable.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::error::FetchError;
use crate::host::browser::{Browser, BrowserImporter, CookieRecord};

// ============================================================================
// Configuration
// ============================================================================

/// Timing knobs for the keepalive loop.
#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    /// How often to check whether a refresh is needed.
    pub check_interval: Duration,
    /// Refresh when time-to-earliest-expiry drops below this buffer.
    pub refresh_buffer: Duration,
    /// Minimum spacing between refresh attempts (rate limit).
    pub min_refresh_interval: Duration,
    /// For pure session cookies: refresh when the last success is older
    /// than this.
    pub session_stale_after: Duration,
    /// Per-request probe timeout.
    pub request_timeout: Duration,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            refresh_buffer: Duration::from_secs(300),
            min_refresh_interval: Duration::from_secs(120),
            session_stale_after: Duration::from_secs(1800),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Which endpoints to probe and which cookies to (re-)import.
#[derive(Debug, Clone)]
pub struct SessionProbePlan {
    /// Candidate session/identity endpoints, probed in order.
    pub endpoints: Vec<String>,
    /// Origin/Referer header value, when the endpoint expects one.
    pub origin: Option<String>,
    /// Cookie domains of the monitored session.
    pub domains: Vec<String>,
    /// Browser priority order for imports.
    pub browser_order: Vec<Browser>,
}

// ============================================================================
// Pure decision functions
// ============================================================================

/// Rate limit: returns true if enough time has passed since `last_attempt`.
pub fn may_attempt(
    now: DateTime<Utc>,
    last_attempt: Option<DateTime<Utc>>,
    config: &KeepaliveConfig,
) -> bool {
    match last_attempt {
        None => true,
        Some(at) => {
            let elapsed = (now - at).to_std().unwrap_or(Duration::ZERO);
            elapsed >= config.min_refresh_interval
        }
    }
}

/// Decides whether the session needs a refresh.
///
/// Cookies without any fixed expiry refresh on first run and whenever the
/// last success is older than the staleness window. Dated cookies refresh
/// when the earliest expiry is closer than the buffer.
pub fn needs_refresh(
    cookies: &[CookieRecord],
    now: DateTime<Utc>,
    last_success: Option<DateTime<Utc>>,
    config: &KeepaliveConfig,
) -> bool {
    let earliest = cookies.iter().filter_map(|c| c.expires).min();

    match earliest {
        None => match last_success {
            None => true,
            Some(at) => {
                let elapsed = (now - at).to_std().unwrap_or(Duration::ZERO);
                elapsed > config.session_stale_after
            }
        },
        Some(expiry) => {
            let Ok(remaining) = (expiry - now).to_std() else {
                return true; // already expired
            };
            remaining < config.refresh_buffer
        }
    }
}

/// Returns true if a probe response body looks like a session identity.
pub fn is_identity_shaped(body: &Value) -> bool {
    body.as_object().is_some_and(|map| {
        map.contains_key("user") || map.contains_key("email") || map.contains_key("session")
    })
}

// ============================================================================
// Keepalive
// ============================================================================

/// Observable keepalive bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct KeepaliveStatus {
    /// When a refresh was last attempted.
    pub last_attempt: Option<DateTime<Utc>>,
    /// When a refresh last succeeded.
    pub last_success: Option<DateTime<Utc>>,
    /// Description of the last failure, if the last cycle failed.
    pub last_error: Option<String>,
}

/// Background keepalive for one provider's browser session.
pub struct SessionKeepalive {
    config: KeepaliveConfig,
    plan: SessionProbePlan,
    importer: Arc<BrowserImporter>,
    status: Arc<Mutex<KeepaliveStatus>>,
    stop: Arc<Notify>,
    refreshing: Arc<tokio::sync::Mutex<()>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SessionKeepalive {
    /// Creates a keepalive with default timing.
    pub fn new(plan: SessionProbePlan, importer: Arc<BrowserImporter>) -> Self {
        Self::with_config(KeepaliveConfig::default(), plan, importer)
    }

    /// Creates a keepalive with custom timing.
    pub fn with_config(
        config: KeepaliveConfig,
        plan: SessionProbePlan,
        importer: Arc<BrowserImporter>,
    ) -> Self {
        Self {
            config,
            plan,
            importer,
            status: Arc::new(Mutex::new(KeepaliveStatus::default())),
            stop: Arc::new(Notify::new()),
            refreshing: Arc::new(tokio::sync::Mutex::new(())),
            task: Mutex::new(None),
        }
    }

    /// Current bookkeeping snapshot.
    pub fn status(&self) -> KeepaliveStatus {
        self.status.lock().unwrap().clone()
    }

    /// Starts the periodic loop. A second call while running is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.task.lock().unwrap();
        if slot.is_some() {
            debug!("Keepalive already running");
            return;
        }

        info!(
            check_interval = ?self.config.check_interval,
            refresh_buffer = ?self.config.refresh_buffer,
            "Starting session keepalive"
        );

        let keepalive = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = tokio::time::sleep(keepalive.config.check_interval) => {
                        keepalive.tick().await;
                    }
                    () = keepalive.stop.notified() => {
                        debug!("Keepalive stopped");
                        break;
                    }
                }
            }
        }));
    }

    /// Stops the loop, interrupting an in-progress sleep.
    pub fn stop(&self) {
        self.stop.notify_waiters();
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }

    /// Manual refresh: bypasses the rate limit but not the in-flight guard.
    pub async fn force_refresh(&self) {
        debug!("Force refresh requested");
        self.perform_refresh(true).await;
    }

    /// One periodic tick: honor the in-flight guard and rate limit, then
    /// refresh if the session needs it.
    #[instrument(skip(self))]
    async fn tick(&self) {
        // In-flight guard: a running refresh skips the whole check.
        let Ok(_guard) = self.refreshing.try_lock() else {
            debug!("Refresh already in progress, skipping tick");
            return;
        };
        drop(_guard);

        let now = Utc::now();
        let last_attempt = self.status.lock().unwrap().last_attempt;
        if !may_attempt(now, last_attempt, &self.config) {
            debug!("Within minimum refresh interval, skipping tick");
            return;
        }

        let cookies = match self.current_cookies().await {
            Some(cookies) => cookies,
            None => {
                debug!("No session cookies to keep alive");
                return;
            }
        };

        let last_success = self.status.lock().unwrap().last_success;
        if needs_refresh(&cookies, now, last_success, &self.config) {
            self.perform_refresh(false).await;
        }
    }

    async fn current_cookies(&self) -> Option<Vec<CookieRecord>> {
        self.importer
            .import_session(self.plan.domains.clone(), self.plan.browser_order.clone())
            .await
            .ok()
            .map(|session| session.cookies)
    }

    async fn perform_refresh(&self, forced: bool) {
        let Ok(_guard) = self.refreshing.try_lock() else {
            debug!("Refresh already in progress");
            return;
        };

        self.status.lock().unwrap().last_attempt = Some(Utc::now());
        info!(forced, "Refreshing browser session");

        let Some(cookies) = self.current_cookies().await else {
            self.record_error("no cookies available for session ping");
            return;
        };
        let cookie_header = crate::host::browser::cookie_header(&cookies);

        match self.ping_endpoints(&cookie_header).await {
            Ok(true) => {
                // Give the browser a moment to persist rotated cookies
                // before re-importing.
                tokio::time::sleep(Duration::from_secs(1)).await;
                match self
                    .importer
                    .import_session(self.plan.domains.clone(), self.plan.browser_order.clone())
                    .await
                {
                    Ok(session) => {
                        info!(
                            cookies = session.cookies.len(),
                            source = %session.source_label,
                            "Session refresh successful"
                        );
                        let mut status = self.status.lock().unwrap();
                        status.last_success = Some(Utc::now());
                        status.last_error = None;
                    }
                    Err(e) => self.record_error(&format!("re-import failed: {e}")),
                }
            }
            Ok(false) => {
                // All endpoints failed softly; state stays untouched and the
                // next tick retries, subject to rate limiting.
                debug!("No endpoint confirmed the session");
            }
            Err(e) => self.record_error(&e.to_string()),
        }
    }

    /// Probes the plan's endpoints in order with the current cookie header.
    ///
    /// Returns `Ok(true)` on the first HTTP 200 whose JSON body looks like
    /// an identity, `Ok(false)` when every endpoint failed softly, and an
    /// error on HTTP 401 (the session is authoritatively expired; later
    /// endpoints are not tried this cycle).
    async fn ping_endpoints(&self, cookie_header: &str) -> Result<bool, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()?;

        for (index, endpoint) in self.plan.endpoints.iter().enumerate() {
            debug!(endpoint = %endpoint, index, "Probing session endpoint");

            let mut request = client
                .get(endpoint)
                .header(reqwest::header::COOKIE, cookie_header)
                .header(reqwest::header::ACCEPT, "application/json");
            if let Some(ref origin) = self.plan.origin {
                request = request
                    .header(reqwest::header::ORIGIN, origin.as_str())
                    .header(reqwest::header::REFERER, origin.as_str());
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    debug!(endpoint = %endpoint, error = %e, "Probe request failed");
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED {
                warn!(endpoint = %endpoint, "Session expired (HTTP 401)");
                return Err(FetchError::NotLoggedIn(
                    "session expired (HTTP 401)".to_string(),
                ));
            }
            if status != reqwest::StatusCode::OK {
                debug!(endpoint = %endpoint, status = %status, "Probe returned non-200");
                continue;
            }

            match response.json::<Value>().await {
                Ok(body) if is_identity_shaped(&body) => {
                    debug!(endpoint = %endpoint, "Session confirmed");
                    return Ok(true);
                }
                Ok(_) => debug!(endpoint = %endpoint, "200 OK but no identity in body"),
                Err(e) => debug!(endpoint = %endpoint, error = %e, "200 OK but body not JSON"),
            }
        }

        Ok(false)
    }

    fn record_error(&self, message: &str) {
        warn!(error = %message, "Session refresh failed");
        self.status.lock().unwrap().last_error = Some(message.to_string());
    }
}

impl Drop for SessionKeepalive {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
