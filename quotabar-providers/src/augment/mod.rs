//! Augment provider: browser-session web fetch plus a session keepalive.

pub mod strategies;
pub mod web;

use std::sync::Arc;

use quotabar_fetch::{BrowserImporter, SessionKeepalive};

pub use strategies::AugmentWebStrategy;
pub use web::probe_plan;

/// Builds the keepalive for the Augment browser session. The caller owns
/// start/stop.
pub fn session_keepalive(importer: Arc<BrowserImporter>) -> SessionKeepalive {
    SessionKeepalive::new(probe_plan(), importer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_keepalive_builds() {
        let keepalive = session_keepalive(Arc::new(BrowserImporter::new()));
        assert!(keepalive.status().last_success.is_none());
    }
}
