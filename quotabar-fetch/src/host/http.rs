//! HTTP client with tracing, timeouts, and a domain allowlist.
//!
//! All provider strategies go through this wrapper rather than raw
//! `reqwest`, so request tracing and the per-context timeout are applied
//! uniformly.

use reqwest::{header, header::HeaderMap, Client, Response};
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::HttpError;

/// Default request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// User agent string for QuotaBar.
const USER_AGENT: &str = concat!("QuotaBar/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// HTTP Client
// ============================================================================

/// Shared HTTP client for fetch strategies.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    allowed_domains: Option<Vec<String>>,
}

impl HttpClient {
    /// Creates a client with the default timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Creates a client with a custom timeout.
    ///
    /// # Panics
    ///
    /// Panics if the underlying client cannot be built, which only happens
    /// when the system TLS configuration is broken beyond recovery.
    pub fn with_timeout(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|e| panic!("Failed to create HTTP client: {e}"));

        Self {
            inner: client,
            allowed_domains: None,
        }
    }

    /// Restricts the client to the given domains (and their subdomains).
    pub fn with_allowed_domains(mut self, domains: Vec<String>) -> Self {
        self.allowed_domains = Some(domains);
        self
    }

    fn check_domain(&self, url: &str) -> Result<(), HttpError> {
        let Some(ref allowed) = self.allowed_domains else {
            return Ok(());
        };

        let parsed = Url::parse(url).map_err(|e| HttpError::InvalidUrl(e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| HttpError::InvalidUrl("no host in URL".to_string()))?;

        let ok = allowed
            .iter()
            .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));

        if ok {
            Ok(())
        } else {
            Err(HttpError::DomainNotAllowed(host.to_string()))
        }
    }

    /// Performs a GET request.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, HttpError> {
        self.check_domain(url)?;
        let response = self.inner.get(url).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a GET request with custom headers.
    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get_with_headers(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<Response, HttpError> {
        self.check_domain(url)?;
        let response = self.inner.get(url).headers(headers).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a GET request with an `Authorization` header value.
    #[instrument(skip(self, auth_header), fields(url = %url))]
    pub async fn get_with_auth(&self, url: &str, auth_header: &str) -> Result<Response, HttpError> {
        self.check_domain(url)?;
        let response = self
            .inner
            .get(url)
            .header(header::AUTHORIZATION, auth_header)
            .send()
            .await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a GET request with a `Cookie` header.
    ///
    /// Used by web-scrape strategies with harvested browser sessions.
    #[instrument(skip(self, cookie_header), fields(url = %url))]
    pub async fn get_with_cookies(
        &self,
        url: &str,
        cookie_header: &str,
    ) -> Result<Response, HttpError> {
        self.check_domain(url)?;
        let response = self
            .inner
            .get(url)
            .header(header::COOKIE, cookie_header)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Performs a POST request with a JSON body.
    #[instrument(skip(self, body), fields(url = %url))]
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, HttpError> {
        self.check_domain(url)?;
        let response = self.inner.post(url).json(body).send().await?;
        debug!(status = %response.status(), "Response received");
        Ok(response)
    }

    /// Returns the inner reqwest client for request shapes the helpers
    /// don't cover.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_allowlist() {
        let client = HttpClient::new().with_allowed_domains(vec![
            "claude.ai".to_string(),
            "api.github.com".to_string(),
        ]);

        assert!(client.check_domain("https://claude.ai/api/usage").is_ok());
        assert!(client.check_domain("https://sub.claude.ai/x").is_ok());
        assert!(client.check_domain("https://api.github.com/user").is_ok());
        assert!(client.check_domain("https://evil.example.com/").is_err());
        // Suffix tricks must not pass.
        assert!(client.check_domain("https://notclaude.ai.evil.com/").is_err());
    }

    #[test]
    fn test_no_restrictions_by_default() {
        let client = HttpClient::new();
        assert!(client.check_domain("https://anything.example.com").is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let client = HttpClient::new().with_allowed_domains(vec!["example.com".to_string()]);
        assert!(client.check_domain("not a url").is_err());
    }
}
