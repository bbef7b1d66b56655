//! External credential-store and keychain-preflight interfaces.
//!
//! The physical secure store (keychain, credential manager, secret service)
//! is an external collaborator: the fetch core only consumes a narrow
//! load/store interface, one instance per provider+account key. Everything
//! here is trait-shaped so the pipeline compiles and tests against
//! in-memory fakes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Account slot for bearer/API tokens.
const TOKEN_ACCOUNT: &str = "token";

/// Account slot for manual cookie headers.
const COOKIE_ACCOUNT: &str = "cookie_header";

// ============================================================================
// Credential Store Interface
// ============================================================================

/// Load/store interface onto the external secure credential store.
///
/// One instance is scoped to one provider+account key; the implementation
/// decides how that scoping maps onto physical storage.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Loads the stored bearer/API token, if any.
    async fn load_token(&self) -> Result<Option<String>, StoreError>;

    /// Stores (or replaces) the bearer/API token.
    async fn store_token(&self, token: &str) -> Result<(), StoreError>;

    /// Loads the stored cookie header, if any.
    async fn load_cookie_header(&self) -> Result<Option<String>, StoreError>;

    /// Stores (or replaces) the cookie header.
    async fn store_cookie_header(&self, header: &str) -> Result<(), StoreError>;
}

// ============================================================================
// Keychain Preflight Interface
// ============================================================================

/// Capability probe for interactive OS credential prompts.
///
/// Consulted before a keychain-backed read so the caller can surface an
/// explanation to the user. The answer never gates the read itself; the
/// read's success or failure is handled independently.
pub trait KeychainPreflight: Send + Sync {
    /// Returns true if reading `service`/`account` is expected to raise an
    /// interactive OS prompt.
    fn will_prompt(&self, service: &str, account: &str) -> bool;
}

/// Preflight fake that never predicts a prompt. Used in tests and on
/// platforms without interactive keychain prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPromptPreflight;

impl KeychainPreflight for NoPromptPreflight {
    fn will_prompt(&self, _service: &str, _account: &str) -> bool {
        false
    }
}

// ============================================================================
// Keyring-backed Store
// ============================================================================

/// System-keychain implementation of [`CredentialStore`].
///
/// Uses the `keyring` crate: macOS Keychain Services, Windows Credential
/// Manager, Linux Secret Service.
#[derive(Debug, Clone)]
pub struct KeychainCredentialStore {
    service: String,
}

impl KeychainCredentialStore {
    /// Creates a store scoped to one provider+account key.
    ///
    /// `provider` and `account` are combined into the keychain service name
    /// so different accounts for the same provider stay separate entries.
    pub fn new(provider: &str, account: &str) -> Self {
        let service = if account.is_empty() {
            format!("quotabar:{provider}")
        } else {
            format!("quotabar:{provider}:{account}")
        };
        Self { service }
    }

    fn read(&self, account: &str) -> Result<Option<String>, StoreError> {
        let entry =
            Entry::new(&self.service, account).map_err(|e| StoreError::Platform(e.to_string()))?;
        match entry.get_password() {
            Ok(secret) if !secret.is_empty() => Ok(Some(secret)),
            Ok(_) | Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                warn!(service = %self.service, account = %account, error = %e, "Secure store read failed");
                Err(e.into())
            }
        }
    }

    fn write(&self, account: &str, secret: &str) -> Result<(), StoreError> {
        let entry =
            Entry::new(&self.service, account).map_err(|e| StoreError::Platform(e.to_string()))?;
        entry.set_password(secret).map_err(StoreError::from)?;
        debug!(service = %self.service, account = %account, "Secure store entry written");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, StoreError> {
        self.read(TOKEN_ACCOUNT)
    }

    async fn store_token(&self, token: &str) -> Result<(), StoreError> {
        self.write(TOKEN_ACCOUNT, token)
    }

    async fn load_cookie_header(&self) -> Result<Option<String>, StoreError> {
        self.read(COOKIE_ACCOUNT)
    }

    async fn store_cookie_header(&self, header: &str) -> Result<(), StoreError> {
        self.write(COOKIE_ACCOUNT, header)
    }
}

// ============================================================================
// In-memory Fake
// ============================================================================

/// In-memory [`CredentialStore`] for tests and headless environments.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<&'static str, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-seeded with a token.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap()
            .insert(TOKEN_ACCOUNT, token.into());
        store
    }

    /// Creates a store pre-seeded with a cookie header.
    pub fn with_cookie_header(header: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .entries
            .lock()
            .unwrap()
            .insert(COOKIE_ACCOUNT, header.into());
        store
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load_token(&self) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(TOKEN_ACCOUNT).cloned())
    }

    async fn store_token(&self, token: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(TOKEN_ACCOUNT, token.to_string());
        Ok(())
    }

    async fn load_cookie_header(&self) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(COOKIE_ACCOUNT).cloned())
    }

    async fn store_cookie_header(&self, header: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(COOKIE_ACCOUNT, header.to_string());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.load_token().await.unwrap(), None);

        store.store_token("abc").await.unwrap();
        assert_eq!(store.load_token().await.unwrap(), Some("abc".to_string()));

        store.store_cookie_header("a=1; b=2").await.unwrap();
        assert_eq!(
            store.load_cookie_header().await.unwrap(),
            Some("a=1; b=2".to_string())
        );
        // Token and cookie slots stay independent.
        assert_eq!(store.load_token().await.unwrap(), Some("abc".to_string()));
    }

    #[tokio::test]
    async fn test_memory_store_seeded() {
        let store = MemoryCredentialStore::with_token("seeded");
        assert_eq!(store.load_token().await.unwrap(), Some("seeded".to_string()));
        assert_eq!(store.load_cookie_header().await.unwrap(), None);
    }

    #[test]
    fn test_keychain_store_service_scoping() {
        let a = KeychainCredentialStore::new("claude", "work");
        let b = KeychainCredentialStore::new("claude", "");
        assert_eq!(a.service, "quotabar:claude:work");
        assert_eq!(b.service, "quotabar:claude");
    }

    #[test]
    fn test_no_prompt_preflight() {
        assert!(!NoPromptPreflight.will_prompt("any", "thing"));
    }
}
