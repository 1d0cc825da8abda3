use crate::error::{AnimaError, Result, BACKEND_TOKEN, PROVIDER_TOKEN};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Default)]
struct Tokens {
    backend: Option<String>,
    provider: Option<String>,
}

/// Locally cached credentials: backend bearer token and provider access token
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Tokens>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_backend(&self, token: impl Into<String>) {
        self.inner.write().backend = Some(token.into());
    }

    pub fn set_provider(&self, token: impl Into<String>) {
        self.inner.write().provider = Some(token.into());
    }

    /// Absorb tokens handed back by the OAuth callback (`?jwt=...&spotify=...`).
    ///
    /// Values are form-urlencoded and decoded before they are stored.
    pub fn absorb_callback_query(&self, query: &str) -> bool {
        let mut absorbed = false;
        let pairs = url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes());
        for (key, value) in pairs {
            if value.is_empty() {
                continue;
            }
            match &*key {
                "jwt" => {
                    self.set_backend(value);
                    absorbed = true;
                }
                "spotify" => {
                    self.set_provider(value);
                    absorbed = true;
                }
                _ => {}
            }
        }
        if absorbed {
            debug!("Tokens captured from callback query");
        }
        absorbed
    }

    pub fn backend(&self) -> Option<String> {
        self.inner.read().backend.clone()
    }

    pub fn provider(&self) -> Option<String> {
        self.inner.read().provider.clone()
    }

    pub fn require_backend(&self) -> Result<String> {
        self.backend().ok_or(AnimaError::MissingToken {
            token: BACKEND_TOKEN,
        })
    }

    pub fn require_provider(&self) -> Result<String> {
        self.provider().ok_or(AnimaError::MissingToken {
            token: PROVIDER_TOKEN,
        })
    }

    pub fn clear(&self) {
        let mut tokens = self.inner.write();
        tokens.backend = None;
        tokens.provider = None;
        debug!("Cached tokens cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_callback_query() {
        let store = TokenStore::new();
        assert!(store.absorb_callback_query("?jwt=abc.def&spotify=BQD123&state=x"));
        assert_eq!(store.backend().as_deref(), Some("abc.def"));
        assert_eq!(store.provider().as_deref(), Some("BQD123"));

        assert!(!store.absorb_callback_query("?state=x&jwt="));
    }

    #[test]
    fn test_callback_values_are_decoded() {
        let store = TokenStore::new();
        assert!(store.absorb_callback_query("?jwt=a.b.c&spotify=BQ%2Bx%2Fy%3D%3D"));
        assert_eq!(store.backend().as_deref(), Some("a.b.c"));
        assert_eq!(store.provider().as_deref(), Some("BQ+x/y=="));

        store.absorb_callback_query("spotify=two+words%21");
        assert_eq!(store.provider().as_deref(), Some("two words!"));
    }

    #[test]
    fn test_clear_drops_both_tokens() {
        let store = TokenStore::new();
        store.set_backend("jwt");
        store.set_provider("provider");
        let shared = store.clone();

        store.clear();
        assert!(shared.backend().is_none());
        assert!(matches!(
            shared.require_provider(),
            Err(AnimaError::MissingToken { token: PROVIDER_TOKEN })
        ));
    }
}
