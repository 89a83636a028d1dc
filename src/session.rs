//! Caller sessions.
//!
//! A session belongs to whatever sits in front of the registry: a cookie
//! store, a JWT decoder, a test harness. The pipeline never owns one; it only
//! reads and writes string values through the [`Session`] trait object the
//! host attaches to each [`Request`](crate::Request).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Key/value accessor for one caller's session.
///
/// Implementations must be cheap to call from request tasks and must scope
/// their storage to a single caller.
pub trait Session: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

/// A `Session` backed by a mutex-guarded map. Good enough for tests and for
/// single-process deployments that keep sessions in memory.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for building a shared handle to attach to requests.
    pub fn shared() -> Arc<dyn Session> {
        Arc::new(Self::new())
    }
}

impl Session for MemorySession {
    fn get(&self, key: &str) -> Option<String> {
        // A poisoned lock still holds consistent string data.
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_owned(), value);
    }
}

/// Session key under which named tokens are stored.
pub(crate) fn token_key(name: &str) -> String {
    format!("tokens.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let session = MemorySession::new();
        assert_eq!(session.get("k"), None);
        session.set("k", "v".to_owned());
        assert_eq!(session.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn sessions_do_not_share_values() {
        let a = MemorySession::shared();
        let b = MemorySession::shared();
        a.set("k", "a".to_owned());
        assert_eq!(b.get("k"), None);
    }
}
