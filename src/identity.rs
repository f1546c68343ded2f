//! Durable per-profile identity token.
//!
//! Correlates a user's telemetry across requests before any per-access
//! session exists. The token only needs to be collision-resistant enough for
//! correlation; it is not a credential.

use parking_lot::Mutex;
use rand::Rng;

use crate::protocol::SessionToken;
use crate::storage::{keys, SharedStore};

/// Owns the `monitoring_session_id` key in the client state store.
pub struct SessionIdentityStore {
    storage: SharedStore,
    /// Fallback when persistence fails: the token lives here for the rest of
    /// the process lifetime so repeated calls stay stable.
    in_memory: Mutex<Option<SessionToken>>,
}

impl SessionIdentityStore {
    pub fn new(storage: SharedStore) -> Self {
        Self {
            storage,
            in_memory: Mutex::new(None),
        }
    }

    /// Return the persisted identity token, creating and persisting one if
    /// none exists. Never fails: a persistence failure degrades to an
    /// in-memory-only token.
    ///
    /// The lock is held across the storage read so that concurrent callers
    /// racing past an empty store cannot each mint their own token.
    pub fn get_or_create(&self) -> SessionToken {
        let mut fallback = self.in_memory.lock();
        if let Some(token) = self.storage.get(keys::MONITORING_SESSION_ID) {
            return token;
        }
        if let Some(token) = fallback.as_ref() {
            return token.clone();
        }
        let token = generate_token();
        if let Err(e) = self.storage.set(keys::MONITORING_SESSION_ID, &token) {
            tracing::warn!("failed to persist identity token, keeping it in memory: {e}");
            *fallback = Some(token.clone());
        }
        token
    }

    /// Drop the persisted and in-memory token. The next `get_or_create`
    /// synthesizes a fresh one.
    pub fn clear(&self) {
        if let Err(e) = self.storage.remove(keys::MONITORING_SESSION_ID) {
            tracing::warn!("failed to clear persisted identity token: {e}");
        }
        *self.in_memory.lock() = None;
    }
}

/// Two independent random base-36 fragments. Matches what the portal expects
/// for correlation ids; not cryptographically strong and doesn't need to be.
fn generate_token() -> SessionToken {
    format!("{}{}", base36_fragment(), base36_fragment())
}

fn base36_fragment() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..11)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore, StorageError};
    use std::sync::Arc;

    #[test]
    fn token_is_stable_across_calls() {
        let store = Arc::new(MemoryStore::new());
        let identity = SessionIdentityStore::new(store);
        let first = identity.get_or_create();
        let second = identity.get_or_create();
        assert_eq!(first, second);
    }

    #[test]
    fn clear_forces_a_fresh_token() {
        let store = Arc::new(MemoryStore::new());
        let identity = SessionIdentityStore::new(store);
        let first = identity.get_or_create();
        identity.clear();
        let second = identity.get_or_create();
        assert_ne!(first, second);
    }

    #[test]
    fn existing_persisted_token_is_returned_unchanged() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::MONITORING_SESSION_ID, "preexisting").unwrap();
        let identity = SessionIdentityStore::new(store);
        assert_eq!(identity.get_or_create(), "preexisting");
    }

    #[test]
    fn tokens_are_base36_and_long_enough() {
        let token = generate_token();
        assert_eq!(token.len(), 22);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    /// Store whose writes always fail, to exercise the degradation path.
    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Option<String> {
            None
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed(
                "/dev/null/x".into(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro"),
            ))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::WriteFailed(
                "/dev/null/x".into(),
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "ro"),
            ))
        }
    }

    #[test]
    fn persistence_failure_degrades_to_stable_in_memory_token() {
        let identity = SessionIdentityStore::new(Arc::new(BrokenStore));
        let first = identity.get_or_create();
        let second = identity.get_or_create();
        assert_eq!(first, second, "in-memory fallback must stay stable");
    }

    /// Store whose reads are slow enough for two threads to overlap inside
    /// `get_or_create`.
    #[derive(Default)]
    struct SlowStore {
        inner: MemoryStore,
    }

    impl KeyValueStore for SlowStore {
        fn get(&self, key: &str) -> Option<String> {
            std::thread::sleep(std::time::Duration::from_millis(30));
            self.inner.get(key)
        }
        fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            self.inner.set(key, value)
        }
        fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    #[test]
    fn concurrent_callers_get_the_same_token() {
        let identity = Arc::new(SessionIdentityStore::new(Arc::new(SlowStore::default())));
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let identity = identity.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    identity.get_or_create()
                })
            })
            .collect();
        let tokens: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(tokens[0], tokens[1], "both callers must share one token");
    }
}
