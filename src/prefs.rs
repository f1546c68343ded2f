//! Locally cached user preferences (favorites, group assignment) and their
//! reconciliation with server-sourced catalog records.
//!
//! The cache exists so the dashboard never loses client-only state across
//! refresh cycles: a record fetched without `is_favorite`/`group_id` gets
//! the last-known local value substituted in, while a server-supplied value
//! wins and updates the cache (the server is eventually authoritative).
//!
//! Writes are optimistic and deliberately NOT rolled back on failure. For
//! low-stakes preference data, perceived responsiveness beats strict
//! consistency; the next successful poll/merge is the eventual-consistency
//! correction point. This is a design decision, not an oversight.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::backend::PortalClient;
use crate::protocol::ServiceRecord;
use crate::storage::{keys, SharedStore};

pub struct PreferenceCache {
    storage: SharedStore,
    client: PortalClient,
    favorites: RwLock<HashMap<String, bool>>,
    groups: RwLock<HashMap<String, String>>,
}

impl PreferenceCache {
    /// Build the cache, rehydrating both maps from the state store.
    pub fn new(storage: SharedStore, client: PortalClient) -> Self {
        let favorites = load_map(&storage, keys::FAVORITES_MAP);
        let groups = load_map(&storage, keys::GROUP_ASSIGNMENTS);
        Self {
            storage,
            client,
            favorites: RwLock::new(favorites),
            groups: RwLock::new(groups),
        }
    }

    /// Merge server records with cached preferences.
    ///
    /// Per record and per field: server-supplied value wins and refreshes
    /// the cache; server-omitted value is filled from the cache. Applying
    /// the same snapshot twice is idempotent.
    pub fn merge(&self, server_records: Vec<ServiceRecord>) -> Vec<ServiceRecord> {
        let mut favorites = self.favorites.write();
        let mut groups = self.groups.write();
        let mut favorites_dirty = false;
        let mut groups_dirty = false;

        let merged: Vec<ServiceRecord> = server_records
            .into_iter()
            .map(|mut rec| {
                match rec.is_favorite {
                    Some(value) => {
                        if favorites.get(&rec.id) != Some(&value) {
                            favorites.insert(rec.id.clone(), value);
                            favorites_dirty = true;
                        }
                    }
                    None => {
                        rec.is_favorite = favorites.get(&rec.id).copied();
                    }
                }
                match &rec.group_id {
                    Some(group) => {
                        if groups.get(&rec.id) != Some(group) {
                            groups.insert(rec.id.clone(), group.clone());
                            groups_dirty = true;
                        }
                    }
                    None => {
                        rec.group_id = groups.get(&rec.id).cloned();
                    }
                }
                rec
            })
            .collect();

        if favorites_dirty {
            persist_map(&self.storage, keys::FAVORITES_MAP, &favorites);
        }
        if groups_dirty {
            persist_map(&self.storage, keys::GROUP_ASSIGNMENTS, &groups);
        }
        merged
    }

    /// Optimistically set the favorite flag, then issue the best-effort
    /// server write. The local value is kept even if the write fails.
    pub async fn set_favorite(&self, service_id: &str, value: bool) {
        {
            let mut favorites = self.favorites.write();
            favorites.insert(service_id.to_string(), value);
            persist_map(&self.storage, keys::FAVORITES_MAP, &favorites);
        }
        if let Err(e) = self.client.set_favorite(service_id, value).await {
            tracing::warn!(service_id, "favorite write failed, keeping local value: {e}");
        }
    }

    /// Optimistically set (or clear) the group assignment, then issue the
    /// best-effort server write. The local value is kept even if the write
    /// fails.
    pub async fn set_group(&self, service_id: &str, group_id: Option<&str>) {
        {
            let mut groups = self.groups.write();
            match group_id {
                Some(g) => {
                    groups.insert(service_id.to_string(), g.to_string());
                }
                None => {
                    groups.remove(service_id);
                }
            }
            persist_map(&self.storage, keys::GROUP_ASSIGNMENTS, &groups);
        }
        if let Err(e) = self.client.set_group(service_id, group_id).await {
            tracing::warn!(service_id, "group write failed, keeping local value: {e}");
        }
    }

    /// Last-known favorite flag for a service, if any.
    pub fn favorite(&self, service_id: &str) -> Option<bool> {
        self.favorites.read().get(service_id).copied()
    }

    /// Last-known group assignment for a service, if any.
    pub fn group(&self, service_id: &str) -> Option<String> {
        self.groups.read().get(service_id).cloned()
    }
}

fn load_map<V: serde::de::DeserializeOwned>(
    storage: &SharedStore,
    key: &str,
) -> HashMap<String, V> {
    match storage.get(key) {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            tracing::warn!(key, "discarding unparseable cached map: {e}");
            HashMap::new()
        }),
        None => HashMap::new(),
    }
}

fn persist_map<V: serde::Serialize>(storage: &SharedStore, key: &str, map: &HashMap<String, V>) {
    let raw = match serde_json::to_string(map) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(key, "failed to encode preference map: {e}");
            return;
        }
    };
    if let Err(e) = storage.set(key, &raw) {
        tracing::warn!(key, "failed to persist preference map: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, MemoryStore};
    use std::sync::Arc;
    use std::time::Duration;

    fn offline_client() -> PortalClient {
        // Unroutable endpoint: every preference write fails, which is
        // exactly what the optimistic paths need to demonstrate.
        PortalClient::with_timeout("http://127.0.0.1:1", None, Duration::from_millis(50))
    }

    fn record(id: &str) -> ServiceRecord {
        ServiceRecord {
            id: id.to_string(),
            name: format!("Service {id}"),
            description: None,
            url: format!("http://portal.local/{id}"),
            protocol: Some("http".into()),
            group_id: None,
            is_favorite: None,
        }
    }

    #[tokio::test]
    async fn local_favorite_survives_server_omission() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        cache.set_favorite("svc-2", true).await;

        let merged = cache.merge(vec![record("svc-2")]);
        assert_eq!(merged[0].is_favorite, Some(true));
    }

    #[tokio::test]
    async fn server_supplied_value_wins_and_updates_cache() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        cache.set_favorite("svc-1", true).await;

        let mut rec = record("svc-1");
        rec.is_favorite = Some(false);
        let merged = cache.merge(vec![rec]);
        assert_eq!(merged[0].is_favorite, Some(false));
        assert_eq!(cache.favorite("svc-1"), Some(false));
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        cache.set_favorite("svc-1", true).await;
        cache.set_group("svc-1", Some("grp-a")).await;

        let snapshot = vec![record("svc-1"), record("svc-2")];
        let first = cache.merge(snapshot.clone());
        let second = cache.merge(snapshot);
        assert_eq!(first, second);
        assert_eq!(second[0].is_favorite, Some(true));
        assert_eq!(second[0].group_id.as_deref(), Some("grp-a"));
        assert_eq!(second[1].is_favorite, None);
    }

    #[tokio::test]
    async fn optimistic_update_kept_on_write_failure() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        // offline_client guarantees the write fails.
        cache.set_favorite("svc-3", true).await;
        assert_eq!(cache.favorite("svc-3"), Some(true));
    }

    #[tokio::test]
    async fn clear_group_removes_assignment() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        cache.set_group("svc-1", Some("grp-a")).await;
        cache.set_group("svc-1", None).await;
        assert_eq!(cache.group("svc-1"), None);

        let merged = cache.merge(vec![record("svc-1")]);
        assert_eq!(merged[0].group_id, None);
    }

    #[tokio::test]
    async fn cache_rehydrates_from_storage() {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        {
            let cache = PreferenceCache::new(store.clone(), offline_client());
            cache.set_favorite("svc-1", true).await;
            cache.set_group("svc-1", Some("grp-z")).await;
        }
        let cache = PreferenceCache::new(store, offline_client());
        assert_eq!(cache.favorite("svc-1"), Some(true));
        assert_eq!(cache.group("svc-1").as_deref(), Some("grp-z"));
    }

    #[tokio::test]
    async fn corrupt_persisted_map_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        store.set(keys::FAVORITES_MAP, "{broken").unwrap();
        let cache = PreferenceCache::new(store, offline_client());
        assert_eq!(cache.favorite("svc-1"), None);
    }

    #[tokio::test]
    async fn group_from_server_refreshes_cache() {
        let cache = PreferenceCache::new(Arc::new(MemoryStore::new()), offline_client());
        let mut rec = record("svc-9");
        rec.group_id = Some("grp-server".into());
        cache.merge(vec![rec]);
        assert_eq!(cache.group("svc-9").as_deref(), Some("grp-server"));
    }
}
