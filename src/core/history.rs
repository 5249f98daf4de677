use crate::domain::model::{HistoryItem, NewHistoryEntry};
use crate::domain::ports::KeyValueStore;
use crate::utils::error::ChurnError;
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_HISTORY_KEY: &str = "churn_prediction_history";
pub const DEFAULT_MAX_HISTORY: usize = 20;

/// Result of a history mutation. The in-memory change always applies;
/// `warning` carries a failed write to storage.
#[derive(Debug)]
pub struct StoreOutcome<T> {
    pub value: T,
    pub warning: Option<ChurnError>,
}

impl<T> StoreOutcome<T> {
    pub fn is_persisted(&self) -> bool {
        self.warning.is_none()
    }
}

/// Most-recent-first list of past analyses, mirrored to a single storage key.
pub struct HistoryStore<S: KeyValueStore> {
    storage: S,
    key: String,
    capacity: usize,
    items: Arc<[HistoryItem]>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub async fn open(storage: S, key: impl Into<String>, capacity: usize) -> Self {
        let mut store = Self {
            storage,
            key: key.into(),
            capacity: capacity.max(1),
            items: Arc::from(Vec::new()),
        };
        store.load().await;
        store
    }

    /// Reloads from storage. Missing or unreadable data loads as an empty list.
    pub async fn load(&mut self) -> Arc<[HistoryItem]> {
        let items = match self.storage.get(&self.key).await {
            Ok(None) => Vec::new(),
            Ok(Some(raw)) => match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!("Failed to parse prediction history '{}': {}", self.key, e);
                    Vec::new()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read prediction history '{}': {}", self.key, e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} history entries", items.len());
        self.items = Arc::from(items);
        self.snapshot()
    }

    pub fn snapshot(&self) -> Arc<[HistoryItem]> {
        Arc::clone(&self.items)
    }

    pub fn get(&self, id: &str) -> Option<&HistoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub async fn add(&mut self, entry: NewHistoryEntry) -> StoreOutcome<HistoryItem> {
        let item = entry.with_id(Uuid::new_v4().to_string());

        let mut items = Vec::with_capacity(self.capacity);
        items.push(item.clone());
        items.extend(self.items.iter().take(self.capacity - 1).cloned());

        if self.items.len() >= self.capacity {
            tracing::debug!(
                "History full, evicting {} old entries",
                self.items.len() + 1 - self.capacity
            );
        }
        self.items = Arc::from(items);

        let warning = self.persist().await;
        StoreOutcome {
            value: item,
            warning,
        }
    }

    /// Returns whether an entry was removed; unknown ids are a no-op.
    pub async fn delete(&mut self, id: &str) -> StoreOutcome<bool> {
        let before = self.items.len();
        let items: Vec<HistoryItem> = self
            .items
            .iter()
            .filter(|item| item.id != id)
            .cloned()
            .collect();
        let removed = items.len() != before;
        self.items = Arc::from(items);

        let warning = self.persist().await;
        StoreOutcome {
            value: removed,
            warning,
        }
    }

    pub async fn clear(&mut self) -> StoreOutcome<()> {
        self.items = Arc::from(Vec::new());

        let warning = match self.storage.remove(&self.key).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to clear prediction history '{}': {}", self.key, e);
                Some(e)
            }
        };
        StoreOutcome { value: (), warning }
    }

    async fn persist(&self) -> Option<ChurnError> {
        let serialized = match serde_json::to_string(&*self.items) {
            Ok(serialized) => serialized,
            Err(e) => {
                tracing::warn!("Failed to serialize prediction history: {}", e);
                return Some(ChurnError::SerializationError(e));
            }
        };

        match self.storage.set(&self.key, &serialized).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to save prediction history '{}': {}", self.key, e);
                Some(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::Result;
    use chrono::Utc;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct MockStorage {
        values: Arc<Mutex<HashMap<String, String>>>,
        quota: Option<usize>,
    }

    impl MockStorage {
        fn with_quota(quota: usize) -> Self {
            Self {
                quota: Some(quota),
                ..Self::default()
            }
        }

        async fn raw(&self, key: &str) -> Option<String> {
            self.values.lock().await.get(key).cloned()
        }

        async fn put_raw(&self, key: &str, value: &str) {
            self.values
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
        }
    }

    impl KeyValueStore for MockStorage {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().await.get(key).cloned())
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            if let Some(quota) = self.quota {
                if value.len() > quota {
                    return Err(ChurnError::StorageQuotaExceeded {
                        key: key.to_string(),
                        size: value.len(),
                        quota,
                    });
                }
            }
            self.put_raw(key, value).await;
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<()> {
            self.values.lock().await.remove(key);
            Ok(())
        }
    }

    fn entry(filename: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            filename: filename.to_string(),
            date: Utc::now(),
            records_processed: 3,
            churn_rate: 33.3,
            data: vec![],
        }
    }

    #[tokio::test]
    async fn test_add_keeps_twenty_most_recent() {
        let storage = MockStorage::default();
        let mut store = HistoryStore::open(storage.clone(), DEFAULT_HISTORY_KEY, 20).await;

        for i in 0..21 {
            let outcome = store.add(entry(&format!("file-{}.csv", i))).await;
            assert!(outcome.is_persisted());
        }

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 20);
        assert_eq!(snapshot[0].filename, "file-20.csv");
        assert_eq!(snapshot[19].filename, "file-1.csv");

        let persisted: Vec<HistoryItem> =
            serde_json::from_str(&storage.raw(DEFAULT_HISTORY_KEY).await.unwrap()).unwrap();
        assert_eq!(persisted, snapshot.to_vec());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let mut store = HistoryStore::open(MockStorage::default(), "h", 20).await;
        let a = store.add(entry("a.csv")).await.value;
        let b = store.add(entry("b.csv")).await.value;

        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[tokio::test]
    async fn test_snapshots_are_immutable() {
        let mut store = HistoryStore::open(MockStorage::default(), "h", 20).await;
        store.add(entry("a.csv")).await;
        let before = store.snapshot();

        store.add(entry("b.csv")).await;
        assert_eq!(before.len(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_delete() {
        let mut store = HistoryStore::open(MockStorage::default(), "h", 20).await;
        let first = store.add(entry("a.csv")).await.value;
        store.add(entry("b.csv")).await;

        let missing = store.delete("no-such-id").await;
        assert!(!missing.value);
        assert_eq!(store.len(), 2);

        let removed = store.delete(&first.id).await;
        assert!(removed.value);
        assert_eq!(store.len(), 1);
        assert!(store.get(&first.id).is_none());
    }

    #[tokio::test]
    async fn test_clear_then_load_is_empty() {
        let storage = MockStorage::default();
        let mut store = HistoryStore::open(storage.clone(), "h", 20).await;
        store.add(entry("a.csv")).await;

        let outcome = store.clear().await;
        assert!(outcome.is_persisted());
        assert!(store.is_empty());
        assert!(storage.raw("h").await.is_none());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_reopen_reads_persisted_entries() {
        let storage = MockStorage::default();
        let mut store = HistoryStore::open(storage.clone(), "h", 20).await;
        let item = store.add(entry("a.csv")).await.value;

        let reopened = HistoryStore::open(storage, "h", 20).await;
        assert_eq!(reopened.get(&item.id), Some(&item));
    }

    #[tokio::test]
    async fn test_corrupt_storage_loads_empty() {
        let storage = MockStorage::default();
        storage.put_raw("h", "{not json").await;

        let store = HistoryStore::open(storage, "h", 20).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_quota_failure_is_reported_but_not_rolled_back() {
        let mut store = HistoryStore::open(MockStorage::with_quota(10), "h", 20).await;
        let outcome = store.add(entry("a.csv")).await;

        assert!(!outcome.is_persisted());
        assert!(matches!(
            outcome.warning,
            Some(ChurnError::StorageQuotaExceeded { .. })
        ));
        assert_eq!(store.len(), 1);
    }
}
