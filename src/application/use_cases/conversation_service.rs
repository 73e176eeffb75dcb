use crate::domain::conversation::{ConversationEntry, UserKey};
use crate::domain::error::Result;
use crate::infrastructure::storage;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Logs = HashMap<String, VecDeque<ConversationEntry>>;

/// Bounded per-caller conversation logs, persisted as one JSON document.
///
/// The whole store sits behind one async mutex held across
/// read-modify-write-persist, so concurrent appends are serialized.
pub struct ConversationStore {
    logs: Mutex<Logs>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl ConversationStore {
    /// Loads the store from `path`. A missing or unreadable file starts empty.
    pub async fn load(path: &Path, capacity: usize) -> Self {
        let logs = match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice::<Logs>(&bytes) {
                Ok(mut logs) => {
                    for log in logs.values_mut() {
                        truncate_front(log, capacity);
                    }
                    info!(path = %path.display(), users = logs.len(), "Loaded conversation histories");
                    logs
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Conversation file is corrupt, starting empty");
                    Logs::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No conversation file yet");
                Logs::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read conversation file, starting empty");
                Logs::new()
            }
        };

        Self {
            logs: Mutex::new(logs),
            capacity,
            path: Some(path.to_path_buf()),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            logs: Mutex::new(Logs::new()),
            capacity,
            path: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends one exchange, evicting the oldest entries beyond capacity.
    ///
    /// The in-memory log is updated even when persisting fails; the error is
    /// returned so the caller can log it.
    pub async fn append(&self, user_key: &UserKey, query: &str, response: &str) -> Result<()> {
        let mut logs = self.logs.lock().await;
        let log = logs.entry(user_key.to_string()).or_default();
        log.push_back(ConversationEntry::new(query, response));
        truncate_front(log, self.capacity);

        self.persist(&logs).await
    }

    /// `Q:`/`A:` lines in insertion order, or an empty string for an unknown key.
    pub async fn recent(&self, user_key: &UserKey) -> String {
        let logs = self.logs.lock().await;
        logs.get(&user_key.to_string())
            .map(|log| {
                log.iter()
                    .map(|entry| format!("Q: {}\nA: {}", entry.query, entry.response))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    pub async fn history(&self, user_key: &UserKey) -> Vec<ConversationEntry> {
        let logs = self.logs.lock().await;
        logs.get(&user_key.to_string())
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn clear(&self, user_key: &UserKey) -> Result<()> {
        let mut logs = self.logs.lock().await;
        if logs.remove(&user_key.to_string()).is_none() {
            return Ok(());
        }
        info!(%user_key, "Cleared conversation history");
        self.persist(&logs).await
    }

    async fn persist(&self, logs: &Logs) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(logs)?;
        storage::write_atomic(path, &bytes).await?;
        Ok(())
    }
}

fn truncate_front(log: &mut VecDeque<ConversationEntry>, capacity: usize) {
    while log.len() > capacity {
        log.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_file() -> PathBuf {
        std::env::temp_dir().join(format!("brewdesk-history-{}.json", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_recent_keeps_last_entries_in_order() {
        let store = ConversationStore::in_memory(3);
        let key = UserKey::Account(7);
        for i in 1..=4 {
            store
                .append(&key, &format!("q{}", i), &format!("a{}", i))
                .await
                .unwrap();
        }

        assert_eq!(
            store.recent(&key).await,
            "Q: q2\nA: a2\nQ: q3\nA: a3\nQ: q4\nA: a4"
        );
        assert_eq!(store.history(&key).await.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_key_is_empty() {
        let store = ConversationStore::in_memory(3);
        store.append(&UserKey::Account(1), "q", "a").await.unwrap();
        assert_eq!(store.recent(&UserKey::Account(2)).await, "");
        assert_eq!(store.recent(&UserKey::Anonymous).await, "");
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = ConversationStore::in_memory(3);
        store.append(&UserKey::Account(1), "của tôi", "a1").await.unwrap();
        store.append(&UserKey::Anonymous, "ẩn danh", "a2").await.unwrap();

        assert!(!store.recent(&UserKey::Account(1)).await.contains("ẩn danh"));
        assert!(!store.recent(&UserKey::Anonymous).await.contains("của tôi"));
    }

    #[tokio::test]
    async fn test_concurrent_same_key_appends_are_not_lost() {
        let path = temp_file();
        let store = Arc::new(ConversationStore::load(&path, 50).await);
        let key = UserKey::Account(42);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let store = Arc::clone(&store);
                let key = key.clone();
                tokio::spawn(async move {
                    store
                        .append(&key, &format!("q{}", i), &format!("a{}", i))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.history(&key).await.len(), 20);
        let reloaded = ConversationStore::load(&path, 50).await;
        assert_eq!(reloaded.history(&key).await.len(), 20);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_round_trips_through_file() {
        let path = temp_file();
        let store = ConversationStore::load(&path, 3).await;
        store.append(&UserKey::Account(3), "Có trà đào không?", "Có ạ").await.unwrap();
        store.append(&UserKey::Anonymous, "Xin chào", "Chào bạn").await.unwrap();

        let reloaded = ConversationStore::load(&path, 3).await;
        assert_eq!(
            reloaded.history(&UserKey::Account(3)).await,
            store.history(&UserKey::Account(3)).await
        );
        assert_eq!(reloaded.recent(&UserKey::Anonymous).await, "Q: Xin chào\nA: Chào bạn");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let path = temp_file();
        std::fs::write(&path, "{ not json").unwrap();

        let store = ConversationStore::load(&path, 3).await;
        assert_eq!(store.recent(&UserKey::Account(1)).await, "");

        store.append(&UserKey::Account(1), "q", "a").await.unwrap();
        let reloaded = ConversationStore::load(&path, 3).await;
        assert_eq!(reloaded.history(&UserKey::Account(1)).await.len(), 1);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_clear_removes_only_that_key() {
        let store = ConversationStore::in_memory(3);
        store.append(&UserKey::Account(1), "q", "a").await.unwrap();
        store.append(&UserKey::Account(2), "q", "a").await.unwrap();

        store.clear(&UserKey::Account(1)).await.unwrap();
        assert_eq!(store.recent(&UserKey::Account(1)).await, "");
        assert_ne!(store.recent(&UserKey::Account(2)).await, "");
    }
}
