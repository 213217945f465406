use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use meshitomo_core::SessionState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionStoreError {
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Per-user conversational state repository. The default backing is an
/// in-process concurrent map; the interface leaves room for a durable store
/// without touching the pipeline.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, SessionStoreError>;
    async fn put(&self, user_id: &str, session: SessionState) -> Result<(), SessionStoreError>;
    async fn delete(&self, user_id: &str) -> Result<(), SessionStoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionState>>,
}

impl InMemorySessionStore {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionStore {
    async fn get(&self, user_id: &str) -> Result<Option<SessionState>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, session: SessionState) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(user_id.to_string(), session);
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use meshitomo_core::{SearchFilter, SessionState, ShopRecord};

    use super::{InMemorySessionStore, SessionRepository};

    fn shop(name: &str) -> ShopRecord {
        ShopRecord {
            name: name.to_string(),
            genre: "居酒屋".to_string(),
            budget: "2001〜3000円".to_string(),
            address: "東京都".to_string(),
            smoking: None,
            photo_url: None,
            detail_url: "https://example.com".to_string(),
            catch_phrase: String::new(),
            open_hours: None,
            intro: None,
            highlight: None,
            tags: None,
        }
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = InMemorySessionStore::default();
        let session =
            SessionState::new("渋谷で焼肉", vec![shop("A")], Vec::new(), SearchFilter::default())
                .expect("session");

        assert_eq!(store.get("U1").await.expect("get"), None);

        store.put("U1", session.clone()).await.expect("put");
        assert_eq!(store.get("U1").await.expect("get"), Some(session));

        store.delete("U1").await.expect("delete");
        assert_eq!(store.get("U1").await.expect("get"), None);
    }

    #[tokio::test]
    async fn put_replaces_wholesale() {
        let store = InMemorySessionStore::default();
        let first =
            SessionState::new("渋谷で焼肉", vec![shop("A")], Vec::new(), SearchFilter::default())
                .expect("session");
        let second =
            SessionState::new("新宿で寿司", vec![shop("B")], Vec::new(), SearchFilter::default())
                .expect("session");

        store.put("U1", first).await.expect("put");
        store.put("U1", second.clone()).await.expect("replace");

        let stored = store.get("U1").await.expect("get").expect("session exists");
        assert_eq!(stored.original_request, second.original_request);
        assert_eq!(stored.candidates, second.candidates);
    }
}
