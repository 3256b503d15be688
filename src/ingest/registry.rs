use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use crate::errors::AppError;

use super::machine::{ChatSession, IngestConfig};

/// Live [`ChatSession`]s keyed by chat id.
///
/// Holding the guard returned by [`acquire`](Self::acquire) is the only way
/// to mutate a session, which is what keeps ingestions for one chat from
/// interleaving.
///
/// The map only holds weak references: the guard owns the session, so a
/// session lives exactly as long as someone is working on it. Every
/// acquisition reloads the transcript from storage, so nothing is lost when
/// an idle session is dropped.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Weak<Mutex<ChatSession>>>>>,
    config: IngestConfig,
}

impl SessionRegistry {
    pub fn new(config: IngestConfig) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), config }
    }

    /// Locks the session for `chat_id`, creating it if none is live.
    /// A session that is already locked is rejected rather than waited on.
    pub async fn acquire(&self, chat_id: &str) -> Result<OwnedMutexGuard<ChatSession>, AppError> {
        let session = {
            let mut sessions = self.sessions.write().await;
            let before = sessions.len();
            sessions.retain(|_, session| session.strong_count() > 0);
            if sessions.len() < before {
                debug!("Evicted {} idle sessions", before - sessions.len());
            }

            match sessions.get(chat_id).and_then(Weak::upgrade) {
                Some(live) => live,
                None => {
                    let created = Arc::new(Mutex::new(ChatSession::new(
                        Some(chat_id.to_string()),
                        self.config.clone(),
                    )));
                    sessions.insert(chat_id.to_string(), Arc::downgrade(&created));
                    created
                }
            }
        };

        session.try_lock_owned().map_err(|_| {
            warn!("Rejected send for chat {chat_id}: ingestion already in flight");
            AppError::IngestionInFlight { chat_id: chat_id.to_string() }
        })
    }

    /// Number of sessions currently held by a guard.
    pub async fn len(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|session| session.strong_count() > 0)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn busy_session_rejects_second_acquire() {
        let registry = SessionRegistry::default();
        let guard = registry.acquire("chat-1").await.unwrap();
        assert_eq!(guard.chat_id(), Some("chat-1"));

        let err = registry.acquire("chat-1").await.unwrap_err();
        assert!(err.is_conflict());

        // Other chats are independent.
        let other = registry.acquire("chat-2").await.unwrap();
        assert_eq!(registry.len().await, 2);

        drop(guard);
        assert!(registry.acquire("chat-1").await.is_ok());
        drop(other);
    }

    #[tokio::test]
    async fn released_sessions_are_evicted() {
        let registry = SessionRegistry::default();
        for i in 0..50 {
            let guard = registry.acquire(&format!("chat-{i}")).await.unwrap();
            drop(guard);
        }
        assert!(registry.is_empty().await);

        // Dead entries are pruned on the next acquisition.
        let _guard = registry.acquire("chat-live").await.unwrap();
        assert_eq!(registry.sessions.read().await.len(), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn reacquired_session_starts_empty() {
        let registry = SessionRegistry::default();
        {
            let mut guard = registry.acquire("c").await.unwrap();
            guard.load("c", vec![crate::models::Message::user("hi")]).unwrap();
        }
        assert!(registry.is_empty().await);

        let guard = registry.acquire("c").await.unwrap();
        assert!(guard.transcript().messages.is_empty());
    }
}
