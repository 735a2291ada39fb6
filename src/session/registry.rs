//! Session registry
//!
//! Owns the id-to-session map. The map lock is only ever held to insert,
//! look up, or remove an entry; connection teardown happens after the
//! entry is already gone, so a slow engine disconnect never blocks other
//! sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{Session, SessionId};

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a new session
    pub async fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Uuid::new_v4()));
        self.sessions.write().await.insert(session.id, Arc::clone(&session));
        tracing::info!(session = %session.id, "session created");
        session
    }

    pub async fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Release a session: unregister it, then tear down its connections.
    ///
    /// Idempotent; releasing an unknown or already-released id is a no-op.
    pub async fn release(&self, id: SessionId) {
        let Some(session) = self.sessions.write().await.remove(&id) else {
            return;
        };
        teardown(&session).await;
        tracing::info!(session = %id, "session released");
    }

    /// Background task that releases sessions idle beyond `timeout_secs`.
    /// A zero timeout disables sweeping.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, timeout_secs: u64) -> Option<JoinHandle<()>> {
        if timeout_secs == 0 {
            return None;
        }
        let registry = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(30));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let expired: Vec<SessionId> = {
                    let sessions = registry.sessions.read().await;
                    sessions
                        .iter()
                        .filter(|(_, s)| s.idle_secs() >= timeout_secs.min(i64::MAX as u64) as i64)
                        .map(|(id, _)| *id)
                        .collect()
                };
                for id in expired {
                    tracing::info!(session = %id, "releasing idle session");
                    registry.release(id).await;
                }
            }
        }))
    }
}

/// Stop speech output and close both engine connections
async fn teardown(session: &Session) {
    session.speaker.interrupt(false).await;

    let recognition = {
        let mut state = session.state.lock().await;
        state.event_tx = None;
        state.synthesis_connected = false;
        state.recognition.take()
    };
    if let Some(binding) = recognition {
        binding.handle.stop().await;
        binding.event_loop.abort();
    }

    if let Some(handle) = session.speaker.take_handle().await {
        handle.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_then_release() {
        let registry = SessionRegistry::new();
        let session = registry.create().await;
        assert!(registry.get(session.id).await.is_some());
        assert_eq!(registry.len().await, 1);

        registry.release(session.id).await;
        assert!(registry.get(session.id).await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let registry = SessionRegistry::new();
        let session = registry.create().await;
        registry.release(session.id).await;
        registry.release(session.id).await;
        registry.release(Uuid::new_v4()).await;
    }

    #[tokio::test]
    async fn zero_timeout_disables_sweeper() {
        let registry = Arc::new(SessionRegistry::new());
        assert!(registry.spawn_idle_sweeper(0).is_none());
        assert!(registry.spawn_idle_sweeper(60).is_some());
    }
}
