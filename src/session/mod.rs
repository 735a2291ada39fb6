//! Per-client session state
//!
//! A session bundles everything one connected client owns: conversation
//! history, the live recognition and synthesis connections, the speech
//! output queue, and the channel used to push events back to the client.
//!
//! All coordinated state lives behind the single `state` mutex; the lock
//! is never held across engine I/O. Turn execution is serialized by
//! `turn_gate`, a separate mutex, so a long completion never blocks
//! unrelated state reads.

pub mod registry;

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::engines::{ChatMessage, RecognitionHandle};
use crate::records::RecordSet;
use crate::speech::Speaker;

/// Session identifier
pub type SessionId = Uuid;

/// Event pushed to the client over its session channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Final transcript of a recognized user utterance
    Recognized { text: String },
    /// Streamed assistant text
    ChatChunk { text: String },
    /// Latency marker, e.g. first token or first sentence
    Latency { marker: String, ms: i64 },
    /// Informational status line
    Status { message: String },
    /// Non-fatal error surfaced to the client
    Error { message: String },
}

/// Live recognition connection owned by a session
pub struct RecognitionBinding {
    pub handle: Arc<dyn RecognitionHandle>,
    /// Consumer loop draining recognition events
    pub event_loop: JoinHandle<()>,
}

/// Mutable session state, all behind one lock
#[derive(Default)]
pub struct SessionState {
    /// Conversation history, seeded with the system prompt on first turn
    pub history: Vec<ChatMessage>,
    /// Set once the history has been seeded
    pub chat_initiated: bool,
    /// Set once the connect greeting has been spoken
    pub greeting_sent: bool,
    /// Loaded patient record context
    pub record_context: Option<RecordSet>,
    /// Live recognition connection, when speech input is on
    pub recognition: Option<RecognitionBinding>,
    /// Whether a synthesis connection is bound to the speaker
    pub synthesis_connected: bool,
    /// Channel for pushing events to the connected client
    pub event_tx: Option<mpsc::Sender<SessionEvent>>,
}

/// One client session
pub struct Session {
    pub id: SessionId,
    pub state: Mutex<SessionState>,
    pub speaker: Speaker,
    /// Serializes turn execution; tokio mutexes queue fairly, so turns run
    /// in arrival order
    pub turn_gate: Mutex<()>,
    /// Unix timestamp of the last client interaction
    last_activity: AtomicI64,
}

impl Session {
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            state: Mutex::new(SessionState::default()),
            speaker: Speaker::new(),
            turn_gate: Mutex::new(()),
            last_activity: AtomicI64::new(Utc::now().timestamp()),
        }
    }

    /// Record client activity; the idle sweeper checks this
    pub fn touch(&self) {
        self.last_activity.store(Utc::now().timestamp(), Ordering::Relaxed);
    }

    /// Seconds since the last recorded client interaction
    #[must_use]
    pub fn idle_secs(&self) -> i64 {
        (Utc::now().timestamp() - self.last_activity.load(Ordering::Relaxed)).max(0)
    }

    /// Attach a client event channel, replacing any previous one
    pub async fn attach_event_channel(&self, tx: mpsc::Sender<SessionEvent>) {
        self.state.lock().await.event_tx = Some(tx);
    }

    /// Detach the client event channel, but only when `tx` is still the
    /// attached one; a newer client's channel stays in place
    pub async fn detach_event_channel(&self, tx: &mpsc::Sender<SessionEvent>) {
        let mut state = self.state.lock().await;
        if state.event_tx.as_ref().is_some_and(|cur| cur.same_channel(tx)) {
            state.event_tx = None;
        }
    }

    /// Push an event to the client, best-effort. Dropped silently when no
    /// client channel is attached or the channel is full.
    pub async fn push_event(&self, event: SessionEvent) {
        let tx = self.state.lock().await.event_tx.clone();
        if let Some(tx) = tx {
            if tx.try_send(event).is_err() {
                tracing::debug!(session = %self.id, "session event channel full, dropping event");
            }
        }
    }

    /// Append a message to the conversation history
    pub async fn append_history(&self, message: ChatMessage) {
        self.state.lock().await.history.push(message);
    }

    /// Reset conversation history and record context, keeping connections
    pub async fn clear_history(&self) {
        let mut state = self.state.lock().await;
        state.history.clear();
        state.chat_initiated = false;
        state.record_context = None;
        tracing::info!(session = %self.id, "conversation history cleared");
    }
}
