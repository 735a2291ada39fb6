//! Speech input controller
//!
//! Owns the session's recognition connection and the single consumer loop
//! over its event channel. Utterances dispatch strictly in recognition
//! order: the loop runs each turn to completion before reading the next
//! event. Interim results interrupt speech output so the user can talk
//! over the assistant.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dialogue::{TurnEngine, TurnEvent};
use crate::engines::{RecognitionConfig, RecognitionEngine, RecognitionEvent, RecognitionHandle};
use crate::session::{RecognitionBinding, Session, SessionEvent};
use crate::{Error, Result};

pub struct SpeechInputController {
    engine: Arc<dyn RecognitionEngine>,
    turn: Arc<TurnEngine>,
}

impl SpeechInputController {
    #[must_use]
    pub fn new(engine: Arc<dyn RecognitionEngine>, turn: Arc<TurnEngine>) -> Self {
        Self { engine, turn }
    }

    /// Open recognition for the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnected`] when the session already has a
    /// live recognition stream, or [`Error::Recognition`] when the engine
    /// connection fails.
    pub async fn connect(&self, session: Arc<Session>, config: RecognitionConfig) -> Result<()> {
        {
            let state = session.state.lock().await;
            if state.recognition.is_some() {
                return Err(Error::AlreadyConnected("speech input"));
            }
        }

        let (handle, events) = self.engine.connect(config).await?;

        let turn = Arc::clone(&self.turn);
        let loop_session = Arc::clone(&session);
        let loop_handle = Arc::clone(&handle);
        let event_loop = tokio::spawn(async move {
            consume_events(loop_session, turn, events, loop_handle).await;
        });

        // Re-check under the lock: a concurrent connect may have won while
        // the engine handshake ran
        let mut state = session.state.lock().await;
        if state.recognition.is_some() {
            drop(state);
            event_loop.abort();
            handle.stop().await;
            return Err(Error::AlreadyConnected("speech input"));
        }
        state.recognition = Some(RecognitionBinding { handle, event_loop });
        drop(state);
        tracing::info!(session = %session.id, "speech input connected");
        Ok(())
    }

    /// Forward client audio into the live stream. A no-op when speech
    /// input is not connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] when the stream rejects the audio.
    pub async fn push_audio(&self, session: &Session, bytes: &[u8]) -> Result<()> {
        session.touch();
        let handle = session
            .state
            .lock()
            .await
            .recognition
            .as_ref()
            .map(|b| Arc::clone(&b.handle));
        match handle {
            Some(handle) => handle.push_audio(bytes).await,
            None => Ok(()),
        }
    }

    /// Close recognition for the session. Idempotent.
    pub async fn disconnect(&self, session: &Session) {
        let binding = session.state.lock().await.recognition.take();
        if let Some(binding) = binding {
            binding.handle.stop().await;
            binding.event_loop.abort();
            tracing::info!(session = %session.id, "speech input disconnected");
        }
    }
}

/// Single consumer loop over recognition events for one connection
async fn consume_events(
    session: Arc<Session>,
    turn: Arc<TurnEngine>,
    mut events: mpsc::Receiver<RecognitionEvent>,
    handle: Arc<dyn RecognitionHandle>,
) {
    while let Some(event) = events.recv().await {
        match event {
            RecognitionEvent::Recognizing(_) => {
                session.touch();
                // Barge-in: the user talking over the assistant wins
                if session.speaker.is_speaking().await {
                    session.speaker.interrupt(false).await;
                }
            }
            RecognitionEvent::Recognized(text) => {
                session.touch();
                session.speaker.interrupt(false).await;
                session
                    .push_event(SessionEvent::Recognized { text: text.clone() })
                    .await;
                // Run the turn to completion before the next utterance
                let rx = turn.handle_turn(Arc::clone(&session), text);
                forward_turn_events(&session, rx).await;
            }
            RecognitionEvent::Canceled(info) => {
                tracing::error!(session = %session.id, reason = %info.reason, "recognition canceled");
                session
                    .push_event(SessionEvent::Error {
                        message: format!("speech recognition stopped: {}", info.reason),
                    })
                    .await;
                break;
            }
        }
    }
    // Clear only this connection's binding; a newer connect owns the slot
    let mut state = session.state.lock().await;
    if state.recognition.as_ref().is_some_and(|b| Arc::ptr_eq(&b.handle, &handle)) {
        state.recognition = None;
    }
    drop(state);
    tracing::debug!(session = %session.id, "recognition event loop ended");
}

/// Drain a turn's event stream into the session's client channel
pub async fn forward_turn_events(session: &Session, mut rx: mpsc::Receiver<TurnEvent>) {
    while let Some(event) = rx.recv().await {
        let mapped = match event {
            TurnEvent::Token(text) => SessionEvent::ChatChunk { text },
            TurnEvent::Latency { marker, ms } => {
                SessionEvent::Latency { marker: marker.to_string(), ms }
            }
            TurnEvent::Error(message) => SessionEvent::Error { message },
        };
        session.push_event(mapped).await;
    }
}
