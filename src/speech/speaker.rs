//! Speech output queue
//!
//! Sentences enqueue in FIFO order and exactly one worker task per session
//! drains them, so spoken audio never overlaps. An interrupt flips the
//! speaker to idle immediately and signals the engine best-effort; the
//! epoch counter makes any still-running worker stand down at its next
//! queue access instead of racing the new one.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::Error;
use crate::engines::SynthesisHandle;
use crate::speech::markup;

/// One queued sentence
#[derive(Debug, Clone)]
pub struct SpokenEntry {
    pub text: String,
    /// Pause appended after the sentence
    pub trailing_silence_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerStatus {
    Idle,
    Speaking,
}

struct SpeakerInner {
    queue: VecDeque<SpokenEntry>,
    status: SpeakerStatus,
    /// Sentence currently (or last) handed to the engine; kept across an
    /// interrupt so a reconnect can repeat it
    speaking: Option<SpokenEntry>,
    /// Bumped whenever the active worker changes or is revoked
    epoch: u64,
    handle: Option<Arc<dyn SynthesisHandle>>,
    voice: String,
    speaker_profile: Option<String>,
}

#[derive(Clone)]
pub struct Speaker {
    inner: Arc<Mutex<SpeakerInner>>,
}

impl Default for Speaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Speaker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SpeakerInner {
                queue: VecDeque::new(),
                status: SpeakerStatus::Idle,
                speaking: None,
                epoch: 0,
                handle: None,
                voice: String::new(),
                speaker_profile: None,
            })),
        }
    }

    /// Bind a live synthesis connection; starts draining anything already
    /// queued.
    pub async fn bind(
        &self,
        handle: Arc<dyn SynthesisHandle>,
        voice: String,
        speaker_profile: Option<String>,
    ) {
        let mut inner = self.inner.lock().await;
        inner.handle = Some(handle);
        inner.voice = voice;
        inner.speaker_profile = speaker_profile;
        self.start_worker_locked(&mut inner);
    }

    /// Remove the bound connection, returning it for closing
    pub async fn take_handle(&self) -> Option<Arc<dyn SynthesisHandle>> {
        let mut inner = self.inner.lock().await;
        inner.status = SpeakerStatus::Idle;
        inner.epoch += 1;
        inner.handle.take()
    }

    pub async fn status(&self) -> SpeakerStatus {
        self.inner.lock().await.status
    }

    pub async fn is_speaking(&self) -> bool {
        self.status().await == SpeakerStatus::Speaking
    }

    /// Append a sentence to the queue; starts the worker when idle
    pub async fn enqueue(&self, text: impl Into<String>, trailing_silence_ms: u64) {
        let mut inner = self.inner.lock().await;
        inner.queue.push_back(SpokenEntry { text: text.into(), trailing_silence_ms });
        self.start_worker_locked(&mut inner);
    }

    /// Stop speaking now.
    ///
    /// The speaker reports idle as soon as this returns; the engine stop
    /// signal is fired without waiting for acknowledgement. With
    /// `keep_queue` the queued sentences survive for a later resume.
    pub async fn interrupt(&self, keep_queue: bool) {
        let handle = {
            let mut inner = self.inner.lock().await;
            inner.status = SpeakerStatus::Idle;
            inner.epoch += 1;
            if !keep_queue {
                inner.queue.clear();
            }
            inner.handle.clone()
        };
        if let Some(handle) = handle {
            tokio::spawn(async move { handle.send_stop().await });
        }
    }

    /// After a reconnect, put the sentence that was cut off back at the
    /// head of the queue and start draining again.
    pub async fn resume_after_reconnect(&self, repeat_interrupted: bool) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.speaking.take() {
            if repeat_interrupted {
                inner.queue.push_front(entry);
            }
        }
        self.start_worker_locked(&mut inner);
    }

    /// Number of queued sentences not yet handed to the engine
    pub async fn queued(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    fn start_worker_locked(&self, inner: &mut SpeakerInner) {
        if inner.status == SpeakerStatus::Speaking
            || inner.queue.is_empty()
            || inner.handle.is_none()
        {
            return;
        }
        inner.status = SpeakerStatus::Speaking;
        inner.epoch += 1;
        let epoch = inner.epoch;
        let speaker = self.clone();
        tokio::spawn(async move { speaker.drain(epoch).await });
    }

    /// Worker loop. Exactly one per speaker is live at a time; a stale
    /// epoch means this worker has been revoked and must stand down.
    async fn drain(self, epoch: u64) {
        loop {
            let (entry, handle, voice, profile) = {
                let mut inner = self.inner.lock().await;
                if inner.epoch != epoch {
                    return;
                }
                let Some(entry) = inner.queue.pop_front() else {
                    inner.status = SpeakerStatus::Idle;
                    inner.speaking = None;
                    return;
                };
                let Some(handle) = inner.handle.clone() else {
                    inner.status = SpeakerStatus::Idle;
                    inner.queue.push_front(entry);
                    return;
                };
                inner.speaking = Some(entry.clone());
                (entry, handle, inner.voice.clone(), inner.speaker_profile.clone())
            };

            let ssml =
                markup::build_ssml(&voice, profile.as_deref(), &entry.text, entry.trailing_silence_ms);
            tracing::debug!(text = %entry.text, "speaking sentence");
            let result = handle.synthesize(&ssml).await;

            let mut inner = self.inner.lock().await;
            match result {
                Ok(result_id) => {
                    tracing::debug!(result_id = %result_id, "sentence spoken");
                    if inner.epoch != epoch {
                        // Interrupted while finishing; the interrupt owns
                        // state now
                        return;
                    }
                    inner.speaking = None;
                }
                Err(Error::SynthesisCanceled(_)) => {
                    // Interrupt path; speaking entry stays for resume
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "synthesis failed, stopping speaker");
                    if inner.epoch == epoch {
                        inner.status = SpeakerStatus::Idle;
                    }
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::Result;

    /// Engine that records spoken documents and can be told to fail or hang
    struct FakeHandle {
        spoken: Mutex<Vec<String>>,
        delay_ms: u64,
        stops: AtomicU64,
        fail: bool,
    }

    impl FakeHandle {
        fn new(delay_ms: u64) -> Arc<Self> {
            Arc::new(Self { spoken: Mutex::new(Vec::new()), delay_ms, stops: AtomicU64::new(0), fail: false })
        }
    }

    #[async_trait]
    impl SynthesisHandle for FakeHandle {
        async fn synthesize(&self, ssml: &str) -> Result<String> {
            if self.fail {
                return Err(Error::Synthesis("boom".to_string()));
            }
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            self.spoken.lock().await.push(ssml.to_string());
            Ok("r".to_string())
        }

        async fn send_stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }

        async fn close(&self) {}
    }

    #[tokio::test]
    async fn sentences_speak_in_fifo_order() {
        let engine = FakeHandle::new(5);
        let speaker = Speaker::new();
        speaker.bind(engine.clone(), "v".to_string(), None).await;

        speaker.enqueue("First.", 0).await;
        speaker.enqueue("Second.", 0).await;
        speaker.enqueue("Third.", 0).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let spoken = engine.spoken.lock().await;
        assert_eq!(spoken.len(), 3);
        assert!(spoken[0].contains("First."));
        assert!(spoken[2].contains("Third."));
        assert_eq!(speaker.status().await, SpeakerStatus::Idle);
    }

    #[tokio::test]
    async fn interrupt_goes_idle_and_signals_stop() {
        let engine = FakeHandle::new(200);
        let speaker = Speaker::new();
        speaker.bind(engine.clone(), "v".to_string(), None).await;

        speaker.enqueue("Long sentence.", 0).await;
        speaker.enqueue("Never spoken.", 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        speaker.interrupt(false).await;
        assert_eq!(speaker.status().await, SpeakerStatus::Idle);
        assert_eq!(speaker.queued().await, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(engine.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn interrupt_can_keep_queue() {
        let engine = FakeHandle::new(200);
        let speaker = Speaker::new();
        speaker.bind(engine, "v".to_string(), None).await;

        speaker.enqueue("One.", 0).await;
        speaker.enqueue("Two.", 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        speaker.interrupt(true).await;
        assert_eq!(speaker.queued().await, 1);
    }

    #[tokio::test]
    async fn resume_repeats_interrupted_sentence() {
        let engine = FakeHandle::new(150);
        let speaker = Speaker::new();
        speaker.bind(engine.clone(), "v".to_string(), None).await;

        speaker.enqueue("Cut off mid-word.", 0).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        speaker.interrupt(true).await;

        // New connection after the client reconnects
        let engine2 = FakeHandle::new(5);
        speaker.bind(engine2.clone(), "v".to_string(), None).await;
        speaker.resume_after_reconnect(true).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let spoken = engine2.spoken.lock().await;
        assert_eq!(spoken.len(), 1);
        assert!(spoken[0].contains("Cut off mid-word."));
    }

    #[tokio::test]
    async fn enqueue_without_connection_waits() {
        let speaker = Speaker::new();
        speaker.enqueue("Buffered.", 0).await;
        assert_eq!(speaker.status().await, SpeakerStatus::Idle);
        assert_eq!(speaker.queued().await, 1);

        let engine = FakeHandle::new(5);
        speaker.bind(engine.clone(), "v".to_string(), None).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.spoken.lock().await.len(), 1);
    }
}
