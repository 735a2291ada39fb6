//! Speech recognition engine interface
//!
//! The engine delivers events over a per-connection channel instead of
//! invoking callbacks on arbitrary threads: the session's input controller
//! owns the single consumer loop, which keeps utterance handling ordered.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{Error, Result};

/// Audio sample rate expected from clients (16 kHz mono PCM16)
pub const SAMPLE_RATE: u32 = 16_000;

/// Minimum RMS energy to consider a chunk speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech length for a valid utterance (0.3 s)
const MIN_SPEECH_SAMPLES: usize = 4_800;

/// Trailing silence that closes an utterance (0.5 s)
const SILENCE_SAMPLES: usize = 8_000;

/// Event reported by a live recognition connection
#[derive(Debug, Clone)]
pub enum RecognitionEvent {
    /// Interim result: the user has started speaking (barge-in trigger)
    Recognizing(String),
    /// Final utterance text
    Recognized(String),
    /// Fatal stream error; the connection is dead and will not retry itself
    Canceled(CancelInfo),
}

/// Details of a canceled recognition stream
#[derive(Debug, Clone)]
pub struct CancelInfo {
    pub reason: String,
    /// Whether an explicit client-driven reconnect is expected to succeed
    pub retryable: bool,
}

/// Per-connection recognition configuration
#[derive(Debug, Clone)]
pub struct RecognitionConfig {
    /// Engine endpoint
    pub endpoint: String,
    /// Bearer token or subscription key
    pub auth_token: String,
    /// Optional prompt/system context forwarded to the engine
    pub prompt_context: Option<String>,
}

/// Live recognition connection
#[async_trait]
pub trait RecognitionHandle: Send + Sync {
    /// Forward raw audio bytes (PCM16 LE mono, 16 kHz) into the stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if the stream has already closed.
    async fn push_audio(&self, bytes: &[u8]) -> Result<()>;

    /// Stop continuous recognition and close the stream. Idempotent.
    async fn stop(&self);
}

/// Factory for recognition connections
#[async_trait]
pub trait RecognitionEngine: Send + Sync {
    /// Open a recognition stream.
    ///
    /// Returns the handle plus the event receiver for this connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Recognition`] if the stream cannot be opened.
    async fn connect(
        &self,
        config: RecognitionConfig,
    ) -> Result<(Arc<dyn RecognitionHandle>, mpsc::Receiver<RecognitionEvent>)>;
}

/// Batch-transcription recognition engine
///
/// Segments the pushed audio with RMS energy detection and submits each
/// closed utterance to a Whisper-style HTTP transcription API. Interim
/// `Recognizing` events fire on speech onset so barge-in still works
/// without a true streaming protocol.
pub struct BatchRecognitionEngine {
    client: reqwest::Client,
    model: String,
}

impl BatchRecognitionEngine {
    #[must_use]
    pub fn new(model: String) -> Self {
        Self { client: reqwest::Client::new(), model }
    }
}

#[async_trait]
impl RecognitionEngine for BatchRecognitionEngine {
    async fn connect(
        &self,
        config: RecognitionConfig,
    ) -> Result<(Arc<dyn RecognitionHandle>, mpsc::Receiver<RecognitionEvent>)> {
        let (audio_tx, audio_rx) = mpsc::channel::<AudioCommand>(64);
        let (event_tx, event_rx) = mpsc::channel(16);

        let worker = SegmentWorker {
            client: self.client.clone(),
            model: self.model.clone(),
            config,
            events: event_tx,
        };
        tokio::spawn(worker.run(audio_rx));

        let handle: Arc<dyn RecognitionHandle> = Arc::new(BatchHandle { audio: audio_tx });
        Ok((handle, event_rx))
    }
}

enum AudioCommand {
    Chunk(Vec<u8>),
    Stop,
}

struct BatchHandle {
    audio: mpsc::Sender<AudioCommand>,
}

#[async_trait]
impl RecognitionHandle for BatchHandle {
    async fn push_audio(&self, bytes: &[u8]) -> Result<()> {
        self.audio
            .send(AudioCommand::Chunk(bytes.to_vec()))
            .await
            .map_err(|_| Error::Recognition("recognition stream closed".to_string()))
    }

    async fn stop(&self) {
        let _ = self.audio.send(AudioCommand::Stop).await;
    }
}

struct SegmentWorker {
    client: reqwest::Client,
    model: String,
    config: RecognitionConfig,
    events: mpsc::Sender<RecognitionEvent>,
}

impl SegmentWorker {
    async fn run(self, mut audio: mpsc::Receiver<AudioCommand>) {
        let mut segmenter = Segmenter::default();

        while let Some(cmd) = audio.recv().await {
            let chunk = match cmd {
                AudioCommand::Chunk(c) => c,
                AudioCommand::Stop => break,
            };
            match segmenter.push(&chunk) {
                SegmentOutput::SpeechStarted => {
                    let _ = self.events.send(RecognitionEvent::Recognizing(String::new())).await;
                }
                SegmentOutput::Utterance(samples) => {
                    if !self.transcribe_and_emit(&samples).await {
                        return;
                    }
                }
                SegmentOutput::Pending => {}
            }
        }

        // Flush any speech still buffered at stop
        if let Some(samples) = segmenter.take_if_speech() {
            let _ = self.transcribe_and_emit(&samples).await;
        }
        tracing::debug!("recognition stream closed");
    }

    /// Returns `false` when the stream has been canceled and the worker must exit.
    async fn transcribe_and_emit(&self, samples: &[i16]) -> bool {
        match self.transcribe(samples).await {
            Ok(text) => {
                if !text.trim().is_empty() {
                    let _ = self.events.send(RecognitionEvent::Recognized(text)).await;
                }
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "transcription failed, canceling stream");
                let _ = self
                    .events
                    .send(RecognitionEvent::Canceled(CancelInfo {
                        reason: e.to_string(),
                        retryable: true,
                    }))
                    .await;
                false
            }
        }
    }

    async fn transcribe(&self, samples: &[i16]) -> Result<String> {
        let wav = samples_to_wav(samples)?;
        tracing::debug!(samples = samples.len(), "submitting utterance for transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Recognition(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.auth_token))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition(format!("transcription API error {status}: {body}")));
        }

        #[derive(serde::Deserialize)]
        struct TranscriptResponse {
            text: String,
        }
        let result: TranscriptResponse = response.json().await?;
        tracing::info!(transcript = %result.text, "utterance recognized");
        Ok(result.text)
    }
}

/// Output of feeding one chunk into the segmenter
enum SegmentOutput {
    /// Speech onset detected in this chunk
    SpeechStarted,
    /// A complete utterance closed by trailing silence
    Utterance(Vec<i16>),
    /// Nothing to report yet
    Pending,
}

/// Energy-based utterance segmenter over PCM16 audio
#[derive(Default)]
struct Segmenter {
    in_speech: bool,
    buffer: Vec<i16>,
    silence: usize,
}

impl Segmenter {
    fn push(&mut self, bytes: &[u8]) -> SegmentOutput {
        let samples = bytes_to_samples(bytes);
        let is_speech = rms_energy(&samples) > ENERGY_THRESHOLD;

        if !self.in_speech {
            if !is_speech {
                return SegmentOutput::Pending;
            }
            self.in_speech = true;
            self.buffer.clear();
            self.buffer.extend_from_slice(&samples);
            self.silence = 0;
            return SegmentOutput::SpeechStarted;
        }

        self.buffer.extend_from_slice(&samples);
        if is_speech {
            self.silence = 0;
        } else {
            self.silence += samples.len();
        }

        if self.silence > SILENCE_SAMPLES && self.buffer.len() > MIN_SPEECH_SAMPLES {
            self.in_speech = false;
            self.silence = 0;
            return SegmentOutput::Utterance(std::mem::take(&mut self.buffer));
        }
        SegmentOutput::Pending
    }

    /// Take the buffer if a long-enough speech segment is still open
    fn take_if_speech(&mut self) -> Option<Vec<i16>> {
        if self.in_speech && self.buffer.len() > MIN_SPEECH_SAMPLES {
            self.in_speech = false;
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}

fn bytes_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let f = f32::from(s) / f32::from(i16::MAX);
            f * f
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Encode PCM16 samples as a WAV container for upload
fn samples_to_wav(samples: &[i16]) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Recognition(e.to_string()))?;
        for &s in samples {
            writer.write_sample(s).map_err(|e| Error::Recognition(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Recognition(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_chunk(len: usize) -> Vec<u8> {
        std::iter::repeat_n(16_000i16, len)
            .flat_map(i16::to_le_bytes)
            .collect()
    }

    fn silent_chunk(len: usize) -> Vec<u8> {
        vec![0u8; len * 2]
    }

    #[test]
    fn energy_of_silence_is_low() {
        assert!(rms_energy(&vec![0i16; 100]) < 0.001);
        assert!(rms_energy(&vec![16_000i16; 100]) > 0.4);
    }

    #[test]
    fn segmenter_reports_speech_onset_once() {
        let mut seg = Segmenter::default();
        assert!(matches!(seg.push(&loud_chunk(1600)), SegmentOutput::SpeechStarted));
        assert!(matches!(seg.push(&loud_chunk(1600)), SegmentOutput::Pending));
    }

    #[test]
    fn segmenter_closes_utterance_on_silence() {
        let mut seg = Segmenter::default();
        seg.push(&loud_chunk(6000));
        // 0.5s+ of silence closes the utterance
        let out = seg.push(&silent_chunk(9000));
        match out {
            SegmentOutput::Utterance(samples) => assert!(samples.len() > MIN_SPEECH_SAMPLES),
            _ => panic!("expected utterance"),
        }
    }

    #[test]
    fn short_blip_is_not_an_utterance() {
        let mut seg = Segmenter::default();
        seg.push(&loud_chunk(1000));
        assert!(seg.take_if_speech().is_none());
    }

    #[test]
    fn wav_encoding_produces_riff_header() {
        let wav = samples_to_wav(&[0i16; 160]).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }
}
