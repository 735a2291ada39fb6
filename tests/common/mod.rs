//! Shared fakes for integration tests
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use avatar_gateway::engines::{
    CompletionChunk, CompletionOutcome, CompletionRequest, CompletionResponse, CompletionService,
    ConnectInfo, RecognitionConfig, RecognitionEngine, RecognitionEvent, RecognitionHandle,
    RecordStore, SynthesisConfig, SynthesisEngine, SynthesisHandle, ToolCall,
};
use avatar_gateway::records::{RecordSet, VisitRecord};
use avatar_gateway::{Error, Result};

pub fn visit(date: &str, diagnosis: &str, drugs: &[&str]) -> VisitRecord {
    serde_json::from_value(serde_json::json!({
        "patient_name": "Jane Doe",
        "date_of_visit": date,
        "patient_complaint": "dizziness and nausea",
        "diagnosis": diagnosis,
        "doctor_notes": "follow up in two weeks",
        "drugs_prescribed": drugs,
        "patient_age_at_visit": 54,
    }))
    .expect("valid visit record")
}

pub fn jane() -> RecordSet {
    RecordSet {
        patient_name: "Jane Doe".to_string(),
        records: vec![
            visit("2026-03-14", "BPPV", &["Meclizine", "Ondansetron"]),
            visit("2025-11-02", "Recurrence of BPPV", &["Meclizine"]),
        ],
    }
}

/// One scripted completion exchange
pub enum Script {
    /// Stream these tokens with a small delay between them
    Stream(Vec<&'static str>),
    /// Stream some tokens, then fail mid-stream
    StreamThenFail(Vec<&'static str>),
    /// One-shot response with optional tool calls
    Full { content: Option<&'static str>, tool_calls: Vec<(&'static str, &'static str)> },
    /// Request-level failure
    Fail,
}

/// Completion service that replays scripted exchanges in order and records
/// each request's message roles
pub struct ScriptedCompletion {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionOutcome> {
        self.requests.lock().await.push(request);
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| Error::Completion("no script left".to_string()))?;
        match script {
            Script::Stream(tokens) => Ok(stream_tokens(tokens, false)),
            Script::StreamThenFail(tokens) => Ok(stream_tokens(tokens, true)),
            Script::Full { content, tool_calls } => {
                Ok(CompletionOutcome::Full(CompletionResponse {
                    content: content.map(String::from),
                    tool_calls: tool_calls
                        .into_iter()
                        .map(|(name, arguments)| ToolCall {
                            name: name.to_string(),
                            arguments: arguments.to_string(),
                        })
                        .collect(),
                }))
            }
            Script::Fail => Err(Error::Completion("scripted failure".to_string())),
        }
    }
}

fn stream_tokens(tokens: Vec<&'static str>, fail_after: bool) -> CompletionOutcome {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        for token in tokens {
            if tx
                .send(Ok(CompletionChunk { token: token.to_string() }))
                .await
                .is_err()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        if fail_after {
            let _ = tx
                .send(Err(Error::Completion("stream died".to_string())))
                .await;
        }
    });
    CompletionOutcome::Streaming(rx)
}

/// Record store over a fixed name-to-records map, counting lookups
#[derive(Default)]
pub struct MapStore {
    pub data: HashMap<String, RecordSet>,
    pub lookups: Mutex<Vec<String>>,
}

impl MapStore {
    pub fn with_jane() -> Arc<Self> {
        let mut data = HashMap::new();
        data.insert("jane doe".to_string(), jane());
        Arc::new(Self { data, lookups: Mutex::new(Vec::new()) })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl RecordStore for MapStore {
    async fn lookup(&self, patient_name: &str) -> Result<Option<RecordSet>> {
        self.lookups.lock().await.push(patient_name.to_string());
        Ok(self.data.get(&patient_name.to_lowercase()).cloned())
    }
}

/// Synthesis handle that records every spoken document
pub struct CapturingSynth {
    pub spoken: Mutex<Vec<String>>,
    pub stops: Mutex<u32>,
    pub delay: Duration,
}

impl CapturingSynth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            spoken: Mutex::new(Vec::new()),
            stops: Mutex::new(0),
            delay: Duration::from_millis(1),
        })
    }
}

#[async_trait]
impl SynthesisHandle for CapturingSynth {
    async fn synthesize(&self, markup: &str) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        self.spoken.lock().await.push(markup.to_string());
        Ok("result".to_string())
    }

    async fn send_stop(&self) {
        *self.stops.lock().await += 1;
    }

    async fn close(&self) {}
}

#[async_trait]
impl SynthesisEngine for CapturingSynth {
    async fn connect(
        &self,
        _config: SynthesisConfig,
    ) -> Result<(Arc<dyn SynthesisHandle>, ConnectInfo)> {
        tokio::time::sleep(self.delay).await;
        Ok((CapturingSynth::new(), ConnectInfo::default()))
    }
}

/// Recognition engine whose event stream is driven by the test
pub struct DrivenRecognition {
    events: Mutex<Vec<mpsc::Sender<RecognitionEvent>>>,
    pub audio: Arc<Mutex<Vec<Vec<u8>>>>,
    handshake: Duration,
}

impl DrivenRecognition {
    pub fn new() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    /// Engine whose connect handshake takes `handshake` to complete
    pub fn slow(handshake: Duration) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            audio: Arc::new(Mutex::new(Vec::new())),
            handshake,
        })
    }

    /// Inject a recognition event as if the engine produced it, on the
    /// most recent connection
    pub async fn emit(&self, event: RecognitionEvent) {
        let tx = self.events.lock().await.last().cloned().expect("connected");
        tx.send(event).await.expect("event loop alive");
    }
}

struct DrivenHandle {
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl RecognitionHandle for DrivenHandle {
    async fn push_audio(&self, bytes: &[u8]) -> Result<()> {
        self.audio.lock().await.push(bytes.to_vec());
        Ok(())
    }

    async fn stop(&self) {}
}

#[async_trait]
impl RecognitionEngine for DrivenRecognition {
    async fn connect(
        &self,
        _config: RecognitionConfig,
    ) -> Result<(Arc<dyn RecognitionHandle>, mpsc::Receiver<RecognitionEvent>)> {
        tokio::time::sleep(self.handshake).await;
        let (tx, rx) = mpsc::channel(16);
        self.events.lock().await.push(tx);
        Ok((Arc::new(DrivenHandle { audio: Arc::clone(&self.audio) }), rx))
    }
}
