//! Capability interfaces for the external services the gateway drives
//!
//! The recognition engine, synthesis/avatar engine, completion service, and
//! record store are opaque remote collaborators. Each is consumed through a
//! trait so session coordination never depends on a concrete transport.

pub mod completion;
pub mod recognition;
pub mod records;
pub mod synthesis;

pub use completion::{
    ChatMessage, ChatRole, CompletionChunk, CompletionOutcome, CompletionRequest,
    CompletionResponse, CompletionService, HttpCompletionService, ToolCall, ToolChoice, ToolSpec,
};
pub use recognition::{
    BatchRecognitionEngine, CancelInfo, RecognitionConfig, RecognitionEngine, RecognitionEvent,
    RecognitionHandle,
};
pub use records::{RecordStore, SearchRecordStore};
pub use synthesis::{
    AvatarParams, ConnectInfo, IceServer, RestSynthesisEngine, SynthesisConfig, SynthesisEngine,
    SynthesisHandle,
};
