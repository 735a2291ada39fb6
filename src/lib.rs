//! Avatar Gateway - conversational voice-avatar session manager
//!
//! Coordinates, per client session, the three real-time legs of a spoken
//! conversation with an on-screen avatar:
//! - speech recognition over a pushed audio stream
//! - a streaming dialogue turn engine with record-lookup tools
//! - a queued speech synthesis output that the user can talk over
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              Client (browser / app)              │
//! │        audio ─► │ ws + http │ ◄─ avatar video    │
//! └─────────────────────┬────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────┐
//! │                Avatar Gateway                    │
//! │  Registry │ Speech In │ Turn Engine │ Speaker    │
//! └─────────────────────┬────────────────────────────┘
//!                       │
//! ┌─────────────────────▼────────────────────────────┐
//! │   Recognition │ Completion │ Synthesis │ Records │
//! │              (remote engine services)            │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod dialogue;
pub mod engines;
pub mod error;
pub mod records;
pub mod session;
pub mod speech;

pub use api::{ApiServer, ApiState};
pub use config::Config;
pub use dialogue::{TriggerPolicy, TurnEngine, TurnEvent};
pub use error::{Error, Result};
pub use session::registry::SessionRegistry;
pub use session::{Session, SessionEvent, SessionId};
pub use speech::{Speaker, SpeechInputController};
