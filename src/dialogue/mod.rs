//! Dialogue turn engine
//!
//! Turns a recognized utterance into a streamed assistant reply: history
//! bookkeeping, lookup-tool orchestration, sentence chunking into the
//! speech output queue, and latency markers.

pub mod sentence;
pub mod tools;
pub mod trigger;
pub mod turn;

pub use trigger::TriggerPolicy;
pub use turn::{TurnEngine, TurnEvent};
