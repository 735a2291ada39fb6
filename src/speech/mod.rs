//! Speech input and output coordination for a session

pub mod input;
pub mod markup;
pub mod speaker;

pub use input::SpeechInputController;
pub use speaker::{Speaker, SpeakerStatus};
