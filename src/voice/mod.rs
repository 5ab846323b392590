//! Spoken output
//!
//! Sentence groups are queued to a single [`SpeechWorker`], which synthesizes
//! each one with [`TextToSpeech`] and plays it on the default output device.

mod playback;
mod speaker;
mod tts;

pub use playback::AudioPlayback;
pub use speaker::{DEFAULT_QUEUE_CAPACITY, SpeechQueue, SpeechSink, SpeechWorker};
pub use tts::{DEFAULT_TTS_MODEL, TextToSpeech, TtsProvider};
