//! Presentation of model output
//!
//! Text is shown on a [`DisplaySink`] as it streams in, while
//! [`SentenceChunker`] groups it into complete sentences for speech.

mod chunker;
mod console;
mod pipeline;

pub use chunker::SentenceChunker;
pub use console::{ConsoleSink, DisplaySink};
pub use pipeline::{ModelOutput, PresentationPipeline};
