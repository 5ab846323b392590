//! Display and speech for model output

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Mutex;

use super::chunker::SentenceChunker;
use super::console::DisplaySink;
use crate::model::TextStream;
use crate::voice::{SpeechQueue, SpeechSink, SpeechWorker};
use crate::Result;

/// A model answer, either whole or streamed
pub enum ModelOutput {
    Text(String),
    Stream(TextStream),
}

impl ModelOutput {
    fn into_stream(self) -> TextStream {
        match self {
            Self::Text(text) => futures::stream::once(async move { Ok(text) }).boxed(),
            Self::Stream(stream) => stream,
        }
    }
}

impl From<String> for ModelOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ModelOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<TextStream> for ModelOutput {
    fn from(stream: TextStream) -> Self {
        Self::Stream(stream)
    }
}

/// Shows model output as it arrives and queues complete sentences for speech
///
/// The speech worker is started once, with the pipeline, and lives until
/// [`PresentationPipeline::close`]. Presentations are serialized so that
/// fragments of concurrent answers never interleave.
pub struct PresentationPipeline {
    display: Arc<dyn DisplaySink>,
    chunker: Mutex<SentenceChunker>,
    speech: Option<(SpeechQueue, SpeechWorker)>,
}

impl PresentationPipeline {
    /// Display-only pipeline
    #[must_use]
    pub fn new(display: Arc<dyn DisplaySink>) -> Self {
        Self {
            display,
            chunker: Mutex::new(SentenceChunker::new()),
            speech: None,
        }
    }

    /// Pipeline that also speaks, through a worker started now
    #[must_use]
    pub fn with_speech(
        display: Arc<dyn DisplaySink>,
        sink: Arc<dyn SpeechSink>,
        queue_capacity: usize,
    ) -> Self {
        let (queue, worker) = SpeechWorker::spawn(sink, queue_capacity);
        Self {
            display,
            chunker: Mutex::new(SentenceChunker::new()),
            speech: Some((queue, worker)),
        }
    }

    #[must_use]
    pub fn display(&self) -> &Arc<dyn DisplaySink> {
        &self.display
    }

    #[must_use]
    pub const fn speaks(&self) -> bool {
        self.speech.is_some()
    }

    /// Show `output` and queue it for speech, returning the full text
    ///
    /// Held text is flushed when the stream ends, also when it ends in an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the stream's error if it breaks off; everything received up to
    /// that point has already been shown
    pub async fn present(&self, output: impl Into<ModelOutput>) -> Result<String> {
        let mut stream = output.into().into_stream();
        let mut chunker = self.chunker.lock().await;
        let mut full = String::new();
        let mut outcome = Ok(());

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    self.display.write(&fragment);
                    full.push_str(&fragment);
                    for group in chunker.feed(&fragment) {
                        self.speak(group).await;
                    }
                }
                Err(e) => {
                    outcome = Err(e);
                    break;
                }
            }
        }

        if let Some(rest) = chunker.flush() {
            self.speak(rest).await;
        }
        self.display.end_response();

        outcome.map(|()| full)
    }

    async fn speak(&self, group: String) {
        let Some((queue, _)) = &self.speech else {
            return;
        };
        tracing::trace!(chars = group.len(), "queueing sentence group");
        if let Err(e) = queue.enqueue(group).await {
            tracing::warn!(error = %e, "dropping sentence group");
        }
    }

    /// End the session, letting queued speech finish
    pub async fn close(self) {
        self.chunker.lock().await.clear();
        if let Some((queue, worker)) = self.speech {
            drop(queue);
            worker.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct MemoryDisplay {
        text: StdMutex<String>,
    }

    impl DisplaySink for MemoryDisplay {
        fn write(&self, text: &str) {
            self.text.lock().unwrap().push_str(text);
        }
    }

    #[derive(Default)]
    struct RecordingSpeech {
        spoken: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSink for RecordingSpeech {
        async fn speak(&self, text: &str) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn fragments(items: Vec<Result<String>>) -> TextStream {
        futures::stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn stream_is_displayed_and_spoken_in_order() {
        let display = Arc::new(MemoryDisplay::default());
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = PresentationPipeline::with_speech(display.clone(), speech.clone(), 4);

        let stream = fragments(vec![
            Ok("The cat sat".to_string()),
            Ok(" on the mat. The dog".to_string()),
            Ok(" ran.".to_string()),
        ]);
        let full = pipeline.present(stream).await.unwrap();
        pipeline.close().await;

        assert_eq!(full, "The cat sat on the mat. The dog ran.");
        assert_eq!(
            *display.text.lock().unwrap(),
            "The cat sat on the mat. The dog ran.\n"
        );
        assert_eq!(
            *speech.spoken.lock().unwrap(),
            vec!["The cat sat on the mat.", "The dog ran."]
        );
    }

    #[tokio::test]
    async fn plain_text_is_one_element_stream() {
        let display = Arc::new(MemoryDisplay::default());
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = PresentationPipeline::with_speech(display.clone(), speech.clone(), 4);

        pipeline.present("Object Detected: mug").await.unwrap();
        pipeline.close().await;

        assert_eq!(*speech.spoken.lock().unwrap(), vec!["Object Detected: mug"]);
    }

    #[tokio::test]
    async fn stream_error_still_flushes_tail() {
        let display = Arc::new(MemoryDisplay::default());
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = PresentationPipeline::with_speech(display.clone(), speech.clone(), 4);

        let stream = fragments(vec![
            Ok("It is a red".to_string()),
            Err(Error::Stream("connection reset".to_string())),
            Ok(" never shown.".to_string()),
        ]);
        let result = pipeline.present(stream).await;
        pipeline.close().await;

        assert!(matches!(result, Err(Error::Stream(_))));
        assert_eq!(*display.text.lock().unwrap(), "It is a red\n");
        assert_eq!(*speech.spoken.lock().unwrap(), vec!["It is a red"]);
    }

    #[tokio::test]
    async fn one_worker_serves_every_turn() {
        let display = Arc::new(MemoryDisplay::default());
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = PresentationPipeline::with_speech(display, speech.clone(), 1);

        for answer in ["first answer.", "second answer.", "third answer."] {
            pipeline.present(answer).await.unwrap();
        }
        pipeline.close().await;

        assert_eq!(
            *speech.spoken.lock().unwrap(),
            vec!["first answer.", "second answer.", "third answer."]
        );
    }

    #[tokio::test]
    async fn display_only_pipeline() {
        let display = Arc::new(MemoryDisplay::default());
        let pipeline = PresentationPipeline::new(display.clone());

        assert!(!pipeline.speaks());
        let full = pipeline.present("hello there.").await.unwrap();
        assert_eq!(full, "hello there.");
        assert_eq!(*display.text.lock().unwrap(), "hello there.\n");
    }

    #[tokio::test]
    async fn whitespace_only_output_is_not_spoken() {
        let display = Arc::new(MemoryDisplay::default());
        let speech = Arc::new(RecordingSpeech::default());
        let pipeline = PresentationPipeline::with_speech(display, speech.clone(), 2);

        pipeline.present(fragments(vec![Ok("  ".to_string())])).await.unwrap();
        pipeline.close().await;

        assert!(speech.spoken.lock().unwrap().is_empty());
    }
}
