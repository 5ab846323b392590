//! Background speech worker
//!
//! A single long-lived task drains a bounded queue of sentence groups and
//! speaks them one at a time through a [`SpeechSink`]. Producers block when
//! the queue is full; the worker stops once every queue handle is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{Error, Result};

/// Default number of sentence groups buffered ahead of playback
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Something that can say a piece of text out loud
#[async_trait]
pub trait SpeechSink: Send + Sync {
    /// Speak `text`, returning once playback has finished
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn speak(&self, text: &str) -> Result<()>;
}

/// Producer side of the speech queue
#[derive(Debug, Clone)]
pub struct SpeechQueue {
    tx: mpsc::Sender<String>,
}

impl SpeechQueue {
    /// Queue `text` for speaking, waiting while the queue is full
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySynthesisInput`] for empty text, or an error if the
    /// worker has stopped
    pub async fn enqueue(&self, text: String) -> Result<()> {
        if text.is_empty() {
            return Err(Error::EmptySynthesisInput);
        }
        self.tx
            .send(text)
            .await
            .map_err(|_| Error::Tts("speech worker has stopped".to_string()))
    }
}

/// Handle to the running worker task
pub struct SpeechWorker {
    handle: JoinHandle<()>,
}

impl SpeechWorker {
    /// Start the worker, returning its queue
    #[must_use]
    pub fn spawn(sink: Arc<dyn SpeechSink>, capacity: usize) -> (SpeechQueue, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(sink, rx));
        tracing::debug!(capacity, "speech worker started");
        (SpeechQueue { tx }, Self { handle })
    }

    /// Wait for the worker to finish the queued text
    ///
    /// Only returns after every [`SpeechQueue`] clone has been dropped.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "speech worker panicked");
        }
    }
}

async fn run(sink: Arc<dyn SpeechSink>, mut rx: mpsc::Receiver<String>) {
    while let Some(text) = rx.recv().await {
        if text.is_empty() {
            tracing::error!(error = %Error::EmptySynthesisInput, "skipping speech item");
            continue;
        }
        if let Err(e) = sink.speak(&text).await {
            tracing::warn!(error = %e, "speech synthesis failed");
        }
    }
    tracing::debug!("speech worker stopped");
}
