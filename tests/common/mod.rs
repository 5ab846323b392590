//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use image::{Rgb, RgbImage};
use secrecy::SecretString;

use stream_interact::camera::{Frame, FrameSource};
use stream_interact::config::FramesConfig;
use stream_interact::interaction::{KeySource, Prompter, Session};
use stream_interact::model::{
    ModelBackend, ModelClient, ModelRequest, RateLimitPolicy, RateLimitedCaller, TextStream,
};
use stream_interact::present::{DisplaySink, PresentationPipeline};
use stream_interact::voice::SpeechSink;
use stream_interact::{Error, Result};

/// One scripted backend reply
pub enum Reply {
    /// Stream these fragments
    Fragments(Vec<&'static str>),
    /// Refuse the request
    Fail,
}

/// Backend that records requests and answers from a script
#[derive(Default)]
pub struct RecordingBackend {
    pub requests: Mutex<Vec<ModelRequest>>,
    replies: Mutex<VecDeque<Reply>>,
}

impl RecordingBackend {
    pub fn with_replies(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> ModelRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait]
impl ModelBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn authenticate(&mut self, _api_key: SecretString) -> Result<()> {
        Ok(())
    }

    async fn send(&self, request: &ModelRequest) -> Result<TextStream> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Fragments(vec!["ok."]));
        match reply {
            Reply::Fragments(fragments) => Ok(futures::stream::iter(
                fragments.into_iter().map(|f| Ok(f.to_string())),
            )
            .boxed()),
            Reply::Fail => Err(Error::Transport("503 unavailable".to_string())),
        }
    }
}

/// Display that keeps everything written to it
#[derive(Default)]
pub struct MemoryDisplay {
    pub text: Mutex<String>,
    pub errors: Mutex<Vec<String>>,
}

impl MemoryDisplay {
    pub fn contains(&self, needle: &str) -> bool {
        self.text.lock().unwrap().contains(needle)
    }
}

impl DisplaySink for MemoryDisplay {
    fn write(&self, text: &str) {
        self.text.lock().unwrap().push_str(text);
    }

    fn error(&self, text: &str) {
        self.errors.lock().unwrap().push(text.to_string());
        self.line(text);
    }
}

/// Speech sink that records what it was asked to say
#[derive(Default)]
pub struct RecordingSpeech {
    pub spoken: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechSink for RecordingSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Camera that hands out a fixed sequence of frames, repeating the last one
pub struct SequenceFrames {
    frames: Vec<Arc<Frame>>,
    next: AtomicUsize,
    pub streaming: AtomicUsize,
}

impl SequenceFrames {
    /// Frames filled with the given grey values
    pub fn solid(values: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            frames: values
                .iter()
                .map(|&v| Arc::new(RgbImage::from_pixel(8, 8, Rgb([v, v, v]))))
                .collect(),
            next: AtomicUsize::new(0),
            streaming: AtomicUsize::new(0),
        })
    }
}

impl FrameSource for SequenceFrames {
    fn latest_frame(&self) -> Option<Arc<Frame>> {
        if self.frames.is_empty() {
            return None;
        }
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        Some(Arc::clone(&self.frames[i.min(self.frames.len() - 1)]))
    }

    fn ensure_streaming(&self) -> Result<()> {
        if self.frames.is_empty() {
            return Err(Error::CameraUnavailable("no device".to_string()));
        }
        self.streaming.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Prompter that answers from a script and records the labels it was shown
#[derive(Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<&'static str>>,
    pub labels: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn new(answers: &[&'static str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().copied().collect()),
            labels: Mutex::new(Vec::new()),
        })
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().unwrap().len()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn input(&self, label: &str) -> Result<String> {
        self.labels.lock().unwrap().push(label.to_string());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .map(str::to_string)
            .ok_or_else(|| Error::Io(std::io::Error::other("prompt script exhausted")))
    }

    async fn password(&self, label: &str) -> Result<String> {
        self.input(label).await
    }
}

pub type Gate = Box<dyn Fn() -> bool + Send + Sync>;

/// Key source that releases each key once its gate opens
#[derive(Default)]
pub struct GatedKeys {
    steps: Mutex<VecDeque<(char, Gate)>>,
}

impl GatedKeys {
    pub fn new(steps: Vec<(char, Gate)>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
        })
    }
}

pub fn always() -> Gate {
    Box::new(|| true)
}

impl KeySource for GatedKeys {
    fn next_key(&self, timeout: Duration) -> Result<Option<char>> {
        {
            let mut steps = self.steps.lock().unwrap();
            if steps.front().is_some_and(|(_, gate)| gate()) {
                return Ok(steps.pop_front().map(|(key, _)| key));
            }
        }
        std::thread::sleep(timeout.min(Duration::from_millis(10)));
        Ok(None)
    }
}

pub fn test_policy() -> RateLimitPolicy {
    RateLimitPolicy {
        calls: NonZeroU32::new(100).unwrap(),
        period: Duration::from_secs(1),
        max_retries: 2,
        backoff: Duration::from_millis(1),
    }
}

pub fn frames_config(nframes: usize) -> FramesConfig {
    FramesConfig {
        nframes_interact: nframes,
        frame_capture_interval: Duration::ZERO,
    }
}

pub const DETECT_PROMPT: &str = "identify the object";

/// Session over mock collaborators, speaking through `speech`
pub fn session_with_speech(
    backend: Arc<RecordingBackend>,
    frames: Arc<dyn FrameSource>,
    display: Arc<MemoryDisplay>,
    speech: Arc<RecordingSpeech>,
) -> Session {
    let caller = RateLimitedCaller::shared(test_policy()).unwrap();
    let client = ModelClient::new(backend, caller);
    let pipeline = PresentationPipeline::with_speech(display, speech, 8);
    Session::new(
        client,
        pipeline,
        frames,
        frames_config(3),
        DETECT_PROMPT.to_string(),
    )
}

/// Display-only session over mock collaborators
pub fn session(
    backend: Arc<RecordingBackend>,
    frames: Arc<dyn FrameSource>,
    display: Arc<MemoryDisplay>,
) -> Session {
    let caller = RateLimitedCaller::shared(test_policy()).unwrap();
    let client = ModelClient::new(backend, caller);
    Session::new(
        client,
        PresentationPipeline::new(display),
        frames,
        frames_config(3),
        DETECT_PROMPT.to_string(),
    )
}
