//! Converse and detect calls built on a backend

use std::sync::Arc;

use super::history::HistoryAdapter;
use super::rate_limit::SharedCaller;
use super::types::{
    ConversationHistory, Endpoint, GenerationConfig, InlineData, ModelRequest, Part,
    SafetySetting, TextStream, default_safety_settings,
};
use super::ModelBackend;
use crate::Result;

/// Issues session calls through the shared rate-limited caller
///
/// Holds no conversation state; the session passes its history into every
/// call.
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
    caller: SharedCaller,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

impl ModelClient {
    #[must_use]
    pub fn new(backend: Arc<dyn ModelBackend>, caller: SharedCaller) -> Self {
        Self {
            backend,
            caller,
            generation_config: GenerationConfig::default(),
            safety_settings: default_safety_settings(),
        }
    }

    #[must_use]
    pub const fn with_generation_config(mut self, config: GenerationConfig) -> Self {
        self.generation_config = config;
        self
    }

    #[must_use]
    pub fn with_safety_settings(mut self, settings: Vec<SafetySetting>) -> Self {
        self.safety_settings = settings;
        self
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Request for a text chat turn continuing `history`
    #[must_use]
    pub fn converse_request(&self, prompt: &str, history: &ConversationHistory) -> ModelRequest {
        self.request(
            Endpoint::Text,
            HistoryAdapter::project(history, Endpoint::Text),
            vec![Part::from(prompt)],
        )
    }

    /// Request for a stateless detection call: prompt first, then images
    #[must_use]
    pub fn detect_request(&self, images: Vec<InlineData>, prompt: &str) -> ModelRequest {
        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(Part::from(prompt));
        parts.extend(images.into_iter().map(Part::InlineData));

        self.request(
            Endpoint::Multimodal,
            HistoryAdapter::project(&ConversationHistory::new(), Endpoint::Multimodal),
            parts,
        )
    }

    /// Text chat turn
    ///
    /// # Errors
    ///
    /// Returns error if the call still fails after the retry policy
    pub async fn converse(&self, prompt: &str, history: &ConversationHistory) -> Result<TextStream> {
        let request = self.converse_request(prompt, history);
        self.send(&request).await
    }

    /// Detection call over a frame batch
    ///
    /// # Errors
    ///
    /// Returns error if the call still fails after the retry policy
    pub async fn detect(&self, images: Vec<InlineData>, prompt: &str) -> Result<TextStream> {
        let request = self.detect_request(images, prompt);
        self.send(&request).await
    }

    /// Send a prebuilt request through the rate limiter
    ///
    /// # Errors
    ///
    /// Returns error if the call still fails after the retry policy
    pub async fn send(&self, request: &ModelRequest) -> Result<TextStream> {
        let backend = &self.backend;
        self.caller.call(|| backend.send(request)).await
    }

    fn request(
        &self,
        endpoint: Endpoint,
        history: ConversationHistory,
        parts: Vec<Part>,
    ) -> ModelRequest {
        ModelRequest {
            endpoint,
            history,
            parts,
            generation_config: self.generation_config,
            safety_settings: self.safety_settings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rate_limit::{RateLimitPolicy, RateLimitedCaller};
    use crate::model::types::{ConversationTurn, Role};
    use crate::Error;
    use async_trait::async_trait;
    use futures::StreamExt;
    use secrecy::SecretString;
    use std::num::NonZeroU32;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBackend {
        requests: Mutex<Vec<ModelRequest>>,
        fail: bool,
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
            if self.fail {
                return Err(Error::Transport("down".to_string()));
            }
            Ok(futures::stream::iter(vec![Ok("ok".to_string())]).boxed())
        }
    }

    fn caller() -> SharedCaller {
        RateLimitedCaller::shared(RateLimitPolicy {
            calls: NonZeroU32::new(100).unwrap(),
            period: Duration::from_secs(1),
            max_retries: 3,
            backoff: Duration::from_millis(1),
        })
        .unwrap()
    }

    fn image_history() -> ConversationHistory {
        let mut history = ConversationHistory::new();
        history.push_exchange(
            ConversationTurn::new(
                Role::User,
                vec![Part::from("identify"), Part::InlineData(InlineData::jpeg(vec![9]))],
            ),
            ConversationTurn::model_text("A mug."),
        );
        history
    }

    #[test]
    fn converse_request_strips_images() {
        let client = ModelClient::new(Arc::new(RecordingBackend::default()), caller());
        let request = client.converse_request("what colour?", &image_history());

        assert_eq!(request.endpoint, Endpoint::Text);
        assert_eq!(request.history.len(), 2);
        assert!(request.history.iter().all(|t| !t.has_inline_data()));
        assert_eq!(request.parts, vec![Part::from("what colour?")]);
    }

    #[test]
    fn detect_request_is_prompt_then_images_without_history() {
        let client = ModelClient::new(Arc::new(RecordingBackend::default()), caller());
        let images = vec![
            InlineData::jpeg(vec![1]),
            InlineData::jpeg(vec![2]),
            InlineData::jpeg(vec![3]),
        ];
        let request = client.detect_request(images, "identify");

        assert_eq!(request.endpoint, Endpoint::Multimodal);
        assert!(request.history.is_empty());
        assert_eq!(request.parts[0], Part::from("identify"));
        assert_eq!(request.image_count(), 3);
        assert_eq!(request.parts[3], Part::InlineData(InlineData::jpeg(vec![3])));
    }

    #[tokio::test]
    async fn converse_streams_backend_output() {
        let backend = Arc::new(RecordingBackend::default());
        let client = ModelClient::new(backend.clone(), caller());

        let fragments: Vec<String> = client
            .converse("hi", &ConversationHistory::new())
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["ok"]);
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_backend_is_retried_then_surfaces() {
        let backend = Arc::new(RecordingBackend {
            fail: true,
            ..RecordingBackend::default()
        });
        let client = ModelClient::new(backend.clone(), caller());

        let result = client.detect(Vec::new(), "identify").await;

        assert!(matches!(result, Err(Error::CallFailed { attempts: 3, .. })));
        assert_eq!(backend.requests.lock().unwrap().len(), 3);
    }
}
