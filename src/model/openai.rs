//! `OpenAI` chat-completions backend
//!
//! Images are sent as base64 data URLs. Safety settings have no equivalent in
//! this API and are not sent.

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::types::{ConversationTurn, Endpoint, ModelRequest, Part, Role, TextStream};
use super::{ModelBackend, check_status, sse_text_stream};
use crate::{Error, Result};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// `OpenAI` transport
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    text_model: String,
    vision_model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Option<Delta>,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl OpenAiBackend {
    /// Create an `OpenAI` backend; call [`ModelBackend::authenticate`] before use
    #[must_use]
    pub fn new(text_model: String, vision_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: OPENAI_API_URL.to_string(),
            text_model,
            vision_model,
        }
    }

    /// Point at a different (compatible) API root
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    fn model_for(&self, endpoint: Endpoint) -> &str {
        match endpoint {
            Endpoint::Text => &self.text_model,
            Endpoint::Multimodal => &self.vision_model,
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn authenticate(&mut self, api_key: SecretString) -> Result<()> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::CredentialMissing("OPENAI_API_KEY".to_string()));
        }
        self.api_key = Some(api_key);
        Ok(())
    }

    async fn send(&self, request: &ModelRequest) -> Result<TextStream> {
        let Some(api_key) = &self.api_key else {
            return Err(Error::CredentialMissing(
                "openai backend is not authenticated".to_string(),
            ));
        };

        let body = build_request(self.model_for(request.endpoint), request);

        tracing::debug!(
            model = body.model,
            messages = body.messages.len(),
            images = request.image_count(),
            "sending openai request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key.expose_secret()))
            .json(&body)
            .send()
            .await?;
        let response = check_status("OpenAI", response).await?;

        Ok(sse_text_stream(response, parse_stream_event))
    }
}

fn message_content(parts: &[Part]) -> MessageContent {
    if parts.iter().all(|p| !p.is_inline_data()) {
        return MessageContent::Text(parts.iter().filter_map(Part::as_text).collect());
    }

    let blocks = parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => ContentBlock::Text { text: text.clone() },
            Part::InlineData(inline) => ContentBlock::ImageUrl {
                image_url: ImageUrl {
                    url: format!(
                        "data:{};base64,{}",
                        inline.mime_type,
                        base64::engine::general_purpose::STANDARD.encode(&inline.data)
                    ),
                },
            },
        })
        .collect();
    MessageContent::Blocks(blocks)
}

fn message(turn: &ConversationTurn) -> Message {
    Message {
        role: match turn.role {
            Role::User => "user",
            Role::Model => "assistant",
        },
        content: message_content(&turn.parts),
    }
}

fn build_request<'a>(model: &'a str, request: &ModelRequest) -> ChatRequest<'a> {
    let mut messages: Vec<Message> = request.history.iter().map(message).collect();
    messages.push(message(&request.user_turn()));

    ChatRequest {
        model,
        messages,
        temperature: request.generation_config.temperature,
        stream: true,
    }
}

fn parse_stream_event(data: &str) -> Result<Option<String>> {
    if data.trim() == "[DONE]" {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(data)
        .map_err(|e| Error::Stream(format!("invalid openai event: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::Stream(error.message));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|c| c.delta.and_then(|d| d.content))
        .collect();

    Ok((!text.is_empty()).then_some(text))
}
