//! Google Gemini backend
//!
//! Calls `streamGenerateContent` with `alt=sse`. Text turns go to the text
//! model with prior history; calls carrying images go to the vision model.

use async_trait::async_trait;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::types::{ConversationTurn, Endpoint, ModelRequest, Part, Role, TextStream};
use super::{ModelBackend, check_status, sse_text_stream};
use crate::{Error, Result};

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini transport
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    base_url: String,
    text_model: String,
    vision_model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<WireSafetySetting>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WirePart<'a> {
    Text { text: &'a str },
    InlineData { inline_data: WireInlineData<'a> },
}

#[derive(Debug, Serialize)]
struct WireInlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct WireSafetySetting {
    category: &'static str,
    threshold: &'static str,
}

/// One SSE event of a streamed response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl GeminiBackend {
    /// Create a Gemini backend; call [`ModelBackend::authenticate`] before use
    #[must_use]
    pub fn new(text_model: String, vision_model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            base_url: GEMINI_API_URL.to_string(),
            text_model,
            vision_model,
        }
    }

    /// Point at a different API root
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

    fn stream_url(&self, endpoint: Endpoint) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url,
            self.model_for(endpoint)
        )
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn authenticate(&mut self, api_key: SecretString) -> Result<()> {
        if api_key.expose_secret().trim().is_empty() {
            return Err(Error::CredentialMissing("GEMINI_API_KEY".to_string()));
        }
        self.api_key = Some(api_key);
        Ok(())
    }

    async fn send(&self, request: &ModelRequest) -> Result<TextStream> {
        let Some(api_key) = &self.api_key else {
            return Err(Error::CredentialMissing(
                "gemini backend is not authenticated".to_string(),
            ));
        };

        let body = build_request(request);

        tracing::debug!(
            model = self.model_for(request.endpoint),
            history = request.history.len(),
            images = request.image_count(),
            "sending gemini request"
        );

        let response = self
            .client
            .post(self.stream_url(request.endpoint))
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let response = check_status("Gemini", response).await?;

        Ok(sse_text_stream(response, parse_stream_event))
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Model => "model",
    }
}

fn wire_parts(parts: &[Part]) -> Vec<WirePart<'_>> {
    parts
        .iter()
        .map(|part| match part {
            Part::Text(text) => WirePart::Text { text },
            Part::InlineData(inline) => WirePart::InlineData {
                inline_data: WireInlineData {
                    mime_type: &inline.mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(&inline.data),
                },
            },
        })
        .collect()
}

fn wire_content(turn: &ConversationTurn) -> Content<'_> {
    Content {
        role: role_name(turn.role),
        parts: wire_parts(&turn.parts),
    }
}

fn build_request(request: &ModelRequest) -> GenerateContentRequest<'_> {
    // Gemini rejects contents without parts
    let mut contents: Vec<Content<'_>> = request
        .history
        .iter()
        .filter(|turn| !turn.parts.is_empty())
        .map(wire_content)
        .collect();

    contents.push(Content {
        role: role_name(Role::User),
        parts: wire_parts(&request.parts),
    });

    GenerateContentRequest {
        contents,
        generation_config: WireGenerationConfig {
            temperature: request.generation_config.temperature,
        },
        safety_settings: request
            .safety_settings
            .iter()
            .map(|s| WireSafetySetting {
                category: s.category.as_str(),
                threshold: s.threshold.as_str(),
            })
            .collect(),
    }
}

/// Extract the text carried by one SSE event
fn parse_stream_event(data: &str) -> Result<Option<String>> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| Error::Stream(format!("invalid gemini event: {e}")))?;

    if let Some(error) = chunk.error {
        return Err(Error::Stream(error.message));
    }

    if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(Error::Stream(format!("prompt blocked: {reason}")));
    }

    let mut text = String::new();
    let mut blocked = false;
    for candidate in chunk.candidates {
        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            blocked = true;
        }
        if let Some(content) = candidate.content {
            text.extend(content.parts.into_iter().filter_map(|p| p.text));
        }
    }

    if text.is_empty() {
        if blocked {
            return Err(Error::Stream("response blocked by safety filter".to_string()));
        }
        return Ok(None);
    }

    Ok(Some(text))
}
