//! Conversation and request types shared by every model backend

use std::fmt;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazy sequence of text fragments produced by a streamed model call
pub type TextStream = BoxStream<'static, crate::Result<String>>;

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Model => write!(f, "model"),
        }
    }
}

/// Binary payload sent inline with a request (camera frames)
#[derive(Clone, PartialEq, Eq)]
pub struct InlineData {
    /// MIME type, e.g. `image/jpeg`
    pub mime_type: String,
    /// Raw bytes (encoded by the backend as needed)
    pub data: Vec<u8>,
}

impl InlineData {
    /// JPEG image payload
    #[must_use]
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            mime_type: "image/jpeg".to_string(),
            data,
        }
    }
}

impl fmt::Debug for InlineData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineData")
            .field("mime_type", &self.mime_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One ordered element of a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

impl Part {
    /// Text content, if this is a text part
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::InlineData(_) => None,
        }
    }

    #[must_use]
    pub const fn is_inline_data(&self) -> bool {
        matches!(self, Self::InlineData(_))
    }
}

impl From<&str> for Part {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Part {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<InlineData> for Part {
    fn from(data: InlineData) -> Self {
        Self::InlineData(data)
    }
}

/// A role-attributed message unit, immutable once recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    #[must_use]
    pub const fn new(role: Role, parts: Vec<Part>) -> Self {
        Self { role, parts }
    }

    /// User turn holding a single text part
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text(text.into())])
    }

    /// Model turn holding a single text part
    #[must_use]
    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::Text(text.into())])
    }

    /// Whether any part carries binary data
    #[must_use]
    pub fn has_inline_data(&self) -> bool {
        self.parts.iter().any(Part::is_inline_data)
    }

    /// Concatenated text of all text parts
    #[must_use]
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }
}

/// Ordered, append-only record of the active session's turns
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    #[must_use]
    pub const fn new() -> Self {
        Self { turns: Vec::new() }
    }

    /// Append a turn
    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Append a user/model exchange
    pub fn push_exchange(&mut self, user: ConversationTurn, model: ConversationTurn) {
        self.turns.push(user);
        self.turns.push(model);
    }

    /// Drop every turn and start a new sub-conversation
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversationTurn> {
        self.turns.iter()
    }
}

impl FromIterator<ConversationTurn> for ConversationHistory {
    fn from_iter<I: IntoIterator<Item = ConversationTurn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ConversationHistory {
    type Item = &'a ConversationTurn;
    type IntoIter = std::slice::Iter<'a, ConversationTurn>;

    fn into_iter(self) -> Self::IntoIter {
        self.turns.iter()
    }
}

/// Which remote endpoint a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Text-only multi-turn chat
    Text,
    /// Stateless call carrying images
    Multimodal,
}

/// Sampling parameters sent with every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { temperature: 0.0 }
    }
}

/// Harm categories recognised by the safety filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HarmCategory {
    DangerousContent,
    SexuallyExplicit,
    HateSpeech,
    Harassment,
}

impl HarmCategory {
    pub const ALL: [Self; 4] = [
        Self::DangerousContent,
        Self::SexuallyExplicit,
        Self::HateSpeech,
        Self::Harassment,
    ];

    /// Wire name of the category
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DangerousContent => "HARM_CATEGORY_DANGEROUS_CONTENT",
            Self::SexuallyExplicit => "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            Self::HateSpeech => "HARM_CATEGORY_HATE_SPEECH",
            Self::Harassment => "HARM_CATEGORY_HARASSMENT",
        }
    }
}

/// Blocking threshold applied to a harm category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarmBlockThreshold {
    BlockNone,
    BlockOnlyHigh,
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl HarmBlockThreshold {
    /// Wire name of the threshold
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockNone => "BLOCK_NONE",
            Self::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            Self::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            Self::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

/// One category/threshold pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetySetting {
    pub category: HarmCategory,
    pub threshold: HarmBlockThreshold,
}

/// Every recognised category set to `BLOCK_NONE`
#[must_use]
pub fn default_safety_settings() -> Vec<SafetySetting> {
    HarmCategory::ALL
        .into_iter()
        .map(|category| SafetySetting {
            category,
            threshold: HarmBlockThreshold::BlockNone,
        })
        .collect()
}

/// A fully built outbound call
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub endpoint: Endpoint,
    /// Prior turns, already projected for `endpoint`
    pub history: ConversationHistory,
    /// Prompt segments and image payloads, in order
    pub parts: Vec<Part>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl ModelRequest {
    /// The new user turn this request sends
    #[must_use]
    pub fn user_turn(&self) -> ConversationTurn {
        ConversationTurn::new(Role::User, self.parts.clone())
    }

    /// Number of image parts in the prompt
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.parts.iter().filter(|p| p.is_inline_data()).count()
    }
}
