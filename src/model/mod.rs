//! Remote language-model access
//!
//! A [`ModelBackend`] is the transport for one provider. [`ModelClient`] builds
//! converse/detect requests on top of it, projecting history through the
//! [`HistoryAdapter`] and issuing every call through a shared
//! [`RateLimitedCaller`].

mod client;
mod gemini;
mod history;
mod openai;
pub mod rate_limit;
mod types;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use secrecy::SecretString;

pub use client::ModelClient;
pub use gemini::GeminiBackend;
pub use history::HistoryAdapter;
pub use openai::OpenAiBackend;
pub use rate_limit::{RateLimitPolicy, RateLimitedCaller, SharedCaller};
pub use types::{
    ConversationHistory, ConversationTurn, Endpoint, GenerationConfig, HarmBlockThreshold,
    HarmCategory, InlineData, ModelRequest, Part, Role, SafetySetting, TextStream,
    default_safety_settings,
};

use crate::config::ModelConfig;
use crate::{Error, Result};

/// Provider selected on the command line or in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Backend {
    /// Google Gemini
    #[default]
    Gemini,
    /// `OpenAI` chat completions
    #[value(name = "openai")]
    OpenAi,
}

impl Backend {
    /// Environment variable holding this backend's API key
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Default (text, vision) model names
    #[must_use]
    pub const fn default_models(self) -> (&'static str, &'static str) {
        match self {
            Self::Gemini => ("gemini-2.0-flash", "gemini-2.0-flash"),
            Self::OpenAi => ("gpt-4o-mini", "gpt-4o-mini"),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!("unknown model backend: {other}"))),
        }
    }
}

/// Transport for one model provider
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &'static str;

    /// Store the credential used by subsequent calls
    ///
    /// # Errors
    ///
    /// Returns [`Error::CredentialMissing`] if the key is empty
    fn authenticate(&mut self, api_key: SecretString) -> Result<()>;

    /// Start a streamed call
    ///
    /// Resolves once the remote side has accepted the request; fragments then
    /// arrive lazily through the returned stream.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or is rejected
    async fn send(&self, request: &ModelRequest) -> Result<TextStream>;
}

/// Construct the backend described by `config`
#[must_use]
pub fn create_backend(config: &ModelConfig) -> Box<dyn ModelBackend> {
    match config.backend {
        Backend::Gemini => Box::new(GeminiBackend::new(
            config.text_model.clone(),
            config.vision_model.clone(),
        )),
        Backend::OpenAi => Box::new(OpenAiBackend::new(
            config.text_model.clone(),
            config.vision_model.clone(),
        )),
    }
}

/// Turn a server-sent-events response into a stream of text fragments
///
/// `parse` maps one event's data to an optional fragment; events yielding
/// `None` are skipped.
fn sse_text_stream<F>(response: reqwest::Response, parse: F) -> TextStream
where
    F: Fn(&str) -> Result<Option<String>> + Send + 'static,
{
    response
        .bytes_stream()
        .eventsource()
        .filter_map(move |event| {
            let item = match event {
                Ok(event) => parse(&event.data).transpose(),
                Err(e) => Some(Err(Error::Stream(e.to_string()))),
            };
            futures::future::ready(item)
        })
        .boxed()
}

/// Fail with the response body if the status is not a success
async fn check_status(provider: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Transport(format!("{provider} API error {status}: {body}")))
}
