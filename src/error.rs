//! Error types for stream-interact

use thiserror::Error;

/// Result type alias for stream-interact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running an interaction session
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No API key could be found for the selected backend
    #[error("unable to find an API key ({0})")]
    CredentialMissing(String),

    /// Camera could not be opened or stopped producing frames
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Local call budget exhausted; retried internally by the caller
    #[error("rate limited")]
    RateLimited,

    /// Remote call still failing after every allowed attempt
    #[error("model call failed after {attempts} attempt(s): {source}")]
    CallFailed {
        /// Number of underlying attempts made
        attempts: u32,
        /// Last underlying error
        #[source]
        source: Box<Self>,
    },

    /// Remote model returned an error response
    #[error("transport error: {0}")]
    Transport(String),

    /// Streamed response broke off or carried an error event
    #[error("stream error: {0}")]
    Stream(String),

    /// Speech pipeline was asked to speak an empty string
    #[error("empty string given for speech synthesis")]
    EmptySynthesisInput,

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Image conversion error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Interactive prompt error
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the error came from the local rate limiter rather than the remote side
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}
