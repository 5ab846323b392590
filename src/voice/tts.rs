//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::playback::AudioPlayback;
use super::speaker::SpeechSink;
use crate::{Error, Result};

/// Model used when `--tts-model-name default` is given
pub const DEFAULT_TTS_MODEL: &str = "tts-1";

/// Prefix selecting the `ElevenLabs` provider in a model name
const ELEVENLABS_PREFIX: &str = "elevenlabs/";

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

impl TtsProvider {
    /// Provider implied by a model name (`elevenlabs/<model>` or an `OpenAI` model)
    #[must_use]
    pub fn for_model(model: &str) -> Self {
        if model.starts_with(ELEVENLABS_PREFIX) {
            Self::ElevenLabs
        } else {
            Self::OpenAI
        }
    }

    /// Voice used when none is configured
    #[must_use]
    pub const fn default_voice(self) -> &'static str {
        match self {
            Self::OpenAI => "alloy",
            // "Rachel"
            Self::ElevenLabs => "21m00Tcm4TlvDzPxtNnz",
        }
    }

    /// Environment variable holding this provider's API key
    #[must_use]
    pub const fn api_key_env(self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::ElevenLabs => "ELEVENLABS_API_KEY",
        }
    }
}

/// Synthesizes speech from text
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a TTS instance for `model`, picking the provider from its name
    ///
    /// Without a `voice` the provider's [`TtsProvider::default_voice`] is used.
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        api_key: SecretString,
        model: &str,
        voice: Option<String>,
        speed: f32,
    ) -> Result<Self> {
        let provider = TtsProvider::for_model(model);
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!(
                "{} required for TTS",
                provider.api_key_env()
            )));
        }

        let model = model.strip_prefix(ELEVENLABS_PREFIX).unwrap_or(model).to_string();
        let voice = voice.unwrap_or_else(|| provider.default_voice().to_string());

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            provider,
        })
    }

    #[must_use]
    pub const fn provider(&self) -> TtsProvider {
        self.provider
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn voice(&self) -> &str {
        &self.voice
    }

    /// Synthesize text to speech
    ///
    /// # Returns
    ///
    /// Audio bytes (MP3 format)
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::OpenAI => self.synthesize_openai(text).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text).await,
        }
    }

    async fn synthesize_openai(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }

    async fn synthesize_elevenlabs(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            self.voice
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await?;
        Ok(audio.to_vec())
    }
}

#[async_trait]
impl SpeechSink for TextToSpeech {
    async fn speak(&self, text: &str) -> Result<()> {
        let audio = self.synthesize(text).await?;
        tracing::debug!(bytes = audio.len(), "speech synthesized");

        tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3(&audio))
            .await
            .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_follows_model_prefix() {
        assert_eq!(TtsProvider::for_model("tts-1"), TtsProvider::OpenAI);
        assert_eq!(
            TtsProvider::for_model("elevenlabs/eleven_monolingual_v1"),
            TtsProvider::ElevenLabs
        );
    }

    #[test]
    fn elevenlabs_prefix_is_stripped() {
        let tts = TextToSpeech::new(
            SecretString::from("key"),
            "elevenlabs/eleven_turbo_v2",
            Some("voice-id".to_string()),
            1.0,
        )
        .unwrap();
        assert_eq!(tts.provider(), TtsProvider::ElevenLabs);
        assert_eq!(tts.model(), "eleven_turbo_v2");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let result = TextToSpeech::new(SecretString::from(""), "tts-1", None, 1.0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn default_voice_depends_on_provider() {
        let openai = TextToSpeech::new(SecretString::from("key"), "tts-1", None, 1.0).unwrap();
        assert_eq!(openai.voice(), "alloy");

        let elevenlabs = TextToSpeech::new(
            SecretString::from("key"),
            "elevenlabs/eleven_monolingual_v1",
            None,
            1.0,
        )
        .unwrap();
        assert_eq!(elevenlabs.voice(), TtsProvider::ElevenLabs.default_voice());
        assert_ne!(elevenlabs.voice(), "alloy");
    }

    #[test]
    fn configured_voice_wins() {
        let tts = TextToSpeech::new(
            SecretString::from("key"),
            "tts-1",
            Some("nova".to_string()),
            1.0,
        )
        .unwrap();
        assert_eq!(tts.voice(), "nova");
    }
}
