//! Configuration management for stream-interact
//!
//! Values are layered CLI flag > environment > TOML file > default.

pub mod file;

use std::num::NonZeroU32;
use std::time::Duration;

use crate::model::{Backend, GenerationConfig, RateLimitPolicy};
use crate::voice::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TTS_MODEL, TtsProvider};
use crate::{Error, Result};

use file::{RateLimitFileConfig, StreamInteractConfigFile};

/// TTS model name that selects [`DEFAULT_TTS_MODEL`]
pub const DEFAULT_TTS_ALIAS: &str = "default";

/// Session configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Model backend selection
    pub model: ModelConfig,

    /// Limiter and retry policy shared by every call
    pub rate_limit: RateLimitPolicy,

    /// Frame sampling for detection
    pub frames: FramesConfig,

    /// Camera device
    pub camera: CameraConfig,

    /// Speech output
    pub speech: SpeechConfig,

    /// Base prompt used by detect mode
    pub detect_prompt: String,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Model backend configuration
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub backend: Backend,
    pub text_model: String,
    pub vision_model: String,
    pub temperature: f32,
}

impl ModelConfig {
    #[must_use]
    pub const fn generation_config(&self) -> GenerationConfig {
        GenerationConfig {
            temperature: self.temperature,
        }
    }
}

/// Frame sampling configuration
#[derive(Debug, Clone)]
pub struct FramesConfig {
    /// Frames in one detection batch
    pub nframes_interact: usize,

    /// Delay between samples
    pub frame_capture_interval: Duration,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            nframes_interact: 3,
            frame_capture_interval: Duration::from_millis(400),
        }
    }
}

/// Camera configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Device index; asked interactively when unset
    pub index: Option<u32>,
    pub width: u32,
    pub height: u32,
    /// Path to the `ffmpeg` binary
    pub ffmpeg: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: None,
            width: 640,
            height: 480,
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

/// Speech output configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// TTS model; `None` disables speech
    pub tts_model: Option<String>,
    /// Voice; the provider's default when unset
    pub voice: Option<String>,
    pub speed: f32,
    pub queue_capacity: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            tts_model: None,
            voice: None,
            speed: 1.0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

impl ApiKeys {
    /// Key for the language-model backend
    #[must_use]
    pub fn for_backend(&self, backend: Backend) -> Option<&str> {
        match backend {
            Backend::Gemini => self.gemini.as_deref(),
            Backend::OpenAi => self.openai.as_deref(),
        }
    }

    /// Key for a speech provider
    #[must_use]
    pub fn for_tts(&self, provider: TtsProvider) -> Option<&str> {
        match provider {
            TtsProvider::OpenAI => self.openai.as_deref(),
            TtsProvider::ElevenLabs => self.elevenlabs.as_deref(),
        }
    }
}

/// The built-in detection prompt for a batch of `nframes` images
#[must_use]
pub fn default_detect_prompt(nframes: usize) -> String {
    format!(
        "I will give you {nframes} images of the same object and I want you to identify the \
         object. You MUST generate the output in the following format without any extra text:\n\
         Object Detected: <object identification goes here>\n\
         Detailed Description: <detailed description goes here>\n\
         Confidence Level: <A score of how confident you are in your object identification. \
         This MUST be a value between 0 and 1 where 0 is the lowest score and 1 is the highest.>"
    )
}

/// Map a TTS model name to the model that is used, resolving the `default` alias
#[must_use]
pub fn resolve_tts_model(name: &str) -> String {
    if name.eq_ignore_ascii_case(DEFAULT_TTS_ALIAS) {
        DEFAULT_TTS_MODEL.to_string()
    } else {
        name.to_string()
    }
}

impl Config {
    /// Load configuration from environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load() -> Result<Self> {
        Self::load_with_options(None, None)
    }

    /// Load configuration with CLI overrides for backend and TTS model
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn load_with_options(backend: Option<Backend>, tts_model: Option<&str>) -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(fc, backend, tts_model, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range
    pub fn from_sources<E>(
        fc: StreamInteractConfigFile,
        backend: Option<Backend>,
        tts_model: Option<&str>,
        env: E,
    ) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        // Backend (cli > toml > default)
        let backend = match backend {
            Some(backend) => backend,
            None => fc
                .model
                .backend
                .as_deref()
                .map(str::parse)
                .transpose()?
                .unwrap_or_default(),
        };

        // Models (env > toml > backend default); a file naming models for one
        // backend does not apply to the other
        let (default_text, default_vision) = backend.default_models();
        let file_backend_matches = fc
            .model
            .backend
            .as_deref()
            .and_then(|b| b.parse::<Backend>().ok())
            .is_none_or(|b| b == backend);
        let (file_text, file_vision) = if file_backend_matches {
            (fc.model.text_model, fc.model.vision_model)
        } else {
            (None, None)
        };

        let model = ModelConfig {
            backend,
            text_model: env("STREAM_INTERACT_TEXT_MODEL")
                .or(file_text)
                .unwrap_or_else(|| default_text.to_string()),
            vision_model: env("STREAM_INTERACT_VISION_MODEL")
                .or(file_vision)
                .unwrap_or_else(|| default_vision.to_string()),
            temperature: fc.model.temperature.unwrap_or(0.0),
        };

        let rate_limit = rate_limit_policy(&fc.rate_limit)?;

        let defaults = FramesConfig::default();
        let frames = FramesConfig {
            nframes_interact: fc
                .frames
                .nframes_interact
                .unwrap_or(defaults.nframes_interact),
            frame_capture_interval: fc
                .frames
                .frame_capture_interval_ms
                .map_or(defaults.frame_capture_interval, Duration::from_millis),
        };
        if frames.nframes_interact == 0 {
            return Err(Error::Config(
                "frames.nframes_interact must be greater than zero".to_string(),
            ));
        }

        let defaults = CameraConfig::default();
        let camera = CameraConfig {
            index: fc.camera.index,
            width: fc.camera.width.unwrap_or(defaults.width),
            height: fc.camera.height.unwrap_or(defaults.height),
            ffmpeg: fc.camera.ffmpeg.unwrap_or(defaults.ffmpeg),
        };

        // Speech (cli > env > toml > off)
        let defaults = SpeechConfig::default();
        let speech = SpeechConfig {
            tts_model: tts_model
                .map(str::to_string)
                .or_else(|| env("STREAM_INTERACT_TTS_MODEL"))
                .or(fc.speech.tts_model)
                .filter(|m| !m.trim().is_empty())
                .map(|m| resolve_tts_model(m.trim())),
            voice: fc
                .speech
                .tts_voice
                .filter(|v| !v.trim().is_empty())
                .or(defaults.voice),
            speed: fc.speech.tts_speed.unwrap_or(defaults.speed),
            queue_capacity: fc
                .speech
                .queue_capacity
                .unwrap_or(defaults.queue_capacity)
                .max(1),
        };

        let detect_prompt = fc
            .prompt
            .detect
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| default_detect_prompt(frames.nframes_interact));

        // API keys (env > toml > None)
        let api_keys = ApiKeys {
            gemini: env("GEMINI_API_KEY").or(fc.api_keys.gemini),
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
        };

        tracing::debug!(
            backend = %model.backend,
            text_model = %model.text_model,
            vision_model = %model.vision_model,
            speech = speech.tts_model.is_some(),
            "configuration loaded"
        );

        Ok(Self {
            model,
            rate_limit,
            frames,
            camera,
            speech,
            detect_prompt,
            api_keys,
        })
    }
}

fn rate_limit_policy(section: &RateLimitFileConfig) -> Result<RateLimitPolicy> {
    let defaults = RateLimitPolicy::default();

    let calls = match section.calls {
        Some(calls) => NonZeroU32::new(calls).ok_or_else(|| {
            Error::Config("rate_limit.calls must be greater than zero".to_string())
        })?,
        None => defaults.calls,
    };

    let period = match section.period_secs {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map_err(|e| Error::Config(format!("rate_limit.period_secs: {e}")))?,
        None => defaults.period,
    };

    Ok(RateLimitPolicy {
        calls,
        period,
        max_retries: section.max_retries.unwrap_or(defaults.max_retries),
        backoff: section
            .backoff_ms
            .map_or(defaults.backoff, Duration::from_millis),
    })
}
