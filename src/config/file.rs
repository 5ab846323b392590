//! TOML configuration file loading
//!
//! Supports `~/.config/stream-interact/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct StreamInteractConfigFile {
    /// Model backend configuration
    #[serde(default)]
    pub model: ModelFileConfig,

    /// Rate limit and retry configuration
    #[serde(default)]
    pub rate_limit: RateLimitFileConfig,

    /// Frame sampling configuration
    #[serde(default)]
    pub frames: FramesFileConfig,

    /// Camera configuration
    #[serde(default)]
    pub camera: CameraFileConfig,

    /// Speech output configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Prompt overrides
    #[serde(default)]
    pub prompt: PromptFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Model-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// Backend name ("gemini" or "openai")
    pub backend: Option<String>,

    /// Model used for text-only chat turns
    pub text_model: Option<String>,

    /// Model used for calls carrying images
    pub vision_model: Option<String>,

    /// Sampling temperature
    pub temperature: Option<f32>,
}

/// Rate limit configuration
#[derive(Debug, Default, Deserialize)]
pub struct RateLimitFileConfig {
    /// Calls allowed per period
    pub calls: Option<u32>,

    /// Period length in seconds
    pub period_secs: Option<f64>,

    /// Attempts made on transport failures before giving up
    pub max_retries: Option<u32>,

    /// Constant backoff between attempts in milliseconds
    pub backoff_ms: Option<u64>,
}

/// Frame sampling configuration
#[derive(Debug, Default, Deserialize)]
pub struct FramesFileConfig {
    /// Frames sampled per detection
    pub nframes_interact: Option<usize>,

    /// Milliseconds slept between samples
    pub frame_capture_interval_ms: Option<u64>,
}

/// Camera configuration
#[derive(Debug, Default, Deserialize)]
pub struct CameraFileConfig {
    pub index: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub ffmpeg: Option<String>,
}

/// Speech output configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// TTS model (e.g. "tts-1"); speech is off when unset
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Sentence queue capacity
    pub queue_capacity: Option<usize>,
}

/// Prompt overrides
#[derive(Debug, Default, Deserialize)]
pub struct PromptFileConfig {
    /// Replaces the built-in detection prompt
    pub detect: Option<String>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `StreamInteractConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> StreamInteractConfigFile {
    config_file_path().map_or_else(StreamInteractConfigFile::default, |path| {
        load_config_from(&path)
    })
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> StreamInteractConfigFile {
    if !path.exists() {
        return StreamInteractConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => parse_config_file(&content).unwrap_or_else(|e| {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to parse config file, using defaults"
            );
            StreamInteractConfigFile::default()
        }),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            StreamInteractConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the content is not valid TOML for this schema
pub fn parse_config_file(content: &str) -> crate::Result<StreamInteractConfigFile> {
    let config = toml::from_str(content)?;
    tracing::debug!("parsed config file");
    Ok(config)
}

/// Return the config file path: `~/.config/stream-interact/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("stream-interact")
            .join("config.toml")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let fc = parse_config_file("").unwrap();
        assert!(fc.model.backend.is_none());
        assert!(fc.rate_limit.calls.is_none());
        assert!(fc.speech.tts_model.is_none());
    }

    #[test]
    fn partial_sections_parse() {
        let fc = parse_config_file(
            r#"
            [model]
            backend = "openai"
            temperature = 0.4

            [rate_limit]
            calls = 3
            period_secs = 1.5

            [frames]
            nframes_interact = 5
            "#,
        )
        .unwrap();

        assert_eq!(fc.model.backend.as_deref(), Some("openai"));
        assert_eq!(fc.model.temperature, Some(0.4));
        assert_eq!(fc.rate_limit.calls, Some(3));
        assert_eq!(fc.rate_limit.period_secs, Some(1.5));
        assert!(fc.rate_limit.max_retries.is_none());
        assert_eq!(fc.frames.nframes_interact, Some(5));
    }

    #[test]
    fn file_on_disk_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[speech]\ntts_model = \"tts-1\"\n").unwrap();

        let fc = load_config_from(&path);
        assert_eq!(fc.speech.tts_model.as_deref(), Some("tts-1"));
    }

    #[test]
    fn unreadable_or_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config_from(&dir.path().join("absent.toml"));
        assert!(missing.model.backend.is_none());

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[model\n").unwrap();
        assert!(load_config_from(&broken).model.backend.is_none());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse_config_file("[model\nbackend = ").is_err());
    }
}
