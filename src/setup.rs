//! Startup prompts and session wiring
//!
//! Runs before the first model call: resolves the API key, finds a working
//! camera and assembles the [`Session`].

use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::camera::FrameSource;
use crate::config::Config;
use crate::interaction::{Prompter, Session};
use crate::model::{ModelBackend, ModelClient, RateLimitedCaller};
use crate::present::{DisplaySink, PresentationPipeline};
use crate::voice::{SpeechSink, TextToSpeech, TtsProvider};
use crate::{Error, Result};

/// Find the API key for the configured backend
///
/// An explicit key wins. Otherwise the user is asked, and a blank answer
/// falls back to the environment and config file.
///
/// # Errors
///
/// Returns [`Error::CredentialMissing`] if no key is found anywhere
pub async fn resolve_api_key(
    explicit: Option<SecretString>,
    config: &Config,
    prompter: &dyn Prompter,
    display: &dyn DisplaySink,
) -> Result<SecretString> {
    if let Some(key) = explicit.filter(|k| !k.expose_secret().trim().is_empty()) {
        return Ok(key);
    }

    let env_name = config.model.backend.api_key_env();
    let typed = prompter
        .password("API key (press Enter to fetch from environment instead)")
        .await?;
    if !typed.trim().is_empty() {
        return Ok(SecretString::from(typed.trim().to_string()));
    }

    display.line(&format!(
        "No API key provided thus will try to fetch key ({env_name}) from environment"
    ));
    config
        .api_keys
        .for_backend(config.model.backend)
        .filter(|k| !k.trim().is_empty())
        .map(|k| SecretString::from(k.to_string()))
        .ok_or_else(|| Error::CredentialMissing(env_name.to_string()))
}

/// Ask for a camera index until `open` succeeds
///
/// A configured index is tried first without asking.
///
/// # Errors
///
/// Returns error only if the terminal cannot be read
pub async fn open_camera<T, F, Fut>(
    configured: Option<u32>,
    prompter: &dyn Prompter,
    display: &dyn DisplaySink,
    mut open: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut candidate = configured;
    loop {
        let index = match candidate.take() {
            Some(index) => index,
            None => {
                let answer = prompter.input("Set cam index").await?;
                match parse_cam_index(&answer) {
                    Some(index) => index,
                    None => {
                        display.error("Cam index must be an integer.");
                        continue;
                    }
                }
            }
        };

        match open(index).await {
            Ok(camera) => {
                display.line("Cam detected successfully...");
                return Ok(camera);
            }
            Err(e) => {
                tracing::debug!(index, error = %e, "camera open failed");
                display.error("Unable to detect cam at this index, please try again");
            }
        }
    }
}

fn parse_cam_index(answer: &str) -> Option<u32> {
    let answer = answer.trim();
    if answer.is_empty() || !answer.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    answer.parse().ok()
}

/// Speech output for the configured TTS model, if any
///
/// A missing TTS key only turns speech off.
#[must_use]
pub fn speech_sink(config: &Config, display: &dyn DisplaySink) -> Option<Arc<dyn SpeechSink>> {
    let model = config.speech.tts_model.as_deref()?;
    let provider = TtsProvider::for_model(model);

    let Some(key) = config.api_keys.for_tts(provider) else {
        display.error(&format!(
            "{} not set, continuing without speech",
            provider.api_key_env()
        ));
        return None;
    };

    match TextToSpeech::new(
        SecretString::from(key.to_string()),
        model,
        config.speech.voice.clone(),
        config.speech.speed,
    ) {
        Ok(tts) => {
            tracing::info!(model, "speech enabled");
            Some(Arc::new(tts))
        }
        Err(e) => {
            display.error(&format!("{e}, continuing without speech"));
            None
        }
    }
}

/// Assemble a session from its parts
///
/// # Errors
///
/// Returns error if the rate-limit policy is unusable
pub fn build_session(
    config: &Config,
    backend: Box<dyn ModelBackend>,
    frames: Arc<dyn FrameSource>,
    display: Arc<dyn DisplaySink>,
    speech: Option<Arc<dyn SpeechSink>>,
) -> Result<Session> {
    let caller = RateLimitedCaller::shared(config.rate_limit)?;
    let client = ModelClient::new(Arc::from(backend), caller)
        .with_generation_config(config.model.generation_config());

    let pipeline = match speech {
        Some(sink) => PresentationPipeline::with_speech(display, sink, config.speech.queue_capacity),
        None => PresentationPipeline::new(display),
    };

    Ok(Session::new(
        client,
        pipeline,
        frames,
        config.frames.clone(),
        config.detect_prompt.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::file::parse_config_file;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct Answers(Mutex<VecDeque<&'static str>>);

    impl Answers {
        fn new(answers: &[&'static str]) -> Self {
            Self(Mutex::new(answers.iter().copied().collect()))
        }
    }

    #[async_trait]
    impl Prompter for Answers {
        async fn input(&self, _label: &str) -> Result<String> {
            Ok(self.0.lock().unwrap().pop_front().unwrap_or_default().to_string())
        }

        async fn password(&self, label: &str) -> Result<String> {
            self.input(label).await
        }
    }

    #[derive(Default)]
    struct Lines(Mutex<Vec<String>>);

    impl DisplaySink for Lines {
        fn write(&self, text: &str) {
            if text != "\n" {
                self.0.lock().unwrap().push(text.to_string());
            }
        }
    }

    fn config(toml: &str) -> Config {
        Config::from_sources(parse_config_file(toml).unwrap(), None, None, |_| None).unwrap()
    }

    #[tokio::test]
    async fn explicit_key_skips_prompt() {
        let prompter = Answers::new(&["typed"]);
        let key = resolve_api_key(
            Some(SecretString::from("flag")),
            &config(""),
            &prompter,
            &Lines::default(),
        )
        .await
        .unwrap();
        assert_eq!(key.expose_secret(), "flag");
        assert_eq!(prompter.0.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn blank_answer_falls_back_to_config() {
        let display = Lines::default();
        let key = resolve_api_key(
            None,
            &config("[api_keys]\ngemini = \"from-file\""),
            &Answers::new(&[""]),
            &display,
        )
        .await
        .unwrap();
        assert_eq!(key.expose_secret(), "from-file");
        assert!(display.0.lock().unwrap()[0].contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn no_key_anywhere_is_credential_missing() {
        let result =
            resolve_api_key(None, &config(""), &Answers::new(&[""]), &Lines::default()).await;
        assert!(matches!(result, Err(Error::CredentialMissing(name)) if name == "GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn camera_prompt_retries_until_open() {
        let display = Lines::default();
        let prompter = Answers::new(&["abc", "7", "1"]);

        let camera = open_camera(None, &prompter, &display, |index| async move {
            if index == 1 {
                Ok(index)
            } else {
                Err(Error::CameraUnavailable("no device".to_string()))
            }
        })
        .await
        .unwrap();

        assert_eq!(camera, 1);
        assert_eq!(*display.0.lock().unwrap(), vec![
            "Cam index must be an integer.",
            "Unable to detect cam at this index, please try again",
            "Cam detected successfully...",
        ]);
    }

    #[tokio::test]
    async fn configured_camera_is_tried_first() {
        let prompter = Answers::new(&[]);
        let camera = open_camera(Some(3), &prompter, &Lines::default(), |index| async move {
            Ok(index)
        })
        .await
        .unwrap();
        assert_eq!(camera, 3);
    }

    #[test]
    fn cam_index_must_be_digits() {
        assert_eq!(parse_cam_index(" 2 "), Some(2));
        assert_eq!(parse_cam_index("-1"), None);
        assert_eq!(parse_cam_index("1.0"), None);
        assert_eq!(parse_cam_index(""), None);
    }

    #[test]
    fn speech_is_off_without_tts_model_or_key() {
        let display = Lines::default();
        assert!(speech_sink(&config(""), &display).is_none());
        assert!(speech_sink(&config("[speech]\ntts_model = \"tts-1\""), &display).is_none());
        assert!(display.0.lock().unwrap()[0].contains("OPENAI_API_KEY"));
        assert!(
            speech_sink(
                &config("[speech]\ntts_model = \"tts-1\"\n[api_keys]\nopenai = \"k\""),
                &display
            )
            .is_some()
        );
    }
}
