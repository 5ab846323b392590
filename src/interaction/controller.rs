//! Session state and the mode loop

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::mpsc;

use super::keyboard::{KeyHandler, KeyListeners, KeySource};
use super::mode::{Action, InteractionMode, KeyBindable};
use super::prompt::Prompter;
use crate::camera::{FrameSource, sample_frames, to_inline_jpeg};
use crate::config::FramesConfig;
use crate::model::{ConversationHistory, ConversationTurn, InlineData, ModelClient, Part, Role};
use crate::present::{DisplaySink, PresentationPipeline};
use crate::{Error, Result};

pub const WELCOME: &str = "Welcome to Stream Interact!";

pub const MENU: &str = "\
Choose one of the below modes:
- 'detect' mode will start a cam video stream where you can start detecting objects by pressing (d).
- 'detect_custom' mode is the same as detect mode but will allow you to customize the base prompt before asking the model to detect the object.
- 'interact' mode will allow for a back and forth chat with the AI over the detected object.
- 'quit' will exit

Keys while in stream:
  - (d) Will detect an object that the camera has focus on.
  - (i) Will switch to interact mode.
  - (m) Will switch back to this menu.
  - (c) Will allow for typing in a custom prompt before running (d)etect.
  - (q) Will quit the app.";

const EXIT_COMMAND: &str = "exit";

/// State shared by every turn of one session
///
/// Conversation history lives here and is handed to the model client on each
/// call; nothing is kept in the backend.
pub struct Session {
    client: ModelClient,
    pipeline: PresentationPipeline,
    frames: Arc<dyn FrameSource>,
    frames_config: FramesConfig,
    detect_prompt: String,
    custom_prompt: Mutex<Option<String>>,
    history: Mutex<ConversationHistory>,
}

impl Session {
    #[must_use]
    pub fn new(
        client: ModelClient,
        pipeline: PresentationPipeline,
        frames: Arc<dyn FrameSource>,
        frames_config: FramesConfig,
        detect_prompt: String,
    ) -> Self {
        Self {
            client,
            pipeline,
            frames,
            frames_config,
            detect_prompt,
            custom_prompt: Mutex::new(None),
            history: Mutex::new(ConversationHistory::new()),
        }
    }

    #[must_use]
    pub fn display(&self) -> &dyn DisplaySink {
        self.pipeline.display().as_ref()
    }

    /// Snapshot of the conversation so far
    #[must_use]
    pub fn history(&self) -> ConversationHistory {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_custom_prompt(&self, prompt: Option<String>) {
        *self
            .custom_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = prompt;
    }

    /// Prompt used by the next detection
    #[must_use]
    pub fn base_prompt(&self) -> String {
        self.custom_prompt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.detect_prompt.clone())
    }

    /// Make sure the camera is delivering frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::CameraUnavailable`] if capture cannot start
    pub fn ensure_streaming(&self) -> Result<()> {
        self.frames.ensure_streaming()
    }

    /// Sample a frame batch, ask the model what it shows and present the answer
    ///
    /// The (prompt with images, answer) pair replaces the conversation, so a
    /// following chat continues from this detection.
    ///
    /// # Errors
    ///
    /// Returns error if no frames are available or the call fails
    pub async fn detect(&self) -> Result<String> {
        let frames = sample_frames(
            self.frames.as_ref(),
            self.frames_config.nframes_interact,
            self.frames_config.frame_capture_interval,
            self.display(),
        )
        .await?;
        let images = frames
            .iter()
            .map(|frame| to_inline_jpeg(frame))
            .collect::<Result<Vec<InlineData>>>()?;

        let prompt = self.base_prompt();
        tracing::info!(images = images.len(), custom = prompt != self.detect_prompt, "detecting");

        let stream = self.client.detect(images.clone(), &prompt).await?;
        let answer = self.pipeline.present(stream).await?;

        let mut parts = Vec::with_capacity(images.len() + 1);
        parts.push(Part::from(prompt));
        parts.extend(images.into_iter().map(Part::InlineData));

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.reset();
        history.push_exchange(
            ConversationTurn::new(Role::User, parts),
            ConversationTurn::model_text(answer.clone()),
        );
        Ok(answer)
    }

    /// One text chat turn continuing the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the call fails; the turn is then not recorded
    pub async fn chat(&self, prompt: &str) -> Result<String> {
        let history = self.history();
        let stream = self.client.converse(prompt, &history).await?;
        let answer = self.pipeline.present(stream).await?;

        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_exchange(
                ConversationTurn::user_text(prompt),
                ConversationTurn::model_text(answer.clone()),
            );
        Ok(answer)
    }

    /// Show a failed turn without ending the session
    pub fn report_failure(&self, error: &Error) {
        tracing::warn!(error = %error, "turn failed");
        self.display().error(&error.to_string());
    }

    /// Finish queued speech
    pub async fn close(self) {
        self.pipeline.close().await;
    }
}

/// Drives the menu, detect and chat modes
pub struct Controller {
    session: Arc<Session>,
    prompter: Arc<dyn Prompter>,
    keys: Arc<dyn KeySource>,
    bindings: HashMap<char, Action>,
}

impl Controller {
    #[must_use]
    pub fn new(
        session: Arc<Session>,
        prompter: Arc<dyn Prompter>,
        keys: Arc<dyn KeySource>,
        bindings: &dyn KeyBindable,
    ) -> Self {
        Self {
            session,
            prompter,
            keys,
            bindings: bindings.handlers(),
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Run until the user quits
    ///
    /// # Errors
    ///
    /// Returns error only if the terminal cannot be read
    pub async fn run(&self) -> Result<()> {
        let mut mode = InteractionMode::Menu;
        loop {
            tracing::debug!(%mode, "entering mode");
            mode = match mode {
                InteractionMode::Menu => self.menu().await?,
                InteractionMode::Detect => self.detect_mode(false).await?,
                InteractionMode::DetectCustom => self.detect_mode(true).await?,
                InteractionMode::InteractiveChat => self.chat_loop().await?,
                InteractionMode::Quit => return Ok(()),
            };
        }
    }

    async fn menu(&self) -> Result<InteractionMode> {
        let display = self.session.display();
        display.line("");
        display.line(MENU);
        display.line("");

        let mode = loop {
            let choice = self.prompter.input("Choose a mode").await?;
            match choice.parse::<InteractionMode>() {
                Ok(mode) => break mode,
                Err(_) => display.error("Please select one of the available options"),
            }
        };

        self.session.set_custom_prompt(None);
        Ok(mode)
    }

    async fn detect_mode(&self, custom: bool) -> Result<InteractionMode> {
        if custom {
            self.ask_custom_prompt().await?;
        }

        if let Err(e) = self.session.ensure_streaming() {
            self.session.report_failure(&e);
            return Ok(InteractionMode::Menu);
        }
        self.session
            .display()
            .line("Running in detect mode. Press (d) to detect an object");

        loop {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let listeners =
                KeyListeners::start(Arc::clone(&self.keys), &self.bindings, &self.handler(tx));

            let action = rx.recv().await;
            listeners.stop().await;

            match action {
                Some(Action::SetCustomPrompt) => self.ask_custom_prompt().await?,
                Some(Action::SwitchToInteractive) => return Ok(InteractionMode::InteractiveChat),
                Some(Action::Quit) => return Ok(InteractionMode::Quit),
                Some(Action::SwitchToMenu | Action::Detect) | None => {
                    return Ok(InteractionMode::Menu);
                }
            }
        }
    }

    /// Handler for detect-mode keys
    ///
    /// Detection runs inside the listener of its key; every other action is
    /// passed back to the mode loop.
    fn handler(&self, tx: mpsc::UnboundedSender<Action>) -> KeyHandler {
        let session = Arc::clone(&self.session);
        Arc::new(move |action| {
            let session = Arc::clone(&session);
            let tx = tx.clone();
            async move {
                if action == Action::Detect {
                    if let Err(e) = session.detect().await {
                        session.report_failure(&e);
                    }
                } else if tx.send(action).is_err() {
                    tracing::debug!(?action, "mode already left");
                }
            }
            .boxed()
        })
    }

    async fn ask_custom_prompt(&self) -> Result<()> {
        let prompt = self.prompter.input("Custom Prompt").await?;
        let prompt = prompt.trim();
        self.session
            .set_custom_prompt((!prompt.is_empty()).then(|| prompt.to_string()));
        Ok(())
    }

    async fn chat_loop(&self) -> Result<InteractionMode> {
        self.session
            .display()
            .line("Running in interact mode. Type 'exit' to go back to previous menu.");

        loop {
            let prompt = self.prompter.input("Prompt").await?;
            if prompt.trim() == EXIT_COMMAND {
                return Ok(InteractionMode::Menu);
            }
            if prompt.trim().is_empty() {
                continue;
            }
            if let Err(e) = self.session.chat(&prompt).await {
                self.session.report_failure(&e);
            }
        }
    }
}
