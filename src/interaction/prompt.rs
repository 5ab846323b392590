//! Line prompts

use async_trait::async_trait;
use dialoguer::{Input, Password};

use crate::{Error, Result};

/// Asks the user for a line of input
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Visible input; may be empty
    ///
    /// # Errors
    ///
    /// Returns error if the terminal cannot be read
    async fn input(&self, label: &str) -> Result<String>;

    /// Hidden input; may be empty
    ///
    /// # Errors
    ///
    /// Returns error if the terminal cannot be read
    async fn password(&self, label: &str) -> Result<String>;
}

/// Terminal prompts through `dialoguer`
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn input(&self, label: &str) -> Result<String> {
        let label = label.to_string();
        run_blocking(move || {
            Input::<String>::new()
                .with_prompt(label)
                .allow_empty(true)
                .interact_text()
        })
        .await
    }

    async fn password(&self, label: &str) -> Result<String> {
        let label = label.to_string();
        run_blocking(move || {
            Password::new()
                .with_prompt(label)
                .allow_empty_password(true)
                .interact()
        })
        .await
    }
}

async fn run_blocking<F>(prompt: F) -> Result<String>
where
    F: FnOnce() -> dialoguer::Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(prompt)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?
        .map_err(Error::from)
}
