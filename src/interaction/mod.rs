//! Interactive session control
//!
//! The [`Controller`] moves between the menu, detect mode (camera stream with
//! key-triggered detections) and a line-based chat, over one [`Session`].

mod controller;
mod keyboard;
mod mode;
mod prompt;

pub use controller::{Controller, MENU, Session, WELCOME};
pub use keyboard::{KeyHandler, KeyListeners, KeySource, TerminalKeys};
pub use mode::{Action, DetectBindings, InteractionMode, KeyBindable};
pub use prompt::{Prompter, TerminalPrompter};
