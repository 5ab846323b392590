//! Interaction modes and key bindings

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Which part of the session is in control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionMode {
    Menu,
    Detect,
    DetectCustom,
    InteractiveChat,
    Quit,
}

impl InteractionMode {
    /// Names accepted at the menu prompt
    pub const CHOICES: [&'static str; 8] =
        ["detect", "detect_custom", "interact", "quit", "d", "dc", "i", "q"];

    #[must_use]
    pub const fn is_detect(self) -> bool {
        matches!(self, Self::Detect | Self::DetectCustom)
    }
}

impl FromStr for InteractionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "detect" | "d" => Ok(Self::Detect),
            "detect_custom" | "dc" => Ok(Self::DetectCustom),
            "interact" | "i" => Ok(Self::InteractiveChat),
            "quit" | "q" => Ok(Self::Quit),
            other => Err(Error::Config(format!("unknown mode: {other}"))),
        }
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Menu => "menu",
            Self::Detect => "detect",
            Self::DetectCustom => "detect_custom",
            Self::InteractiveChat => "interact",
            Self::Quit => "quit",
        };
        f.write_str(name)
    }
}

/// What a bound key does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Capture a frame batch and ask the model what it shows
    Detect,
    /// Type a base prompt for following detections
    SetCustomPrompt,
    SwitchToInteractive,
    SwitchToMenu,
    Quit,
}

/// A set of key handlers, fixed at construction
pub trait KeyBindable {
    fn handlers(&self) -> HashMap<char, Action>;
}

/// Keys active while the camera stream is in detect mode
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectBindings;

impl KeyBindable for DetectBindings {
    fn handlers(&self) -> HashMap<char, Action> {
        HashMap::from([
            ('d', Action::Detect),
            ('c', Action::SetCustomPrompt),
            ('i', Action::SwitchToInteractive),
            ('m', Action::SwitchToMenu),
            ('q', Action::Quit),
        ])
    }
}
