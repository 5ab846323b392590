//! Stream Interact - talk to a multimodal language model about your webcam
//!
//! This library provides the pieces of an interactive session:
//! - Rate-limited, retrying calls to a remote model (Gemini or `OpenAI`)
//! - Conversation history shared between detection and chat
//! - Streamed answers shown as they arrive and spoken sentence by sentence
//! - A menu / detect / chat mode loop with key-triggered detection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     Controller                        │
//! │   menu  │  detect (keys)  │  interactive chat         │
//! └──────┬──────────────┬─────────────────┬──────────────┘
//!        │ frames       │ calls           │ output
//! ┌──────▼─────┐ ┌──────▼─────────┐ ┌─────▼─────────────────┐
//! │   Camera   │ │  ModelClient    │ │ PresentationPipeline  │
//! │ (ffmpeg)   │ │ rate limit +    │ │ console + sentence    │
//! │            │ │ history adapter │ │ chunks → speech worker│
//! └────────────┘ └────────────────┘ └───────────────────────┘
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod interaction;
pub mod model;
pub mod present;
pub mod setup;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use interaction::{Controller, InteractionMode, Session};
pub use model::{
    ConversationHistory, ConversationTurn, HistoryAdapter, ModelBackend, ModelClient,
    RateLimitPolicy, RateLimitedCaller,
};
pub use present::{PresentationPipeline, SentenceChunker};
