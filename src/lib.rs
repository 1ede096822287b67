//! voicewake - a wake-word voice assistant
//!
//! Listens for a wake phrase, captures a spoken command, answers it through
//! a fast remote language model or a slower local agent, speaks the reply and
//! holds a short follow-up conversation before going back to listening.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Audio front end                     │
//! │   Microphone  │  Utterance detection  │  Playback   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Conversation engine                   │
//! │   Wake phrase  │  STT  │  Follow-up  │  Speaker     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Response dispatcher                   │
//! │   Gemini (fast)  │  Local agent (fallback)          │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod memory;
pub mod voice;

pub use assistant::Assistant;
pub use config::Config;
pub use conversation::{ConversationEngine, Cue, Phrasebook, State};
pub use dispatch::{DispatchResult, ReplySource, ResponseBackend, ResponseDispatcher};
pub use error::{Error, Result};
pub use memory::{MemoryStore, SharedMemory};
