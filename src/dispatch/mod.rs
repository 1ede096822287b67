//! Response dispatch
//!
//! Commands go to an ordered list of backends: the fast remote model first
//! when a key was found, then the local agent. The first non-empty reply
//! wins. Every dispatch is recorded in a short-term history whose answered
//! turns are offered to backends as conversational context.

pub mod agent;
pub mod gemini;
pub mod journal;
pub mod scrape;

use std::collections::VecDeque;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::Local;
use regex::Regex;
use serde::Serialize;

pub use agent::AgentBackend;
pub use gemini::GeminiBackend;
pub use journal::{InteractionJournal, InteractionRecord};
pub use scrape::AgentOutputCleaner;

use crate::Result;
use crate::memory::{SharedMemory, UserProfile};
use crate::voice::display_excerpt;

/// Characters of a reply shown in logs
const DISPLAY_CHARS: usize = 300;

/// Facts from memory offered to backends
const MEMORY_FACTS: usize = 3;

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[[^\]]*\]\]").expect("valid directive regex"));

/// Which kind of backend produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplySource {
    /// Direct remote language-model call
    Fast,
    /// Local agent process
    Fallback,
}

/// Outcome of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    /// Normalized reply; empty when every backend failed
    pub text: String,
    /// Backend kind that answered
    pub source: Option<ReplySource>,
    pub ok: bool,
}

impl DispatchResult {
    fn failed() -> Self {
        Self {
            text: String::new(),
            source: None,
            ok: false,
        }
    }
}

/// One dispatched command and what came of it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub command: String,
    /// `None` when no backend answered
    pub response: Option<String>,
    /// The agent handled it and may have acted on it
    pub action_taken: bool,
}

/// What the user has told the assistant about themselves
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    pub profile: UserProfile,
    pub facts: Vec<String>,
}

/// Everything a backend gets for one command
#[derive(Debug, Clone, Copy)]
pub struct ReplyRequest<'a> {
    pub command: &'a str,
    /// Answered turns, oldest first, capped at the context window
    pub recent_turns: &'a [ConversationTurn],
    pub memory: Option<&'a MemoryContext>,
}

/// A way of answering a command
#[async_trait]
pub trait ResponseBackend: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Kind reported in the dispatch result
    fn source(&self) -> ReplySource;

    /// Produce raw reply text
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot answer
    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String>;
}

/// Tries backends in order and keeps short-term history
pub struct ResponseDispatcher {
    backends: Vec<Box<dyn ResponseBackend>>,
    history: VecDeque<ConversationTurn>,
    capacity: usize,
    context_window: usize,
    memory: Option<SharedMemory>,
    journal: Option<InteractionJournal>,
}

impl ResponseDispatcher {
    /// Create a dispatcher over backends in priority order
    #[must_use]
    pub fn new(backends: Vec<Box<dyn ResponseBackend>>) -> Self {
        Self {
            backends,
            history: VecDeque::new(),
            capacity: 20,
            context_window: 6,
            memory: None,
            journal: None,
        }
    }

    /// Set history size and the number of turns sent as context
    #[must_use]
    pub fn with_history(mut self, capacity: usize, context_window: usize) -> Self {
        self.capacity = capacity.max(1);
        self.context_window = context_window;
        self
    }

    /// Read the user profile and facts from a memory store
    #[must_use]
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Journal every dispatch
    #[must_use]
    pub fn with_journal(mut self, journal: InteractionJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Names of the configured backends, in order
    pub fn backend_names(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| b.name())
    }

    /// Answer a command
    ///
    /// Never fails: when every backend fails the result has `ok == false`.
    pub async fn dispatch(&mut self, command: &str) -> DispatchResult {
        let recent_turns = self.context_turns();
        let memory = self.memory_context();
        let request = ReplyRequest {
            command,
            recent_turns: &recent_turns,
            memory: memory.as_ref(),
        };

        let mut result = DispatchResult::failed();
        for backend in &self.backends {
            match backend.reply(&request).await {
                Ok(raw) => {
                    let text = normalize_reply(&raw);
                    if text.is_empty() {
                        tracing::warn!(backend = backend.name(), "backend returned an empty reply");
                        continue;
                    }
                    tracing::info!(
                        backend = backend.name(),
                        source = ?backend.source(),
                        reply = %display_excerpt(&text, DISPLAY_CHARS),
                        "reply"
                    );
                    result = DispatchResult {
                        text,
                        source: Some(backend.source()),
                        ok: true,
                    };
                    break;
                }
                Err(e) => {
                    tracing::warn!(backend = backend.name(), error = %e, "backend failed");
                }
            }
        }

        if !result.ok {
            tracing::warn!(command, "no backend produced a reply");
        }

        self.record(command, &result);
        result
    }

    /// Short-term history, oldest first
    #[must_use]
    pub const fn history(&self) -> &VecDeque<ConversationTurn> {
        &self.history
    }

    fn context_turns(&self) -> Vec<ConversationTurn> {
        let answered: Vec<&ConversationTurn> = self
            .history
            .iter()
            .filter(|t| t.response.is_some())
            .collect();
        let start = answered.len().saturating_sub(self.context_window);
        answered[start..].iter().map(|t| (*t).clone()).collect()
    }

    fn memory_context(&self) -> Option<MemoryContext> {
        let memory = self.memory.as_ref()?;
        let Ok(store) = memory.read() else {
            tracing::debug!("memory store lock poisoned");
            return None;
        };
        Some(MemoryContext {
            profile: store.profile().clone(),
            facts: store
                .recent_facts(MEMORY_FACTS)
                .iter()
                .map(|f| f.fact.clone())
                .collect(),
        })
    }

    fn record(&mut self, command: &str, result: &DispatchResult) {
        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(ConversationTurn {
            command: command.to_string(),
            response: result.ok.then(|| result.text.clone()),
            action_taken: result.source == Some(ReplySource::Fallback),
        });

        if let Some(memory) = &self.memory
            && let Ok(mut store) = memory.write()
        {
            store.touch();
        }

        if let Some(journal) = &self.journal {
            journal.record(InteractionRecord {
                at: Local::now(),
                command: command.to_string(),
                response: result.ok.then(|| result.text.clone()),
                source: result.source,
                ok: result.ok,
            });
        }
    }
}

/// Strip out-of-band `[[...]]` directives and surrounding whitespace
#[must_use]
pub fn normalize_reply(text: &str) -> String {
    DIRECTIVE_RE.replace_all(text, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Error;
    use crate::memory::MemoryStore;

    struct Fixed {
        source: ReplySource,
        reply: Option<&'static str>,
        calls: AtomicUsize,
        seen: Mutex<Vec<usize>>,
    }

    impl Fixed {
        fn new(source: ReplySource, reply: Option<&'static str>) -> Self {
            Self {
                source,
                reply,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResponseBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn source(&self) -> ReplySource {
            self.source
        }

        async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.recent_turns.len());
            self.reply
                .map(str::to_string)
                .ok_or_else(|| Error::Agent("down".to_string()))
        }
    }

    #[test]
    fn test_normalize_reply() {
        assert_eq!(normalize_reply("  [[tts:warm]] Hello [[x]] "), "Hello");
        assert_eq!(normalize_reply("[[only]]"), "");
    }

    #[tokio::test]
    async fn test_first_backend_wins() {
        let mut dispatcher = ResponseDispatcher::new(vec![
            Box::new(Fixed::new(ReplySource::Fast, Some("fast"))),
            Box::new(Fixed::new(ReplySource::Fallback, Some("slow"))),
        ]);
        let result = dispatcher.dispatch("hi").await;
        assert_eq!(result.text, "fast");
        assert_eq!(result.source, Some(ReplySource::Fast));
        assert!(!dispatcher.history()[0].action_taken);
    }

    #[tokio::test]
    async fn test_empty_reply_falls_through() {
        let mut dispatcher = ResponseDispatcher::new(vec![
            Box::new(Fixed::new(ReplySource::Fast, Some("[[tts]]  "))),
            Box::new(Fixed::new(ReplySource::Fallback, Some("slow"))),
        ]);
        let result = dispatcher.dispatch("hi").await;
        assert_eq!(result.source, Some(ReplySource::Fallback));
        assert!(dispatcher.history()[0].action_taken);
    }

    #[tokio::test]
    async fn test_all_failed_recorded_without_response() {
        let mut dispatcher =
            ResponseDispatcher::new(vec![Box::new(Fixed::new(ReplySource::Fallback, None))]);
        let result = dispatcher.dispatch("hi").await;
        assert!(!result.ok);
        assert!(result.text.is_empty());
        assert_eq!(dispatcher.history()[0].response, None);
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let mut dispatcher =
            ResponseDispatcher::new(vec![Box::new(Fixed::new(ReplySource::Fast, Some("ok")))])
                .with_history(3, 2);
        for i in 0..5 {
            dispatcher.dispatch(&format!("command {i}")).await;
        }
        let commands: Vec<&str> = dispatcher.history().iter().map(|t| t.command.as_str()).collect();
        assert_eq!(commands, vec!["command 2", "command 3", "command 4"]);
    }

    #[tokio::test]
    async fn test_context_window_counts_answered_turns_only() {
        let mut dispatcher = ResponseDispatcher::new(vec![
            Box::new(Fixed::new(ReplySource::Fast, Some("ok"))),
        ])
        .with_history(10, 2);

        for _ in 0..4 {
            dispatcher.dispatch("again").await;
        }
        dispatcher.history.push_back(ConversationTurn {
            command: "failed".to_string(),
            response: None,
            action_taken: false,
        });

        assert_eq!(dispatcher.context_turns().len(), 2);
        assert!(dispatcher.context_turns().iter().all(|t| t.response.is_some()));
    }

    #[tokio::test]
    async fn test_memory_touched_and_offered() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MemoryStore::load(dir.path().join("memory.json"));
        store.remember("prefers metric units");
        let memory = store.shared();

        let mut dispatcher =
            ResponseDispatcher::new(vec![Box::new(Fixed::new(ReplySource::Fast, Some("ok")))])
                .with_memory(memory.clone());

        assert_eq!(
            dispatcher.memory_context().unwrap().facts,
            vec!["prefers metric units"]
        );
        dispatcher.dispatch("hi").await;
        assert!(memory.read().unwrap().last_interaction().is_some());
    }
}
