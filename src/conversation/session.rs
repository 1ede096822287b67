//! Conversation states and the per-wake session

use crate::voice::Transcript;

/// Exact phrases that end follow-up mode
const EXIT_PHRASES: &[&str] = &[
    "that's all",
    "thank you",
    "thanks",
    "goodbye",
    "bye",
    "go to sleep",
    "nevermind",
    "never mind",
    "no",
    "nothing",
    "nope",
    "stop listening",
    "stop",
];

/// Why a conversation session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user said an exit phrase
    Dismissed,
    /// Too many follow-up listens produced nothing
    RetriesExhausted,
}

/// Engine state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    /// Waiting, without limit, for a wake phrase
    IdleListening,
    /// A wake phrase was heard in this transcript
    WakeDetected { transcript: Transcript },
    /// The command came in the same breath as the wake phrase
    InlineCommand { command: String },
    /// Acknowledge, then listen for the command
    AwaitCommand,
    Dispatching { command: String },
    /// Reply or apology to speak
    SpeakingReply { text: String },
    /// Ask for more and listen without a wake phrase
    AwaitFollowup,
    Exit(ExitReason),
}

/// Follow-up retry budget of one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationSession {
    retries: u32,
    max_retries: u32,
}

impl ConversationSession {
    /// Start a session
    #[must_use]
    pub const fn new(max_retries: u32) -> Self {
        Self {
            retries: 0,
            max_retries,
        }
    }

    /// Count an unproductive follow-up listen
    ///
    /// Returns true once the retry budget is spent.
    pub fn record_miss(&mut self) -> bool {
        self.retries += 1;
        self.is_exhausted()
    }

    /// A command was heard; misses start over
    pub fn reset_retries(&mut self) {
        self.retries = 0;
    }

    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.retries >= self.max_retries
    }

    #[must_use]
    pub const fn retries(&self) -> u32 {
        self.retries
    }
}

/// Closed set of follow-up exit phrases, matched exactly
#[derive(Debug, Clone)]
pub struct ExitPhrases {
    phrases: Vec<String>,
}

impl Default for ExitPhrases {
    fn default() -> Self {
        Self {
            phrases: EXIT_PHRASES.iter().map(|p| (*p).to_string()).collect(),
        }
    }
}

impl ExitPhrases {
    /// True when the whole normalized transcript is an exit phrase
    ///
    /// "no" exits; "no thanks for nothing" does not.
    #[must_use]
    pub fn matches(&self, transcript: &Transcript) -> bool {
        let text = transcript.normalized();
        self.phrases.iter().any(|p| *p == text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_phrases_exact() {
        let exits = ExitPhrases::default();
        assert!(exits.matches(&Transcript::new("Thanks.")));
        assert!(exits.matches(&Transcript::new("  STOP ")));
        assert!(exits.matches(&Transcript::new("That's all!")));
        assert!(!exits.matches(&Transcript::new("no thanks for nothing")));
        assert!(!exits.matches(&Transcript::new("stop the music")));
    }

    #[test]
    fn test_retry_budget() {
        let mut session = ConversationSession::new(2);
        assert!(!session.record_miss());
        assert!(session.record_miss());
        assert!(session.is_exhausted());
    }

    #[test]
    fn test_reset_retries() {
        let mut session = ConversationSession::new(2);
        session.record_miss();
        session.reset_retries();
        assert_eq!(session.retries(), 0);
        assert!(!session.record_miss());
    }
}
