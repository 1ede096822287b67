//! Wake word detection
//!
//! Matching is plain substring containment on the lowercased transcript, so
//! a phrase also fires inside longer words ("ok" in "broken").

use crate::{Error, Result};

/// A wake phrase found in a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    /// The configured phrase that matched
    pub phrase: String,
    /// Lowercased transcript text following the phrase, trimmed
    pub remainder: String,
}

/// Ordered, case-insensitive set of wake phrases
#[derive(Debug, Clone)]
pub struct WakeWordSet {
    phrases: Vec<String>,
}

impl WakeWordSet {
    /// Create a wake word set
    ///
    /// # Arguments
    ///
    /// * `phrases` - Phrases to detect (e.g., "hey friday"), in priority order
    ///
    /// # Errors
    ///
    /// Returns error if no non-empty phrase is given
    pub fn new(phrases: Vec<String>) -> Result<Self> {
        let mut normalized: Vec<String> = Vec::with_capacity(phrases.len());
        for phrase in phrases {
            let phrase = phrase.trim().to_lowercase();
            if !phrase.is_empty() && !normalized.contains(&phrase) {
                normalized.push(phrase);
            }
        }

        if normalized.is_empty() {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }

        tracing::debug!(wake_words = ?normalized, "wake word set initialized");
        Ok(Self { phrases: normalized })
    }

    /// Check if transcribed text contains any wake phrase
    #[must_use]
    pub fn is_wake(&self, transcript: &str) -> bool {
        let normalized = transcript.to_lowercase();
        self.phrases.iter().any(|p| normalized.contains(p.as_str()))
    }

    /// Find the first phrase (in set order) present in the transcript
    #[must_use]
    pub fn detect(&self, transcript: &str) -> Option<WakeMatch> {
        let normalized = transcript.to_lowercase();
        self.phrases.iter().find_map(|phrase| {
            normalized.find(phrase.as_str()).map(|pos| WakeMatch {
                phrase: phrase.clone(),
                remainder: remainder_after(&normalized, pos + phrase.len()),
            })
        })
    }

    /// Extract a command spoken in the same breath as the wake phrase
    ///
    /// Phrases are tried in order and the first remainder longer than
    /// `min_len` characters wins, so "hey friday play music" yields
    /// "play music" even when "friday" is listed first.
    #[must_use]
    pub fn inline_command(&self, transcript: &str, min_len: usize) -> Option<String> {
        let normalized = transcript.to_lowercase();
        self.phrases.iter().find_map(|phrase| {
            let pos = normalized.find(phrase.as_str())?;
            let remainder = remainder_after(&normalized, pos + phrase.len());
            (remainder.chars().count() > min_len).then_some(remainder)
        })
    }

    /// Get the configured wake phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }
}

fn remainder_after(text: &str, end: usize) -> String {
    text[end..]
        .trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == '.')
        .trim_end()
        .to_string()
}
