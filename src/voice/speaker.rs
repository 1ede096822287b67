//! Spoken output
//!
//! Cleans reply text for speech, enforces the spoken length limit and plays
//! the result synchronously. Failures are logged and swallowed.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use super::playback::AudioOutput;
use super::tts::SpeechSynthesizer;

/// Appended when text is shortened for speech
pub const SHORTENED_DISCLAIMER: &str = " That's the short version.";

static DIRECTIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[.*?\]\]").expect("valid directive regex"));

static STAGE_DIRECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\[\]]*\]").expect("valid stage direction regex"));

/// Spoken length limits, in characters
#[derive(Debug, Clone, Copy)]
pub struct SpeechLimits {
    /// Longest text ever spoken, disclaimer included
    pub max_chars: usize,
    /// A sentence boundary must lie beyond this to be used for truncation
    pub min_sentence_chars: usize,
}

impl Default for SpeechLimits {
    fn default() -> Self {
        Self {
            max_chars: 300,
            min_sentence_chars: 150,
        }
    }
}

/// Prepare reply text for speech
///
/// Returns `None` when nothing speakable remains.
#[must_use]
pub fn prepare_speech(text: &str, limits: SpeechLimits) -> Option<String> {
    let text = DIRECTIVE_RE.replace_all(text, "");
    let text = STAGE_DIRECTION_RE.replace_all(&text, "");
    let text: String = text
        .chars()
        .filter(|c| !matches!(c, '*' | '#' | '`' | '_'))
        .collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() {
        return None;
    }

    if text.chars().count() <= limits.max_chars {
        return Some(text);
    }

    let disclaimer = SHORTENED_DISCLAIMER.chars().count();
    if limits.max_chars <= disclaimer {
        // No room for the notice
        let head: String = text.chars().take(limits.max_chars).collect();
        return Some(head.trim_end().to_string()).filter(|t| !t.is_empty());
    }

    let budget = limits.max_chars - disclaimer;
    let head: Vec<char> = text.chars().take(budget).collect();

    let boundary = head
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'))
        .filter(|&i| i > limits.min_sentence_chars);

    let kept: String = match boundary {
        Some(i) => head[..=i].iter().collect(),
        None => head.iter().collect::<String>().trim_end().to_string(),
    };

    Some(format!("{kept}{SHORTENED_DISCLAIMER}").trim_start().to_string())
}

/// Short on-screen excerpt of a reply
#[must_use]
pub fn display_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Synthesizes and plays speech, one utterance at a time
pub struct Speaker {
    voice: Option<(Box<dyn SpeechSynthesizer>, Box<dyn AudioOutput>)>,
    limits: SpeechLimits,
    playback_timeout: Duration,
}

impl Speaker {
    /// Create a speaker from a synthesizer and an output device
    #[must_use]
    pub fn new(
        synthesizer: Box<dyn SpeechSynthesizer>,
        output: Box<dyn AudioOutput>,
        limits: SpeechLimits,
        playback_timeout: Duration,
    ) -> Self {
        Self {
            voice: Some((synthesizer, output)),
            limits,
            playback_timeout,
        }
    }

    /// A speaker that only logs what it would say
    #[must_use]
    pub const fn muted(limits: SpeechLimits) -> Self {
        Self {
            voice: None,
            limits,
            playback_timeout: Duration::ZERO,
        }
    }

    /// Speak text, blocking until playback ends
    ///
    /// Returns true if audio was played.
    pub async fn speak(&mut self, text: &str) -> bool {
        let Some(prepared) = prepare_speech(text, self.limits) else {
            return false;
        };

        let Some((synthesizer, output)) = self.voice.as_mut() else {
            tracing::info!(text = %prepared, "speech muted");
            return false;
        };

        tracing::debug!(text = %prepared, "speaking");

        let attempt = async {
            let audio = synthesizer.synthesize(&prepared).await?;
            output.play(&audio).await
        };

        match tokio::time::timeout(self.playback_timeout, attempt).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "speech playback failed");
                false
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.playback_timeout, "speech playback timed out");
                false
            }
        }
    }

    /// Spoken length limits in use
    #[must_use]
    pub const fn limits(&self) -> SpeechLimits {
        self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SpeechLimits {
        SpeechLimits::default()
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(
            prepare_speech("It is 3 PM.", limits()),
            Some("It is 3 PM.".to_string())
        );
    }

    #[test]
    fn test_empty_text_is_none() {
        assert_eq!(prepare_speech("", limits()), None);
        assert_eq!(prepare_speech("[[tts:calm]] **", limits()), None);
    }

    #[test]
    fn test_markup_removed() {
        assert_eq!(
            prepare_speech("**Sure!** [smiles] Here's `code` [[tts:fast]]done", limits()),
            Some("Sure! Here's code done".to_string())
        );
    }

    #[test]
    fn test_truncates_at_sentence_boundary() {
        let first = "a".repeat(199);
        let text = format!("{first}. {}", "b".repeat(300));
        let spoken = prepare_speech(&text, limits()).unwrap();

        assert!(spoken.chars().count() <= 300);
        assert_eq!(spoken, format!("{first}.{SHORTENED_DISCLAIMER}"));
    }

    #[test]
    fn test_hard_truncates_without_late_boundary() {
        let text = format!("Hi. {}", "c".repeat(400));
        let spoken = prepare_speech(&text, limits()).unwrap();

        assert_eq!(spoken.chars().count(), 300);
        assert!(spoken.starts_with("Hi. ccc"));
        assert!(spoken.ends_with(SHORTENED_DISCLAIMER));
    }

    #[test]
    fn test_limit_holds_for_multibyte_text() {
        let text = "é".repeat(500);
        let spoken = prepare_speech(&text, limits()).unwrap();
        assert!(spoken.chars().count() <= 300);
    }

    #[test]
    fn test_tiny_limit_never_exceeded() {
        let tiny = SpeechLimits {
            max_chars: 20,
            min_sentence_chars: 10,
        };
        let spoken = prepare_speech(&"word ".repeat(20), tiny).unwrap();

        assert!(spoken.chars().count() <= 20);
        assert_eq!(spoken, "word word word word");
    }

    #[test]
    fn test_snug_limit_keeps_one_character() {
        let snug = SpeechLimits {
            max_chars: SHORTENED_DISCLAIMER.chars().count() + 1,
            min_sentence_chars: 0,
        };
        let spoken = prepare_speech(&"x".repeat(120), snug).unwrap();

        assert_eq!(spoken, format!("x{SHORTENED_DISCLAIMER}"));
        assert_eq!(spoken.chars().count(), snug.max_chars);
    }

    #[test]
    fn test_display_excerpt() {
        assert_eq!(display_excerpt("short", 300), "short");
        let long = "x".repeat(301);
        assert_eq!(display_excerpt(&long, 300).chars().count(), 303);
    }

    #[tokio::test]
    async fn test_muted_speaker_plays_nothing() {
        let mut speaker = Speaker::muted(limits());
        assert!(!speaker.speak("hello").await);
    }
}
