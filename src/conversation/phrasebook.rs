//! What the assistant says outside of replies

use rand::seq::SliceRandom;

/// Situations that call for a stock phrase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cue {
    /// Startup greeting
    Online,
    /// Wake phrase heard without a command
    Acknowledge,
    /// No command after the acknowledgment
    NotHeard,
    /// Prompt at the start of each follow-up listen
    FollowUp,
    /// The user ended the conversation
    Farewell,
    /// Follow-up retries ran out
    StandBy,
    /// Every backend failed
    Apology,
    /// Process interrupted
    Shutdown,
}

/// Source of stock phrases
pub trait Phrasebook {
    fn phrase(&self, cue: Cue) -> String;
}

/// Picks a random variant for each cue
#[derive(Debug, Clone)]
pub struct RandomPhrasebook {
    name: String,
}

impl RandomPhrasebook {
    /// Create a phrasebook for an assistant called `name`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn variants(cue: Cue) -> &'static [&'static str] {
        match cue {
            Cue::Online => &["{name} online. Say my name when you need me."],
            Cue::Acknowledge => &["Yes sir?", "Yes?", "I'm listening.", "How can I help?"],
            Cue::NotHeard => &["I didn't catch that.", "Sorry, I didn't hear anything."],
            Cue::FollowUp => &["Anything else?", "Anything more?"],
            Cue::Farewell => &[
                "Alright. Just say my name if you need me.",
                "Okay. I'm here if you need me.",
            ],
            Cue::StandBy => &["I'll be here when you need me."],
            Cue::Apology => &[
                "Sorry, I couldn't get an answer to that.",
                "Sorry, something went wrong on my end.",
            ],
            Cue::Shutdown => &["Goodbye!"],
        }
    }
}

impl Phrasebook for RandomPhrasebook {
    fn phrase(&self, cue: Cue) -> String {
        let template = Self::variants(cue)
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or_default();
        template.replace("{name}", &self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_uses_name() {
        let book = RandomPhrasebook::new("Jarvis");
        assert_eq!(
            book.phrase(Cue::Online),
            "Jarvis online. Say my name when you need me."
        );
    }

    #[test]
    fn test_every_cue_has_a_phrase() {
        let book = RandomPhrasebook::new("Friday");
        for cue in [
            Cue::Online,
            Cue::Acknowledge,
            Cue::NotHeard,
            Cue::FollowUp,
            Cue::Farewell,
            Cue::StandBy,
            Cue::Apology,
            Cue::Shutdown,
        ] {
            assert!(!book.phrase(cue).is_empty());
        }
    }
}
