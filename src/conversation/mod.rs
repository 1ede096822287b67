//! Conversation engine
//!
//! The wake-word state machine. Listening, transcription, dispatch and
//! speech run strictly one after another; nothing here runs concurrently
//! and no single bad turn ends the loop.
//!
//! ```text
//! IdleListening -> WakeDetected -> InlineCommand | AwaitCommand
//!   -> Dispatching -> SpeakingReply -> AwaitFollowup
//!   -> Dispatching | Exit -> IdleListening
//! ```

mod phrasebook;
mod session;

use std::time::Duration;

pub use phrasebook::{Cue, Phrasebook, RandomPhrasebook};
pub use session::{ConversationSession, ExitPhrases, ExitReason, State};

use crate::config::Config;
use crate::dispatch::ResponseDispatcher;
use crate::voice::{AudioInput, Heard, Speaker, Transcriber, Transcript, WakeWordSet};

/// Timing and budgets for the engine
#[derive(Debug, Clone)]
pub struct ConversationSettings {
    /// Longest utterance captured while idle
    pub wake_phrase_limit: Duration,
    pub command_timeout: Duration,
    pub command_phrase_limit: Duration,
    pub followup_timeout: Duration,
    pub followup_phrase_limit: Duration,
    pub max_retries: u32,
    /// Inline commands must be longer than this many characters
    pub inline_min_chars: usize,
    /// Pause after an input device error before listening again
    pub device_retry_delay: Duration,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            wake_phrase_limit: Duration::from_secs(3),
            command_timeout: Duration::from_secs(6),
            command_phrase_limit: Duration::from_secs(15),
            followup_timeout: Duration::from_secs(8),
            followup_phrase_limit: Duration::from_secs(15),
            max_retries: 2,
            inline_min_chars: 3,
            device_retry_delay: Duration::from_secs(1),
        }
    }
}

impl ConversationSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            wake_phrase_limit: config.wake.phrase_limit,
            command_timeout: config.listen.command_timeout,
            command_phrase_limit: config.listen.command_phrase_limit,
            followup_timeout: config.listen.followup_timeout,
            followup_phrase_limit: config.listen.followup_phrase_limit,
            max_retries: config.conversation.max_retries,
            inline_min_chars: config.conversation.inline_min_chars,
            ..Self::default()
        }
    }
}

/// Capabilities the engine drives
pub struct EngineParts {
    pub wake_words: WakeWordSet,
    pub input: Box<dyn AudioInput>,
    pub transcriber: Transcriber,
    pub speaker: Speaker,
    pub dispatcher: ResponseDispatcher,
    pub phrasebook: Box<dyn Phrasebook>,
}

/// The wake-word / conversation state machine
pub struct ConversationEngine {
    wake_words: WakeWordSet,
    input: Box<dyn AudioInput>,
    transcriber: Transcriber,
    speaker: Speaker,
    dispatcher: ResponseDispatcher,
    phrasebook: Box<dyn Phrasebook>,
    exit_phrases: ExitPhrases,
    settings: ConversationSettings,
    session: Option<ConversationSession>,
}

impl ConversationEngine {
    /// Assemble an engine
    #[must_use]
    pub fn new(parts: EngineParts, settings: ConversationSettings) -> Self {
        Self {
            wake_words: parts.wake_words,
            input: parts.input,
            transcriber: parts.transcriber,
            speaker: parts.speaker,
            dispatcher: parts.dispatcher,
            phrasebook: parts.phrasebook,
            exit_phrases: ExitPhrases::default(),
            settings,
            session: None,
        }
    }

    /// Measure ambient noise before listening
    ///
    /// Failure is logged; the input keeps its previous threshold.
    pub async fn calibrate(&mut self, duration: Duration) {
        if let Err(e) = self.input.calibrate(duration).await {
            tracing::warn!(error = %e, "microphone calibration failed");
        }
    }

    /// Speak the startup greeting
    pub async fn greet(&mut self) {
        self.say(Cue::Online).await;
    }

    /// Speak the shutdown farewell and drop any session
    pub async fn shutdown(&mut self) {
        self.session = None;
        self.say(Cue::Shutdown).await;
    }

    /// Calibrate, greet and converse until `interrupt` resolves, then say goodbye
    ///
    /// The interrupt is honoured at any point, calibration and greeting included.
    pub async fn run_until(&mut self, calibration: Duration, interrupt: impl Future<Output = ()>) {
        tokio::select! {
            () = self.serve(calibration) => {}
            () = interrupt => tracing::info!("shutdown requested"),
        }
        self.shutdown().await;
    }

    async fn serve(&mut self, calibration: Duration) {
        self.calibrate(calibration).await;
        self.greet().await;
        tracing::info!(wake_words = ?self.wake_words.phrases(), "listening for wake phrase");
        self.run().await;
    }

    /// Listen and converse forever
    pub async fn run(&mut self) {
        loop {
            self.run_once().await;
        }
    }

    /// Run from idle until the engine is idle again
    ///
    /// Returns after one idle listen that heard no wake phrase, or after a
    /// whole conversation.
    pub async fn run_once(&mut self) {
        let mut state = State::IdleListening;
        loop {
            state = self.step(state).await;
            if state == State::IdleListening {
                break;
            }
        }
    }

    /// Perform one state's work and return the next state
    pub async fn step(&mut self, state: State) -> State {
        match state {
            State::IdleListening => {
                let limit = self.settings.wake_phrase_limit;
                match self.hear(None, limit).await {
                    Some(transcript) if self.wake_words.is_wake(&transcript.text) => {
                        tracing::info!(transcript = %transcript.text, "wake phrase detected");
                        State::WakeDetected { transcript }
                    }
                    Some(transcript) => {
                        tracing::debug!(transcript = %transcript.text, "no wake phrase");
                        State::IdleListening
                    }
                    None => State::IdleListening,
                }
            }

            State::WakeDetected { transcript } => {
                let inline = self
                    .wake_words
                    .inline_command(&transcript.text, self.settings.inline_min_chars);
                self.session = Some(ConversationSession::new(self.settings.max_retries));
                match inline {
                    Some(command) => State::InlineCommand { command },
                    None => State::AwaitCommand,
                }
            }

            State::InlineCommand { command } => {
                tracing::info!(command = %command, "inline command");
                State::Dispatching { command }
            }

            State::AwaitCommand => {
                self.say(Cue::Acknowledge).await;
                let (timeout, limit) = (
                    self.settings.command_timeout,
                    self.settings.command_phrase_limit,
                );
                if let Some(transcript) = self.hear(Some(timeout), limit).await {
                    tracing::info!(command = %transcript.text, "command");
                    State::Dispatching {
                        command: transcript.text,
                    }
                } else {
                    tracing::info!("no command heard");
                    self.say(Cue::NotHeard).await;
                    self.session = None;
                    State::IdleListening
                }
            }

            State::Dispatching { command } => {
                let result = self.dispatcher.dispatch(&command).await;
                let text = if result.ok {
                    result.text
                } else {
                    self.phrasebook.phrase(Cue::Apology)
                };
                State::SpeakingReply { text }
            }

            State::SpeakingReply { text } => {
                self.speaker.speak(&text).await;
                State::AwaitFollowup
            }

            State::AwaitFollowup => self.await_followup().await,

            State::Exit(reason) => {
                tracing::info!(?reason, "conversation ended");
                let cue = match reason {
                    ExitReason::Dismissed => Cue::Farewell,
                    ExitReason::RetriesExhausted => Cue::StandBy,
                };
                self.say(cue).await;
                self.session = None;
                State::IdleListening
            }
        }
    }

    /// Active session, if a conversation is under way
    #[must_use]
    pub const fn session(&self) -> Option<&ConversationSession> {
        self.session.as_ref()
    }

    /// Dispatcher, for inspecting history
    #[must_use]
    pub const fn dispatcher(&self) -> &ResponseDispatcher {
        &self.dispatcher
    }

    async fn await_followup(&mut self) -> State {
        self.say(Cue::FollowUp).await;

        let (timeout, limit) = (
            self.settings.followup_timeout,
            self.settings.followup_phrase_limit,
        );
        let heard = self.hear(Some(timeout), limit).await;

        let max_retries = self.settings.max_retries;
        let session = self
            .session
            .get_or_insert_with(|| ConversationSession::new(max_retries));

        match heard {
            Some(transcript) if self.exit_phrases.matches(&transcript) => {
                State::Exit(ExitReason::Dismissed)
            }
            Some(transcript) => {
                session.reset_retries();
                tracing::info!(command = %transcript.text, "follow-up command");
                State::Dispatching {
                    command: transcript.text,
                }
            }
            None => {
                if session.record_miss() {
                    State::Exit(ExitReason::RetriesExhausted)
                } else {
                    tracing::debug!(retries = session.retries(), "nothing heard, asking again");
                    State::AwaitFollowup
                }
            }
        }
    }

    /// Listen once and transcribe; every miss collapses to `None`
    async fn hear(&mut self, timeout: Option<Duration>, phrase_limit: Duration) -> Option<Transcript> {
        match self.input.listen(timeout, phrase_limit).await {
            Ok(Heard::Speech(sample)) => self.transcriber.transcribe(&sample).await.into_transcript(),
            Ok(Heard::Timeout) => None,
            Err(e) => {
                tracing::warn!(error = %e, "input device error");
                tokio::time::sleep(self.settings.device_retry_delay).await;
                None
            }
        }
    }

    async fn say(&mut self, cue: Cue) {
        let phrase = self.phrasebook.phrase(cue);
        self.speaker.speak(&phrase).await;
    }
}
