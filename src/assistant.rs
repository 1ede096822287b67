//! Assistant - the top-level voice process
//!
//! Builds every component from configuration, owns the memory store
//! lifecycle, and runs the conversation engine until interrupted.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{Config, SttChoice, TtsChoice};
use crate::conversation::{
    ConversationEngine, ConversationSettings, EngineParts, RandomPhrasebook,
};
use crate::dispatch::{
    AgentBackend, GeminiBackend, InteractionJournal, ResponseBackend, ResponseDispatcher,
};
use crate::memory::{MemoryStore, SharedMemory};
use crate::voice::{
    AudioPlayback, EspeakSynthesizer, Microphone, Speaker, SpeechRecognizer, SpeechSynthesizer,
    SpeechToText, TextToSpeech, Transcriber, WakeWordSet,
};
use crate::{Error, Result};

/// How often unsaved memory is written to disk
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(60);

/// How long the journal gets to drain at shutdown
const JOURNAL_DRAIN: Duration = Duration::from_secs(2);

/// Default `OpenAI` voice
const OPENAI_VOICE: &str = "nova";

/// Default `ElevenLabs` voice ("Rachel")
const ELEVENLABS_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

/// The voice assistant process
pub struct Assistant {
    config: Config,
}

impl Assistant {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run until interrupted, then speak a farewell
    ///
    /// # Errors
    ///
    /// Returns error if the microphone or speech recognition is unavailable
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let config = self.config;

        let memory = MemoryStore::load(config.memory_path()).shared();
        let (journal, journal_task) = InteractionJournal::spawn(config.journal_path());

        let dispatcher = build_dispatcher(&config)?
            .with_memory(memory.clone())
            .with_journal(journal);
        let backends: Vec<&str> = dispatcher.backend_names().collect();
        tracing::info!(?backends, "response backends ready");

        let parts = EngineParts {
            wake_words: WakeWordSet::new(config.wake.phrases.clone())?,
            input: Box::new(Microphone::new(&config.listen)?),
            transcriber: Transcriber::new(build_recognizer(&config)?),
            speaker: build_speaker(&config),
            dispatcher,
            phrasebook: Box::new(RandomPhrasebook::new(&config.conversation.assistant_name)),
        };
        let mut engine = ConversationEngine::new(parts, ConversationSettings::from_config(&config));

        let checkpoint = tokio::spawn(checkpoint_memory(memory.clone()));

        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for interrupt");
                std::future::pending::<()>().await;
            }
        };
        engine.run_until(config.listen.calibration, interrupt).await;

        checkpoint.abort();
        save_memory(&memory);

        // Dropping the engine closes the journal queue
        drop(engine);
        if tokio::time::timeout(JOURNAL_DRAIN, journal_task).await.is_err() {
            tracing::debug!("interaction journal did not drain in time");
        }

        Ok(())
    }
}

/// Build the dispatcher: fast path first when enabled and keyed, agent last
///
/// # Errors
///
/// Returns error if an HTTP client cannot be built
pub fn build_dispatcher(config: &Config) -> Result<ResponseDispatcher> {
    let mut backends: Vec<Box<dyn ResponseBackend>> = Vec::new();

    match (&config.api_keys.gemini, config.fast.enabled) {
        (Some(key), true) => {
            let key = SecretString::from(key.expose_secret().to_string());
            backends.push(Box::new(GeminiBackend::new(
                key,
                &config.fast,
                &config.conversation.assistant_name,
            )?));
            tracing::info!(model = %config.fast.model, "fast path enabled");
        }
        (None, true) => tracing::warn!("fast path unavailable (no API key), using agent only"),
        (_, false) => tracing::info!("fast path disabled"),
    }

    backends.push(Box::new(AgentBackend::new(&config.agent)));

    Ok(ResponseDispatcher::new(backends)
        .with_history(config.history.capacity, config.history.context_window))
}

/// Build the configured speech recognizer
///
/// # Errors
///
/// Returns error if the recognizer's API key is missing
pub fn build_recognizer(config: &Config) -> Result<Box<dyn SpeechRecognizer>> {
    let stt = &config.stt;
    let recognizer = match stt.provider {
        SttChoice::Whisper => {
            let key = config.api_keys.openai.as_ref().ok_or_else(|| {
                Error::Config("speech recognition needs OPENAI_API_KEY".to_string())
            })?;
            SpeechToText::new_whisper(
                key.expose_secret().to_string(),
                stt.model.clone().unwrap_or_else(|| "whisper-1".to_string()),
                stt.timeout,
            )?
        }
        SttChoice::Deepgram => {
            let key = config.api_keys.deepgram.as_ref().ok_or_else(|| {
                Error::Config("speech recognition needs DEEPGRAM_API_KEY".to_string())
            })?;
            SpeechToText::new_deepgram(
                key.expose_secret().to_string(),
                stt.model.clone().unwrap_or_else(|| "nova-2".to_string()),
                stt.timeout,
            )?
        }
    };
    Ok(Box::new(recognizer))
}

/// Build the configured synthesizer
///
/// `Ok(None)` means speech is muted.
///
/// # Errors
///
/// Returns error if the chosen provider cannot be set up
pub fn build_synthesizer(config: &Config) -> Result<Option<Box<dyn SpeechSynthesizer>>> {
    let speech = &config.speech;
    let timeout = speech.playback_timeout;

    let choice = match speech.provider {
        TtsChoice::Auto if config.api_keys.openai.is_some() => TtsChoice::OpenAi,
        TtsChoice::Auto => TtsChoice::Espeak,
        other => other,
    };

    let synthesizer: Box<dyn SpeechSynthesizer> = match choice {
        TtsChoice::Muted => return Ok(None),
        TtsChoice::OpenAi => {
            let key = config
                .api_keys
                .openai
                .as_ref()
                .ok_or_else(|| Error::Config("OpenAI speech needs OPENAI_API_KEY".to_string()))?;
            Box::new(TextToSpeech::new_openai(
                key.expose_secret().to_string(),
                speech.voice.clone().unwrap_or_else(|| OPENAI_VOICE.to_string()),
                speech.speed,
                speech.model.clone().unwrap_or_else(|| "tts-1".to_string()),
                timeout,
            )?)
        }
        TtsChoice::ElevenLabs => {
            let key = config.api_keys.elevenlabs.as_ref().ok_or_else(|| {
                Error::Config("ElevenLabs speech needs ELEVENLABS_API_KEY".to_string())
            })?;
            Box::new(TextToSpeech::new_elevenlabs(
                key.expose_secret().to_string(),
                speech.voice.clone().unwrap_or_else(|| ELEVENLABS_VOICE.to_string()),
                speech
                    .model
                    .clone()
                    .unwrap_or_else(|| "eleven_turbo_v2".to_string()),
                timeout,
            )?)
        }
        TtsChoice::Espeak | TtsChoice::Auto => Box::new(EspeakSynthesizer::new(
            &speech.espeak_binary,
            speech.voice.clone(),
            timeout,
        )?),
    };

    tracing::info!(provider = ?choice, "speech synthesis ready");
    Ok(Some(synthesizer))
}

/// Build the speaker, muting it when synthesis or playback is unavailable
#[must_use]
pub fn build_speaker(config: &Config) -> Speaker {
    let limits = config.speech.limits;

    let synthesizer = match build_synthesizer(config) {
        Ok(Some(synthesizer)) => synthesizer,
        Ok(None) => {
            tracing::info!("speech muted");
            return Speaker::muted(limits);
        }
        Err(e) => {
            tracing::warn!(error = %e, "speech synthesis unavailable, replies will only be logged");
            return Speaker::muted(limits);
        }
    };

    match AudioPlayback::new() {
        Ok(playback) => Speaker::new(
            synthesizer,
            Box::new(playback),
            limits,
            config.speech.playback_timeout,
        ),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, replies will only be logged");
            Speaker::muted(limits)
        }
    }
}

async fn checkpoint_memory(memory: SharedMemory) {
    let mut interval = tokio::time::interval(CHECKPOINT_INTERVAL);
    interval.tick().await;
    loop {
        interval.tick().await;
        save_memory(&memory);
    }
}

/// Save the memory store, logging failures
pub fn save_memory(memory: &SharedMemory) {
    let Ok(mut store) = memory.write() else {
        tracing::warn!("memory store lock poisoned, not saving");
        return;
    };
    if let Err(e) = store.save() {
        tracing::warn!(path = %store.path().display(), error = %e, "failed to save memory");
    }
}
