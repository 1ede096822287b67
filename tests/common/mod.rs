//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, recognizer, synthesizer and
//! backends so the conversation engine runs without audio hardware.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use voicewake::conversation::{ConversationSettings, Cue, EngineParts, Phrasebook};
use voicewake::dispatch::ReplyRequest;
use voicewake::voice::{
    AudioFormat, AudioInput, AudioOutput, AudioSample, Heard, SAMPLE_RATE, Speaker,
    SpeechLimits, SpeechRecognizer, SpeechSynthesizer, SynthesizedAudio, Transcriber,
    WakeWordSet,
};
use voicewake::{ConversationEngine, Error, ReplySource, ResponseBackend, ResponseDispatcher, Result};

/// One turn of what the user "does" at the microphone
#[derive(Debug, Clone)]
pub enum Utterance {
    /// Speech that transcribes to this text
    Say(&'static str),
    /// Nothing before the timeout
    Silence,
    /// Speech the recognizer cannot make out
    Mumble,
    /// Speech the recognition service fails on
    ServiceDown,
    /// The input device fails
    DeviceError,
}

type Transcripts = Arc<Mutex<VecDeque<Result<String>>>>;

/// Pause before an exhausted script reports a timeout
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Microphone that replays a script, then times out forever
pub struct ScriptedInput {
    script: VecDeque<Utterance>,
    transcripts: Transcripts,
    calibration: Duration,
}

#[async_trait(?Send)]
impl AudioInput for ScriptedInput {
    async fn calibrate(&mut self, _duration: Duration) -> Result<f32> {
        tokio::time::sleep(self.calibration).await;
        Ok(0.01)
    }

    async fn listen(&mut self, _timeout: Option<Duration>, _phrase_limit: Duration) -> Result<Heard> {
        let transcript = match self.script.pop_front() {
            None => {
                tokio::time::sleep(IDLE_POLL).await;
                return Ok(Heard::Timeout);
            }
            Some(Utterance::Silence) => return Ok(Heard::Timeout),
            Some(Utterance::DeviceError) => {
                return Err(Error::Audio("device unplugged".to_string()));
            }
            Some(Utterance::Say(text)) => Ok(text.to_string()),
            Some(Utterance::Mumble) => Ok(String::new()),
            Some(Utterance::ServiceDown) => Err(Error::Stt("503 unavailable".to_string())),
        };
        self.transcripts.lock().unwrap().push_back(transcript);
        Ok(Heard::Speech(AudioSample::new(vec![0.1; 1600], SAMPLE_RATE)))
    }
}

/// Recognizer fed by `ScriptedInput`
pub struct ScriptedRecognizer {
    transcripts: Transcripts,
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(&self, _wav: &[u8]) -> Result<String> {
        self.transcripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Synthesizer that records everything it is asked to say
pub struct RecordingSynth {
    spoken: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl SpeechSynthesizer for RecordingSynth {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(SynthesizedAudio {
            bytes: Vec::new(),
            format: AudioFormat::Wav,
        })
    }
}

/// Output device that plays nothing
pub struct NullOutput;

#[async_trait(?Send)]
impl AudioOutput for NullOutput {
    async fn play(&mut self, _audio: &SynthesizedAudio) -> Result<()> {
        Ok(())
    }
}

/// Phrasebook that speaks the cue's name, e.g. "Acknowledge"
pub struct CuePhrasebook;

impl Phrasebook for CuePhrasebook {
    fn phrase(&self, cue: Cue) -> String {
        format!("{cue:?}")
    }
}

/// Backend with a fixed answer that records the commands it saw
pub struct ScriptedBackend {
    source: ReplySource,
    reply: Option<&'static str>,
    commands: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn answering(reply: &'static str) -> Self {
        Self::new(ReplySource::Fast, Some(reply))
    }

    pub fn failing() -> Self {
        Self::new(ReplySource::Fast, None)
    }

    pub fn new(source: ReplySource, reply: Option<&'static str>) -> Self {
        Self {
            source,
            reply,
            commands: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn commands(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.commands)
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ResponseBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn source(&self) -> ReplySource {
        self.source
    }

    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.commands.lock().unwrap().push(request.command.to_string());
        self.reply
            .map(str::to_string)
            .ok_or_else(|| Error::Agent("backend down".to_string()))
    }
}

/// An engine wired to scripted parts
pub struct Harness {
    pub engine: ConversationEngine,
    pub spoken: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    /// Build an engine that hears `script` and answers with `backend`
    pub fn new(script: Vec<Utterance>, backend: ScriptedBackend) -> Self {
        Self::with_calibration(script, backend, Duration::ZERO)
    }

    /// Like `new`, with ambient calibration taking `calibration`
    pub fn with_calibration(
        script: Vec<Utterance>,
        backend: ScriptedBackend,
        calibration: Duration,
    ) -> Self {
        let transcripts: Transcripts = Arc::new(Mutex::new(VecDeque::new()));
        let spoken = Arc::new(Mutex::new(Vec::new()));

        let parts = EngineParts {
            wake_words: WakeWordSet::new(vec!["hey friday".to_string(), "friday".to_string()])
                .unwrap(),
            input: Box::new(ScriptedInput {
                script: script.into(),
                transcripts: Arc::clone(&transcripts),
                calibration,
            }),
            transcriber: Transcriber::new(Box::new(ScriptedRecognizer { transcripts })),
            speaker: Speaker::new(
                Box::new(RecordingSynth {
                    spoken: Arc::clone(&spoken),
                }),
                Box::new(NullOutput),
                SpeechLimits::default(),
                Duration::from_secs(5),
            ),
            dispatcher: ResponseDispatcher::new(vec![Box::new(backend)]),
            phrasebook: Box::new(CuePhrasebook),
        };

        Self {
            engine: ConversationEngine::new(parts, test_settings()),
            spoken,
        }
    }

    /// Everything spoken so far
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

/// Default settings without the device retry pause
pub fn test_settings() -> ConversationSettings {
    ConversationSettings {
        device_retry_delay: Duration::ZERO,
        ..ConversationSettings::default()
    }
}
