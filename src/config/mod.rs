//! Configuration management for voicewake
//!
//! Precedence: CLI flag, then environment, then the TOML file, then defaults.

pub mod credentials;
pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use self::credentials::{AgentSettings, default_agent_settings_path, discover_gemini_key};
use self::file::ConfigFile;
use crate::voice::{SHORTENED_DISCLAIMER, SpeechLimits};
use crate::{Error, Result};

/// Resolved configuration
#[derive(Debug)]
pub struct Config {
    /// Memory store and interaction journal location
    pub data_dir: PathBuf,

    pub wake: WakeConfig,

    pub listen: ListenConfig,

    pub conversation: ConversationConfig,

    pub speech: SpeechConfig,

    pub stt: SttConfig,

    pub fast: FastConfig,

    pub agent: AgentConfig,

    pub history: HistoryConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Wake phrase configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Trigger phrases, in priority order
    pub phrases: Vec<String>,

    /// Longest utterance captured while idle
    pub phrase_limit: Duration,
}

/// Microphone calibration and listen timing
#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Ambient noise sampling time
    pub calibration: Duration,

    /// Lowest speech energy threshold
    pub energy_floor: f32,

    /// Highest speech energy threshold
    pub energy_ceiling: f32,

    /// Threshold as a multiple of ambient RMS
    pub energy_ratio: f32,

    /// Silence that ends an utterance
    pub pause: Duration,

    pub command_timeout: Duration,
    pub command_phrase_limit: Duration,
    pub followup_timeout: Duration,
    pub followup_phrase_limit: Duration,
}

/// Conversation behaviour
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Name used in the startup greeting
    pub assistant_name: String,

    /// Unproductive follow-up listens tolerated before the session ends
    pub max_retries: u32,

    /// Inline commands must be longer than this many characters
    pub inline_min_chars: usize,
}

/// Which synthesizer speaks replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsChoice {
    /// `OpenAI` when a key exists, else espeak
    Auto,
    OpenAi,
    ElevenLabs,
    Espeak,
    /// No audio; replies are only logged
    Muted,
}

impl std::str::FromStr for TtsChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" => Ok(Self::ElevenLabs),
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "none" | "muted" => Ok(Self::Muted),
            other => Err(Error::Config(format!("unknown speech provider: {other}"))),
        }
    }
}

/// Spoken output
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub provider: TtsChoice,

    /// Voice identifier, meaning depends on the provider
    pub voice: Option<String>,

    /// Hosted TTS model; each provider has its own default
    pub model: Option<String>,

    /// `OpenAI` speed multiplier (0.25 to 4.0)
    pub speed: f32,

    pub limits: SpeechLimits,

    /// Bound on one synthesize-and-play call
    pub playback_timeout: Duration,

    pub espeak_binary: String,
}

/// Which recognizer transcribes utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttChoice {
    Whisper,
    Deepgram,
}

impl std::str::FromStr for SttChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "whisper" | "openai" => Ok(Self::Whisper),
            "deepgram" => Ok(Self::Deepgram),
            other => Err(Error::Config(format!("unknown speech recognizer: {other}"))),
        }
    }
}

/// Speech recognition
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: SttChoice,
    /// Each provider has its own default
    pub model: Option<String>,
    pub timeout: Duration,
}

/// Fast path (remote language model)
#[derive(Debug, Clone)]
pub struct FastConfig {
    /// Disabled with `--no-fast` or `[fast] enabled = false`
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub timeout: Duration,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// Slow path (local agent subprocess)
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub program: String,
    pub args: Vec<String>,

    /// Working directory for the agent process
    pub dir: Option<PathBuf>,

    /// Destination passed with `--to`
    pub to: Option<String>,

    pub timeout: Duration,
}

/// Short-term conversation history
#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    /// Turns kept in memory
    pub capacity: usize,

    /// Answered turns sent as fast-path context
    pub context_window: usize,
}

/// API keys for external services
#[derive(Debug, Default)]
pub struct ApiKeys {
    /// Google Gemini key (fast path)
    pub gemini: Option<SecretString>,

    /// `OpenAI` key (Whisper and TTS)
    pub openai: Option<SecretString>,

    /// `ElevenLabs` key (optional TTS)
    pub elevenlabs: Option<SecretString>,

    /// `Deepgram` key (optional STT)
    pub deepgram: Option<SecretString>,
}

/// Settings given on the command line
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub wake_words: Vec<String>,
    pub agent_dir: Option<PathBuf>,
    pub to: Option<String>,
    pub voice: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub no_tts: bool,
    pub no_fast: bool,
}

impl Config {
    /// Load configuration from the process environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unusable or validation fails
    pub fn load(overrides: &CliOverrides) -> Result<Self> {
        let file = file::load_config_file(overrides.config_path.as_deref())?;
        let settings_path = file
            .agent
            .settings_path
            .clone()
            .unwrap_or_else(default_agent_settings_path);
        let settings = AgentSettings::load(&settings_path);

        Self::resolve(file, |name| std::env::var(name).ok(), &settings, overrides)
    }

    /// Combine every configuration source
    ///
    /// # Errors
    ///
    /// Returns error if a provider name is unknown or validation fails
    #[allow(clippy::too_many_lines)]
    pub fn resolve(
        fc: ConfigFile,
        lookup: impl Fn(&str) -> Option<String>,
        settings: &AgentSettings,
        overrides: &CliOverrides,
    ) -> Result<Self> {
        let env = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_keys = ApiKeys {
            gemini: discover_gemini_key(env("GEMINI_API_KEY"), fc.api_keys.gemini, settings),
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        let data_dir = overrides
            .data_dir
            .clone()
            .or_else(|| env("VOICEWAKE_DATA_DIR").map(PathBuf::from))
            .or(fc.data_dir)
            .unwrap_or_else(default_data_dir);

        let wake = WakeConfig {
            phrases: if overrides.wake_words.is_empty() {
                fc.wake.phrases.unwrap_or_else(default_wake_phrases)
            } else {
                overrides.wake_words.clone()
            },
            phrase_limit: secs(fc.wake.phrase_limit_secs, 3.0),
        };

        let listen = ListenConfig {
            calibration: secs(fc.listen.calibration_secs, 1.0),
            energy_floor: fc.listen.energy_floor.unwrap_or(0.01),
            energy_ceiling: fc.listen.energy_ceiling.unwrap_or(0.08),
            energy_ratio: fc.listen.energy_ratio.unwrap_or(2.0),
            pause: secs(fc.listen.pause_secs, 0.8),
            command_timeout: secs(fc.listen.command_timeout_secs, 6.0),
            command_phrase_limit: secs(fc.listen.command_phrase_limit_secs, 15.0),
            followup_timeout: secs(fc.listen.followup_timeout_secs, 8.0),
            followup_phrase_limit: secs(fc.listen.followup_phrase_limit_secs, 15.0),
        };

        let conversation = ConversationConfig {
            assistant_name: fc
                .conversation
                .assistant_name
                .unwrap_or_else(|| "Friday".to_string()),
            max_retries: fc.conversation.max_retries.unwrap_or(2),
            inline_min_chars: fc.conversation.inline_min_chars.unwrap_or(3),
        };

        let provider = if overrides.no_tts {
            TtsChoice::Muted
        } else {
            fc.speech.provider.as_deref().unwrap_or("auto").parse()?
        };

        let speech = SpeechConfig {
            provider,
            voice: overrides
                .voice
                .clone()
                .or_else(|| env("VOICEWAKE_VOICE"))
                .or(fc.speech.voice),
            model: fc.speech.model,
            speed: fc.speech.speed.unwrap_or(1.0),
            limits: SpeechLimits {
                max_chars: fc.speech.max_chars.unwrap_or(300),
                min_sentence_chars: fc.speech.min_sentence_chars.unwrap_or(150),
            },
            playback_timeout: secs(fc.speech.playback_timeout_secs, 60.0),
            espeak_binary: fc
                .speech
                .espeak_binary
                .unwrap_or_else(|| "espeak-ng".to_string()),
        };

        let stt = SttConfig {
            provider: fc.stt.provider.as_deref().unwrap_or("whisper").parse()?,
            model: fc.stt.model,
            timeout: secs(fc.stt.timeout_secs, 15.0),
        };

        let fast = FastConfig {
            enabled: !overrides.no_fast && fc.fast.enabled.unwrap_or(true),
            endpoint: fc
                .fast
                .endpoint
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: fc.fast.model.unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            timeout: secs(fc.fast.timeout_secs, 15.0),
            max_output_tokens: fc.fast.max_output_tokens.unwrap_or(150),
            temperature: fc.fast.temperature.unwrap_or(0.7),
            top_p: fc.fast.top_p.unwrap_or(0.9),
        };

        let agent = AgentConfig {
            program: fc.agent.program.unwrap_or_else(|| "node".to_string()),
            args: fc.agent.args.unwrap_or_else(|| {
                vec!["scripts/run-node.mjs".to_string(), "agent".to_string()]
            }),
            dir: overrides
                .agent_dir
                .clone()
                .or_else(|| env("VOICEWAKE_AGENT_DIR").map(PathBuf::from))
                .or(fc.agent.dir)
                .or_else(find_agent_dir),
            to: overrides
                .to
                .clone()
                .or_else(|| env("VOICEWAKE_AGENT_TO"))
                .or(fc.agent.to)
                .or_else(|| settings.default_destination()),
            timeout: secs(fc.agent.timeout_secs, 60.0),
        };

        let history = HistoryConfig {
            capacity: fc.history.capacity.unwrap_or(20),
            context_window: fc.history.context_window.unwrap_or(6),
        };

        let config = Self {
            data_dir,
            wake,
            listen,
            conversation,
            speech,
            stt,
            fast,
            agent,
            history,
            api_keys,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns error describing the first violated constraint
    pub fn validate(&self) -> Result<()> {
        if !self.wake.phrases.iter().any(|p| !p.trim().is_empty()) {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }
        if self.conversation.max_retries == 0 {
            return Err(Error::Config("conversation.max_retries must be at least 1".to_string()));
        }
        if self.listen.energy_floor > self.listen.energy_ceiling {
            return Err(Error::Config(format!(
                "listen.energy_floor ({}) exceeds listen.energy_ceiling ({})",
                self.listen.energy_floor, self.listen.energy_ceiling
            )));
        }
        let limits = self.speech.limits;
        let disclaimer = SHORTENED_DISCLAIMER.chars().count();
        if limits.max_chars <= limits.min_sentence_chars + disclaimer {
            return Err(Error::Config(format!(
                "speech.max_chars ({}) must exceed speech.min_sentence_chars ({}) plus the \
                 {disclaimer}-character shortening notice",
                limits.max_chars, limits.min_sentence_chars
            )));
        }
        if self.history.capacity == 0 {
            return Err(Error::Config("history.capacity must be at least 1".to_string()));
        }

        let timeouts = [
            ("wake.phrase_limit_secs", self.wake.phrase_limit),
            ("listen.calibration_secs", self.listen.calibration),
            ("listen.pause_secs", self.listen.pause),
            ("listen.command_timeout_secs", self.listen.command_timeout),
            ("listen.command_phrase_limit_secs", self.listen.command_phrase_limit),
            ("listen.followup_timeout_secs", self.listen.followup_timeout),
            ("listen.followup_phrase_limit_secs", self.listen.followup_phrase_limit),
            ("speech.playback_timeout_secs", self.speech.playback_timeout),
            ("stt.timeout_secs", self.stt.timeout),
            ("fast.timeout_secs", self.fast.timeout),
            ("agent.timeout_secs", self.agent.timeout),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::Config(format!("{name} must be positive")));
        }

        Ok(())
    }

    /// Path of the persisted memory store
    #[must_use]
    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory.json")
    }

    /// Path of the interaction journal
    #[must_use]
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("interactions.jsonl")
    }
}

fn default_wake_phrases() -> Vec<String> {
    ["friday", "hey friday", "ok friday"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// Return the data directory: `~/.local/share/voicewake` on Linux
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "voicewake")
        .map_or_else(|| PathBuf::from(".voicewake"), |d| d.data_dir().to_path_buf())
}

/// First conventional agent checkout that looks like a node project
fn find_agent_dir() -> Option<PathBuf> {
    let home = directories::BaseDirs::new()?.home_dir().to_path_buf();
    [home.join("friday")]
        .into_iter()
        .find(|p| is_node_project(p))
}

fn is_node_project(dir: &Path) -> bool {
    dir.join("package.json").exists()
}

/// Seconds from the file, or the default; negative and NaN become zero
fn secs(value: Option<f64>, default: f64) -> Duration {
    Duration::try_from_secs_f64(value.unwrap_or(default)).unwrap_or(Duration::ZERO)
}
