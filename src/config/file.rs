//! TOML configuration file loading
//!
//! Supports `~/.config/voicewake/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    /// Where memory and the interaction journal are kept
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub wake: WakeFileConfig,

    #[serde(default)]
    pub listen: ListenFileConfig,

    #[serde(default)]
    pub conversation: ConversationFileConfig,

    #[serde(default)]
    pub speech: SpeechFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub fast: FastFileConfig,

    #[serde(default)]
    pub agent: AgentFileConfig,

    #[serde(default)]
    pub history: HistoryFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Wake phrase configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Trigger phrases, in priority order
    pub phrases: Option<Vec<String>>,

    /// Longest utterance captured while idle
    pub phrase_limit_secs: Option<f64>,
}

/// Microphone and listen timing
#[derive(Debug, Default, Deserialize)]
pub struct ListenFileConfig {
    pub calibration_secs: Option<f64>,
    pub energy_floor: Option<f32>,
    pub energy_ceiling: Option<f32>,
    pub energy_ratio: Option<f32>,
    pub pause_secs: Option<f64>,
    pub command_timeout_secs: Option<f64>,
    pub command_phrase_limit_secs: Option<f64>,
    pub followup_timeout_secs: Option<f64>,
    pub followup_phrase_limit_secs: Option<f64>,
}

/// Conversation behaviour
#[derive(Debug, Default, Deserialize)]
pub struct ConversationFileConfig {
    /// Name used in the startup greeting
    pub assistant_name: Option<String>,

    /// Unproductive follow-up listens tolerated before the session ends
    pub max_retries: Option<u32>,

    /// Inline commands must be longer than this many characters
    pub inline_min_chars: Option<usize>,
}

/// Spoken output
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// "auto", "openai", "elevenlabs", "espeak" or "none"
    pub provider: Option<String>,
    pub voice: Option<String>,
    pub model: Option<String>,
    pub speed: Option<f32>,
    pub max_chars: Option<usize>,
    pub min_sentence_chars: Option<usize>,
    pub playback_timeout_secs: Option<f64>,
    pub espeak_binary: Option<String>,
}

/// Speech recognition
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "whisper" or "deepgram"
    pub provider: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<f64>,
}

/// Fast path (remote language model)
#[derive(Debug, Default, Deserialize)]
pub struct FastFileConfig {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

/// Slow path (local agent subprocess)
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub dir: Option<PathBuf>,
    pub to: Option<String>,
    pub timeout_secs: Option<f64>,
    /// The agent's own JSON settings file
    pub settings_path: Option<PathBuf>,
}

/// Short-term conversation history
#[derive(Debug, Default, Deserialize)]
pub struct HistoryFileConfig {
    pub capacity: Option<usize>,
    pub context_window: Option<usize>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub gemini: Option<String>,
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file
///
/// An explicit path must exist and parse. The standard path is optional:
/// returns `ConfigFile::default()` if it doesn't exist or can't be parsed.
///
/// # Errors
///
/// Returns error if an explicitly given file cannot be read or parsed
pub fn load_config_file(explicit: Option<&Path>) -> Result<ConfigFile> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let config = match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    };

    Ok(config)
}

/// Return the config file path: `~/.config/voicewake/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicewake").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_parses() {
        let config: ConfigFile = toml::from_str(
            r#"
            data_dir = "/tmp/voicewake"

            [wake]
            phrases = ["jarvis"]

            [listen]
            followup_timeout_secs = 4.5

            [api_keys]
            gemini = "AIza-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.wake.phrases, Some(vec!["jarvis".to_string()]));
        assert_eq!(config.listen.followup_timeout_secs, Some(4.5));
        assert_eq!(config.api_keys.gemini.as_deref(), Some("AIza-test"));
        assert!(config.fast.model.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_explicit_file_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[conversation]\nmax_retries = 3\n").unwrap();

        let config = load_config_file(Some(&path)).unwrap();
        assert_eq!(config.conversation.max_retries, Some(3));
    }
}
