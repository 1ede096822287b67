//! Fast-path credential discovery
//!
//! The local agent keeps its own JSON settings file. Besides its provider
//! keys it records who the agent talks to, which becomes the default
//! destination for agent replies.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde_json::Value;

/// Prefix shared by Google AI Studio keys
const GOOGLE_KEY_PREFIX: &str = "AIza";

/// Parsed view of the agent's JSON settings file
#[derive(Debug, Default, Clone)]
pub struct AgentSettings {
    root: Value,
}

impl AgentSettings {
    /// Wrap an already parsed settings document
    #[must_use]
    pub const fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Read the settings file
    ///
    /// A missing or malformed file yields empty settings.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "agent settings not readable");
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(root) => Self { root },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "agent settings are not valid JSON");
                Self::default()
            }
        }
    }

    /// A Google language-model key recorded in the settings
    ///
    /// `providers.google.apiKey` wins; otherwise the first skill entry whose
    /// `apiKey` looks like a Google key.
    #[must_use]
    pub fn google_api_key(&self) -> Option<String> {
        let provider_key = self
            .root
            .pointer("/providers/google/apiKey")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty());

        if let Some(key) = provider_key {
            return Some(key.to_string());
        }

        self.root
            .pointer("/skills/entries")
            .and_then(Value::as_object)?
            .values()
            .filter_map(|entry| entry.get("apiKey").and_then(Value::as_str))
            .find(|key| key.starts_with(GOOGLE_KEY_PREFIX))
            .map(str::to_string)
    }

    /// First allowed WhatsApp sender, used as the agent destination
    #[must_use]
    pub fn default_destination(&self) -> Option<String> {
        self.root
            .pointer("/channels/whatsapp/allowFrom/0")
            .and_then(Value::as_str)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
    }
}

/// Default location of the agent settings file: `~/.friday/friday.json`
#[must_use]
pub fn default_agent_settings_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".friday/friday.json"),
        |d| d.home_dir().join(".friday").join("friday.json"),
    )
}

/// Discover the fast-path key
///
/// Order: environment, config file, agent settings. Empty values are skipped.
#[must_use]
pub fn discover_gemini_key(
    env_key: Option<String>,
    file_key: Option<String>,
    settings: &AgentSettings,
) -> Option<SecretString> {
    let (origin, key) = env_key
        .filter(|k| !k.trim().is_empty())
        .map(|k| ("environment", k))
        .or_else(|| {
            file_key
                .filter(|k| !k.trim().is_empty())
                .map(|k| ("config file", k))
        })
        .or_else(|| settings.google_api_key().map(|k| ("agent settings", k)))?;

    tracing::debug!(origin, "fast path key discovered");
    Some(SecretString::from(key))
}
