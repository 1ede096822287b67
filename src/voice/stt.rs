//! Speech-to-text (STT) processing

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local};

use super::capture::AudioSample;
use crate::{Error, Result};

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Response from Deepgram transcription API
#[derive(serde::Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(serde::Deserialize)]
struct DeepgramResults {
    channels: Vec<DeepgramChannel>,
}

#[derive(serde::Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(serde::Deserialize)]
struct DeepgramAlternative {
    transcript: String,
}

/// A speech recognition capability: WAV audio in, best-effort text out
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Recognize speech in WAV audio
    ///
    /// An empty string means nothing intelligible was heard.
    ///
    /// # Errors
    ///
    /// Returns error if the recognition service cannot be reached
    async fn recognize(&self, wav: &[u8]) -> Result<String>;
}

/// STT provider backend
#[derive(Clone, Copy, Debug)]
enum SttProvider {
    Whisper,
    Deepgram,
}

/// Transcribes speech to text via a hosted API
pub struct SpeechToText {
    client: reqwest::Client,
    api_key: String,
    model: String,
    provider: SttProvider,
    base_url: String,
}

impl SpeechToText {
    /// Create a new STT instance using `OpenAI` Whisper
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the client cannot be built
    pub fn new_whisper(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for Whisper".to_string(),
            ));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
            provider: SttProvider::Whisper,
            base_url: "https://api.openai.com".to_string(),
        })
    }

    /// Create a new STT instance using Deepgram
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing or the client cannot be built
    pub fn new_deepgram(api_key: String, model: String, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Deepgram API key required".to_string()));
        }

        Ok(Self {
            client: http_client(timeout)?,
            api_key,
            model,
            provider: SttProvider::Deepgram,
            base_url: "https://api.deepgram.com".to_string(),
        })
    }

    /// Point the client at a different API host
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Transcribe using OpenAI Whisper
    async fn transcribe_whisper(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Whisper transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.model.clone());

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Whisper API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await?;
        Ok(result.text)
    }

    /// Transcribe using Deepgram
    async fn transcribe_deepgram(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting Deepgram transcription");

        let url = format!(
            "{}/v1/listen?model={}&punctuate=true",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Stt(format!("Deepgram API error {status}: {body}")));
        }

        let result: DeepgramResponse = response.json().await?;

        Ok(result
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first())
            .map(|a| a.transcript.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl SpeechRecognizer for SpeechToText {
    async fn recognize(&self, wav: &[u8]) -> Result<String> {
        match self.provider {
            SttProvider::Whisper => self.transcribe_whisper(wav).await,
            SttProvider::Deepgram => self.transcribe_deepgram(wav).await,
        }
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Recognized speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    /// Raw recognized text, trimmed
    pub text: String,
    /// When the recognition completed
    pub heard_at: DateTime<Local>,
}

impl Transcript {
    /// Create a transcript stamped with the current time
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            heard_at: Local::now(),
        }
    }

    /// Lowercased text with surrounding whitespace and punctuation removed
    ///
    /// Used for exact phrase comparisons ("Thanks." == "thanks").
    #[must_use]
    pub fn normalized(&self) -> String {
        self.text
            .trim()
            .trim_matches(|c: char| matches!(c, '.' | ',' | '!' | '?'))
            .trim()
            .to_lowercase()
    }
}

/// Outcome of transcribing one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// Speech was understood
    Heard(Transcript),
    /// Nothing intelligible (noise, partial words)
    NoMatch,
    /// The recognition service failed
    ServiceError(String),
}

impl Recognition {
    /// The transcript, if any; service errors count as misses
    #[must_use]
    pub fn into_transcript(self) -> Option<Transcript> {
        match self {
            Self::Heard(t) => Some(t),
            Self::NoMatch | Self::ServiceError(_) => None,
        }
    }
}

/// Turns captured audio into transcripts, never failing the caller
pub struct Transcriber {
    recognizer: Box<dyn SpeechRecognizer>,
}

impl Transcriber {
    /// Wrap a recognition capability
    #[must_use]
    pub fn new(recognizer: Box<dyn SpeechRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Transcribe an utterance
    pub async fn transcribe(&self, sample: &AudioSample) -> Recognition {
        let wav = match sample.to_wav() {
            Ok(wav) => wav,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode utterance");
                return Recognition::ServiceError(e.to_string());
            }
        };

        match self.recognizer.recognize(&wav).await {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    tracing::debug!("no speech recognized");
                    Recognition::NoMatch
                } else {
                    tracing::debug!(transcript = %text, "transcribed");
                    Recognition::Heard(Transcript::new(text))
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "speech recognition service error");
                Recognition::ServiceError(e.to_string())
            }
        }
    }
}
