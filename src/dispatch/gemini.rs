//! Fast path: Gemini `generateContent`

use async_trait::async_trait;
use chrono::{DateTime, Local};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{ReplyRequest, ReplySource, ResponseBackend};
use crate::config::FastConfig;
use crate::{Error, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: std::borrow::Cow<'a, str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl<'a> Content<'a> {
    fn text(role: Option<&'static str>, text: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

/// Direct remote language-model call, favoured for latency
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
    model: String,
    assistant_name: String,
    generation: GenerationConfig,
}

impl GeminiBackend {
    /// Create the fast-path backend
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(api_key: SecretString, config: &FastConfig, assistant_name: &str) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(config.timeout).build()?,
            api_key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            assistant_name: assistant_name.to_string(),
            generation: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                top_p: config.top_p,
            },
        })
    }

    /// System instruction for a request made at `now`
    #[must_use]
    pub fn system_instruction(&self, request: &ReplyRequest<'_>, now: DateTime<Local>) -> String {
        let mut prompt = format!(
            "You are {name}, a helpful voice assistant. Keep responses short and concise \
             (under 100 words). You are speaking out loud, so be conversational and natural. \
             Don't use markdown formatting.\n\nCurrent time: {time}\nCurrent date: {date}",
            name = self.assistant_name,
            time = now.format("%I:%M %p"),
            date = now.format("%A, %B %d, %Y"),
        );

        if let Some(memory) = request.memory {
            if let Some(name) = &memory.profile.name {
                prompt.push_str(&format!("\nUser's name: {name}"));
            }
            if let Some(nickname) = &memory.profile.nickname {
                prompt.push_str(&format!("\nAddress the user as: {nickname}"));
            }
            if !memory.facts.is_empty() {
                prompt.push_str("\nThings you remember about the user:");
                for fact in &memory.facts {
                    prompt.push_str(&format!("\n- {fact}"));
                }
            }
        }

        prompt
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl ResponseBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn source(&self) -> ReplySource {
        ReplySource::Fast
    }

    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
        let system = self.system_instruction(request, Local::now());

        let mut contents = Vec::with_capacity(request.recent_turns.len() * 2 + 1);
        for turn in request.recent_turns {
            let Some(response) = &turn.response else {
                continue;
            };
            contents.push(Content::text(Some("user"), turn.command.as_str()));
            contents.push(Content::text(Some("model"), response.as_str()));
        }
        contents.push(Content::text(Some("user"), request.command));

        let body = GenerateRequest {
            system_instruction: Content::text(None, system),
            contents,
            generation_config: self.generation,
        };

        tracing::debug!(
            model = %self.model,
            context_turns = request.recent_turns.len(),
            "fast path request"
        );

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Agent(format!("Gemini API error {status}: {body}")));
        }

        let parsed: GenerateResponse = response.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::Agent("Gemini returned no text".to_string()));
        }

        Ok(text.trim().to_string())
    }
}
