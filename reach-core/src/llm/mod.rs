use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::{GeneratorSection, ReplySection};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("generator error: {0}")]
    Handler(String),
    #[error("environment variable {0} is not set")]
    MissingKey(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiTextGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            max_tokens,
        }
    }

    /// Builds a client from config, reading the key from the configured
    /// environment variable.
    pub fn from_section(section: &GeneratorSection) -> Result<Self, LlmError> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| LlmError::MissingKey(section.api_key_env.clone()))?;
        Ok(Self::new(
            section.endpoint.clone(),
            section.model.clone(),
            api_key,
            section.max_tokens,
        ))
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.max_tokens,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LlmError::Handler(format!(
                "unexpected status {}",
                response.status()
            )));
        }
        let body = response.json::<ChatResponse>().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Handler("response carried no choices".into()))
    }
}

/// Produces reply text: a fixed text when given, otherwise generated text,
/// otherwise the configured fallback.
#[derive(Clone)]
pub struct ReplyComposer {
    fixed: Option<String>,
    generator: Option<Arc<dyn TextGenerator>>,
    template: String,
    max_prompt_chars: usize,
    fallback: String,
    deadline: Duration,
}

impl std::fmt::Debug for ReplyComposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyComposer")
            .field("fixed", &self.fixed)
            .field("generator", &self.generator.is_some())
            .field("fallback", &self.fallback)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl ReplyComposer {
    pub fn new(section: &ReplySection, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        let deadline = section
            .generator
            .as_ref()
            .map(|generator| Duration::from_secs(generator.timeout_seconds))
            .unwrap_or(Duration::from_secs(20));
        Self {
            fixed: None,
            generator,
            template: section.prompt_template.clone(),
            max_prompt_chars: section.max_prompt_chars,
            fallback: section.fallback_text.clone(),
            deadline,
        }
    }

    /// A composer that always answers with `text`.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            fixed: Some(text.clone()),
            generator: None,
            template: "{content}".into(),
            max_prompt_chars: 0,
            fallback: text,
            deadline: Duration::ZERO,
        }
    }

    pub fn with_fixed(mut self, text: Option<String>) -> Self {
        self.fixed = text.filter(|text| !text.trim().is_empty());
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn prompt_for(&self, content: &str) -> String {
        let content: String = content.trim().chars().take(self.max_prompt_chars).collect();
        self.template.replace("{content}", &content)
    }

    pub async fn compose(&self, content: &str) -> String {
        if let Some(fixed) = &self.fixed {
            return fixed.clone();
        }
        let Some(generator) = &self.generator else {
            return self.fallback.clone();
        };
        let prompt = self.prompt_for(content);
        match timeout(self.deadline, generator.generate(&prompt)).await {
            Ok(Ok(text)) => {
                let cleaned = clean(&text);
                if cleaned.is_empty() {
                    debug!(target: "llm", "generator returned empty text");
                    self.fallback.clone()
                } else {
                    cleaned
                }
            }
            Ok(Err(err)) => {
                warn!(target: "llm", "generator error: {err}");
                self.fallback.clone()
            }
            Err(_) => {
                warn!(target: "llm", "timeout after {:?}", self.deadline);
                self.fallback.clone()
            }
        }
    }
}

fn clean(text: &str) -> String {
    text.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .to_string()
}
