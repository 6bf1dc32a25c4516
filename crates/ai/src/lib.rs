use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use mentorlink_config::AiConfig;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("AI provider is not configured")]
    NotConfigured,
    #[error("provider http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid provider response: {0}")]
    Response(#[from] serde_json::Error),
    #[error("provider returned no {0}")]
    EmptyResponse(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Anything that can answer chat prompts and embed text.
#[async_trait]
pub trait AiProvider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, AiError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError>;

    fn chat_model(&self) -> &str;
}

/// Client for any provider speaking the OpenAI `/chat/completions` and
/// `/embeddings` dialect (OpenRouter, OpenAI, local gateways).
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &AiConfig) -> Result<Self, AiError> {
        let api_key = config.resolved_api_key().ok_or(AiError::NotConfigured)?;

        let api_key_source = if config.api_key.is_some() {
            "config"
        } else {
            "env"
        };
        debug!(
            source = api_key_source,
            base_url = %config.base_url,
            "initialising AI provider"
        );

        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds.max(1)))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl AiProvider for OpenAiCompatibleClient {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, AiError> {
        let body = ChatCompletionRequest {
            model: &self.chat_model,
            messages,
        };

        let response = self
            .http
            .post(self.endpoint("chat/completions"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(AiError::EmptyResponse("completion"))?;

        debug!(model = %self.chat_model, chars = content.len(), "chat completion received");
        Ok(content)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        let body = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };

        let response = self
            .http
            .post(self.endpoint("embeddings"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let bytes = response.bytes().await?;
        let parsed: EmbeddingResponse = serde_json::from_slice(&bytes)?;

        let embedding = parsed
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(AiError::EmptyResponse("embedding"))?;

        debug!(model = %self.embedding_model, dimensions = embedding.len(), "embedding received");
        Ok(embedding)
    }

    fn chat_model(&self) -> &str {
        &self.chat_model
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingEntry>,
}

#[derive(Deserialize)]
struct EmbeddingEntry {
    embedding: Vec<f32>,
}

/// A SMART goal drafted by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalSuggestion {
    pub title: String,
    #[serde(default)]
    pub specific: Option<String>,
    #[serde(default)]
    pub measurable: Option<String>,
    #[serde(default)]
    pub achievable: Option<String>,
    #[serde(default)]
    pub relevant: Option<String>,
    #[serde(default)]
    pub time_bound: Option<String>,
}

pub const GOAL_SUGGESTION_INSTRUCTIONS: &str = "Reply only with a JSON array of up to three \
objects with the keys title, specific, measurable, achievable, relevant and time_bound. \
Each value is a short sentence.";

/// Build the prompt asking the model for SMART goal drafts.
pub fn goal_suggestion_messages(system_prompt: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{system_prompt}\n\n{GOAL_SUGGESTION_INSTRUCTIONS}")),
        ChatMessage::user(format!(
            "Suggest SMART goals for a mentee with this background:\n{context}"
        )),
    ]
}

/// Extract goal drafts from a model reply.
///
/// Models often wrap JSON in a markdown fence or add prose around it, so the
/// outermost `[...]` is parsed. Replies without a parsable array yield an
/// empty list.
///
/// ```
/// use mentorlink_ai::parse_goal_suggestions;
///
/// let reply = "```json\n[{\"title\": \"Ship a side project\"}]\n```";
/// let goals = parse_goal_suggestions(reply);
/// assert_eq!(goals.len(), 1);
/// assert_eq!(goals[0].title, "Ship a side project");
/// ```
pub fn parse_goal_suggestions(reply: &str) -> Vec<GoalSuggestion> {
    let (Some(start), Some(end)) = (reply.find('['), reply.rfind(']')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    match serde_json::from_str::<Vec<GoalSuggestion>>(&reply[start..=end]) {
        Ok(goals) => goals
            .into_iter()
            .filter(|goal| !goal.title.trim().is_empty())
            .collect(),
        Err(error) => {
            warn!(%error, "discarding unparsable goal suggestions");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn goal_suggestions_ignore_prose_and_blank_titles() {
        let reply = r#"Here you go:
[
  {"title": "Learn Rust", "measurable": "Finish 10 exercises"},
  {"title": "   "}
]
Good luck!"#;
        let goals = parse_goal_suggestions(reply);
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].measurable.as_deref(), Some("Finish 10 exercises"));
        assert!(goals[0].specific.is_none());
    }

    #[test]
    fn goal_suggestions_empty_without_array() {
        assert!(parse_goal_suggestions("no goals today").is_empty());
        assert!(parse_goal_suggestions("] backwards [").is_empty());
        assert!(parse_goal_suggestions("[not json]").is_empty());
    }

    #[test]
    fn goal_prompt_carries_system_prompt_and_context() {
        let messages = goal_suggestion_messages("Be kind.", "Backend developer");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.starts_with("Be kind."));
        assert!(messages[1].content.contains("Backend developer"));
    }

    #[test]
    fn from_config_requires_api_key() {
        std::env::remove_var(mentorlink_config::AI_API_KEY_ENV);
        let config = AiConfig::default();
        assert!(matches!(
            OpenAiCompatibleClient::from_config(&config),
            Err(AiError::NotConfigured)
        ));
    }
}
