//! Response Service
//!
//! Produces the persona's reply to a trainee turn. The live implementation
//! sends one chat-completion request to an OpenAI-compatible backend and turns
//! every failure into a polite in-conversation fallback; the scripted
//! implementation cycles through canned replies and never touches the network.

use crate::prompts::PromptResolver;
use async_openai::{
    Client,
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Sampling temperature used for every persona reply.
pub const TEMPERATURE: f32 = 0.7;
/// Upper bound on the length of a persona reply, in tokens.
pub const MAX_TOKENS: u32 = 500;

pub const AUTH_FALLBACK: &str =
    "Authentication error. Please check your API key in the .env file.";
pub const UNAVAILABLE_FALLBACK: &str =
    "Database connection error. The UF Navigator service may be temporarily unavailable.";
pub const NETWORK_FALLBACK: &str = "Network error. Please check your internet connection.";
pub const GENERIC_FALLBACK: &str =
    "I'm sorry, I'm having trouble responding right now. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry of the outbound conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A fully-built request for the chat backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: u32,
}

/// Identifies the backend for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInfo {
    pub model: String,
    pub base_url: String,
}

/// Raw failures reported by a chat backend, before classification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("401 Authentication required: no API key configured")]
    MissingApiKey,
    #[error("Network request failed: {0}")]
    Transport(String),
    #[error("{0}")]
    Api(String),
}

const AUTH_SIGNALS: &[&str] = &[
    "401",
    "authentication",
    "unauthorized",
    "invalid_api_key",
    "api key",
];
const UNAVAILABLE_SIGNALS: &[&str] = &["database server", "503", "unavailable", "overloaded"];
const NETWORK_SIGNALS: &[&str] = &["network", "fetch", "connection", "timed out"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classified failures of a turn's reply.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ResponseError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("no system prompt available: {0}")]
    PromptUnavailable(String),
    #[error("unexpected backend error: {0}")]
    Unknown(String),
}

impl ResponseError {
    /// Sorts a backend error into the taxonomy by its category and message.
    pub fn classify(err: &BackendError) -> Self {
        match err {
            BackendError::MissingApiKey => ResponseError::Auth(err.to_string()),
            BackendError::Transport(raw) => ResponseError::Network(raw.clone()),
            BackendError::Api(raw) => {
                let lowered = raw.to_lowercase();
                if contains_any(&lowered, AUTH_SIGNALS) {
                    ResponseError::Auth(raw.clone())
                } else if contains_any(&lowered, UNAVAILABLE_SIGNALS) {
                    ResponseError::ServiceUnavailable(raw.clone())
                } else if contains_any(&lowered, NETWORK_SIGNALS) {
                    ResponseError::Network(raw.clone())
                } else {
                    ResponseError::Unknown(raw.clone())
                }
            }
        }
    }

    /// The trainee-visible text substituted for the persona's reply.
    pub fn fallback_message(&self) -> &'static str {
        match self {
            ResponseError::Auth(_) => AUTH_FALLBACK,
            ResponseError::ServiceUnavailable(_) => UNAVAILABLE_FALLBACK,
            ResponseError::Network(_) => NETWORK_FALLBACK,
            ResponseError::EmptyResponse
            | ResponseError::PromptUnavailable(_)
            | ResponseError::Unknown(_) => GENERIC_FALLBACK,
        }
    }
}

/// The outcome of one reply request. `error` is set when `content` is a fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub content: String,
    pub error: Option<ResponseError>,
}

impl ChatReply {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            error: None,
        }
    }

    pub fn fallback(error: ResponseError) -> Self {
        Self {
            content: error.fallback_message().to_string(),
            error: Some(error),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// A transport to a chat-completion endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issues one request and returns the first choice's text, if any.
    async fn create(&self, request: CompletionRequest) -> Result<Option<String>, BackendError>;

    fn info(&self) -> BackendInfo;
}

/// Produces the persona's reply for a trainee turn. Never fails: errors
/// become fallback replies.
#[async_trait]
pub trait ResponseService: Send + Sync {
    async fn complete(
        &self,
        history: &[ChatMessage],
        new_user_text: &str,
        scenario_id: &str,
    ) -> ChatReply;
}

/// A `ChatBackend` for any OpenAI-compatible API.
pub struct OpenAICompatibleBackend {
    client: Option<Client<OpenAIConfig>>,
    info: BackendInfo,
}

impl OpenAICompatibleBackend {
    /// Creates a backend for the given endpoint.
    ///
    /// A missing `api_key` is not an error here; requests fail with
    /// `BackendError::MissingApiKey` when they are made.
    ///
    /// Retries are disabled: every call is exactly one HTTP request, and a
    /// 429 or 5xx comes straight back as an error.
    pub fn new(api_key: Option<String>, base_url: String, model: String) -> Self {
        let client = api_key.map(|key| {
            Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(key)
                    .with_api_base(base_url.clone()),
            )
            .with_backoff(no_retry())
        });
        Self {
            client,
            info: BackendInfo { model, base_url },
        }
    }

    fn to_openai(message: &ChatMessage) -> Result<ChatCompletionRequestMessage, OpenAIError> {
        let content = message.content.clone();
        Ok(match message.role {
            ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        })
    }
}

/// A backoff policy that gives up after the first failure.
fn no_retry() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

impl From<OpenAIError> for BackendError {
    fn from(err: OpenAIError) -> Self {
        match err {
            OpenAIError::Reqwest(e) => BackendError::Transport(e.to_string()),
            other => BackendError::Api(other.to_string()),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAICompatibleBackend {
    async fn create(&self, request: CompletionRequest) -> Result<Option<String>, BackendError> {
        let client = self.client.as_ref().ok_or(BackendError::MissingApiKey)?;

        let messages = request
            .messages
            .iter()
            .map(Self::to_openai)
            .collect::<Result<Vec<_>, _>>()?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.info.model).messages(messages);
        #[allow(deprecated)]
        args.max_tokens(request.max_tokens);
        if let Some(temperature) = request.temperature {
            args.temperature(temperature);
        }

        let response = client.chat().create(args.build()?).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }

    fn info(&self) -> BackendInfo {
        self.info.clone()
    }
}

/// Builds the outbound sequence: instruction, prior turns, then the new turn.
pub fn build_messages(
    system_prompt: String,
    history: &[ChatMessage],
    new_user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::new(ChatRole::System, system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(ChatMessage::new(ChatRole::User, new_user_text));
    messages
}

/// The `ResponseService` backed by a real chat-completion endpoint.
pub struct LiveResponder {
    backend: Arc<dyn ChatBackend>,
    prompts: Arc<dyn PromptResolver>,
}

impl LiveResponder {
    pub fn new(backend: Arc<dyn ChatBackend>, prompts: Arc<dyn PromptResolver>) -> Self {
        Self { backend, prompts }
    }
}

#[async_trait]
impl ResponseService for LiveResponder {
    #[instrument(name = "persona_reply", skip_all, fields(%scenario_id, history_len = history.len()))]
    async fn complete(
        &self,
        history: &[ChatMessage],
        new_user_text: &str,
        scenario_id: &str,
    ) -> ChatReply {
        let system_prompt = match self.prompts.resolve(scenario_id) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(error = %e, "Cannot resolve system prompt; skipping backend call");
                return ChatReply::fallback(ResponseError::PromptUnavailable(e.to_string()));
            }
        };

        let request = CompletionRequest {
            messages: build_messages(system_prompt, history, new_user_text),
            temperature: Some(TEMPERATURE),
            max_tokens: MAX_TOKENS,
        };

        let error = match self.backend.create(request).await {
            Ok(Some(content)) if !content.trim().is_empty() => {
                info!(reply_len = content.len(), "Received persona reply");
                return ChatReply::success(content);
            }
            Ok(_) => ResponseError::EmptyResponse,
            Err(e) => {
                error!(error = %e, "Chat backend request failed");
                ResponseError::classify(&e)
            }
        };
        warn!(kind = ?error, "Substituting fallback reply");
        ChatReply::fallback(error)
    }
}

/// A `ResponseService` that cycles through canned persona replies.
pub struct ScriptedResponder {
    replies: Vec<String>,
    cursor: AtomicUsize,
    delay: Duration,
}

impl ScriptedResponder {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            cursor: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Waits this long before each reply, to mimic backend latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for ScriptedResponder {
    fn default() -> Self {
        Self::new(vec![
            "I appreciate you taking the time to explain that. But I'm still worried about the side effects I've read about online...".into(),
            "That makes sense, but my child is still so young. Do they really need this vaccine now?".into(),
            "I understand what you're saying, but I've heard that this vaccine might not be necessary if my child isn't sexually active yet.".into(),
            "Thank you for listening to my concerns. Can you tell me more about how this vaccine actually works?".into(),
        ])
        .with_delay(Duration::from_millis(1500))
    }
}

#[async_trait]
impl ResponseService for ScriptedResponder {
    async fn complete(
        &self,
        _history: &[ChatMessage],
        _new_user_text: &str,
        _scenario_id: &str,
    ) -> ChatReply {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.replies.is_empty() {
            return ChatReply::fallback(ResponseError::EmptyResponse);
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.replies.len();
        ChatReply::success(self.replies[idx].clone())
    }
}
