//! Message relay to an external chat-completion service.
//!
//! `POST /api/chatbot` takes `{"message": ...}` and answers `{"reply": ...}`.
//! The upstream speaks the OpenAI chat-completions format.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::config::ChatConfig;
use crate::error::AppError;

pub const FALLBACK_REPLY: &str = "Sorry, I didn't get that.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [CompletionMessage<'a>; 1],
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct ChatRelay {
    client: reqwest::Client,
    config: Option<ChatConfig>,
}

impl ChatRelay {
    pub fn new(config: Option<ChatConfig>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(chat) = &config {
            builder = builder.timeout(chat.timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Forward `message` upstream and return the first reply
    ///
    /// # Errors
    /// * `AppError::RelayDisabled` when no upstream is configured
    /// * `AppError::Relay` on transport failure or a non-success status
    pub async fn relay(&self, message: &str) -> Result<String, AppError> {
        let config = self.config.as_ref().ok_or(AppError::RelayDisabled)?;

        let body = CompletionRequest {
            model: &config.model,
            messages: [CompletionMessage {
                role: "user",
                content: message,
            }],
        };

        let response: CompletionResponse = self
            .client
            .post(&config.url)
            .bearer_auth(&config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let reply = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .filter(|content| !content.trim().is_empty());

        Ok(reply.unwrap_or_else(|| {
            debug!("Upstream returned no reply, using fallback");
            FALLBACK_REPLY.to_string()
        }))
    }
}

pub async fn handle_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let reply = state.relay.relay(message).await.inspect_err(|e| {
        warn!(error = %e, "Message relay failed");
    })?;

    Ok(Json(ChatResponse { reply }))
}
