/*
 * @file chat.rs
 * @brief Ollama chat backend for JASP
 * @author Kevin Thomas
 * @date 2025
 *
 * MIT License
 *
 * Copyright (c) 2025 Kevin Thomas
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy
 * of this software and associated documentation files (the "Software"), to deal
 * in the Software without restriction, including without limitation the rights
 * to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
 * copies of the Software, and to permit persons to whom the Software is
 * furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all
 * copies or substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
 * FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
 * AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
 * LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
 * SOFTWARE.
 */

//! Chat completion backend.
//!
//! The backend itself reports errors; [`complete`] and
//! [`complete_with_context`] turn any failure into [`APOLOGY`] so the voice
//! loop always has something to say.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::{ConversationContext, Message, Role};
use crate::error::{Error, Result};

/// Spoken when the completion service fails or times out.
pub const APOLOGY: &str = "Desculpe, não consegui processar sua solicitação.";

/// Default Ollama endpoint base URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default model name.
pub const DEFAULT_MODEL: &str = "mistral";

/// Default completion timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A remote chat-completion service.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Sends a prepared window (system entry first) and returns the reply text.
    async fn send(&self, window: &[Message]) -> Result<String>;
}

/// Request structure for Ollama's `/api/chat`.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    temperature: f32,
}

/// Response structure for Ollama's `/api/chat`.
#[derive(Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

/// [`ChatBackend`] for a local or remote Ollama server.
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaBackend {
    /// Creates a backend with a bounded request timeout.
    ///
    /// # Arguments
    /// * `base_url` - Server root, e.g. `http://localhost:11434`.
    /// * `model` - Model name to request.
    /// * `temperature` - Sampling temperature.
    /// * `timeout` - Upper bound on each request, connect included.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", base_url.trim_end_matches('/')),
            model: model.into(),
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatBackend for OllamaBackend {
    async fn send(&self, window: &[Message]) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: window,
            stream: false,
            temperature: self.temperature,
        };
        tracing::debug!(model = %self.model, messages = window.len(), "sending chat request");
        let response = self.client.post(&self.endpoint).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::BackendStatus(status.as_u16()));
        }
        let body: ChatResponse = response.json().await?;
        Ok(body.message.content)
    }
}

/// Records `user_text`, asks the backend, and records the reply.
///
/// # Details
/// The user message is kept even when the request fails; the assistant
/// reply is appended only on success. Failures are logged and answered
/// with [`APOLOGY`].
pub async fn complete(
    backend: &dyn ChatBackend,
    context: &mut ConversationContext,
    user_text: &str,
) -> String {
    context.append(Role::User, user_text);
    let window = context.window();
    match backend.send(&window).await {
        Ok(reply) if !reply.trim().is_empty() => {
            context.append(Role::Assistant, reply.as_str());
            reply
        }
        Ok(_) => {
            tracing::warn!("completion returned an empty reply");
            APOLOGY.to_string()
        }
        Err(err) => {
            tracing::warn!(error = %err, "completion failed");
            APOLOGY.to_string()
        }
    }
}

/// Builds the single user message that carries retrieved web text.
pub fn context_message(utterance: &str, retrieved: &str) -> String {
    format!(
        "Use as informações abaixo, extraídas da internet, para responder.\n\n\
         INFORMAÇÕES DA WEB:\n{retrieved}\n\n\
         PERGUNTA DO USUÁRIO:\n{utterance}\n\n\
         Responda em português do Brasil, curto e direto."
    )
}

/// Like [`complete`], with retrieved text embedded in the user message.
pub async fn complete_with_context(
    backend: &dyn ChatBackend,
    context: &mut ConversationContext,
    utterance: &str,
    retrieved: &str,
) -> String {
    complete(backend, context, &context_message(utterance, retrieved)).await
}
