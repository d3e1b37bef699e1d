/*
 * @file conversation.rs
 * @brief Conversation history and personalities for JASP
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

//! Conversation history and the active personality.

use serde::{Deserialize, Serialize};

/// Number of history entries sent with each request (three exchanges).
pub const DEFAULT_WINDOW: usize = 6;

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single chat message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// The built-in response styles that can be switched by voice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonalityKind {
    Casual,
    Normal,
    Formal,
}

impl PersonalityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Normal => "normal",
            Self::Formal => "formal",
        }
    }

    /// Whether this style turns on the serious-mode response prefix.
    pub fn is_serious(self) -> bool {
        self == Self::Formal
    }
}

/// A named system prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Personality {
    pub name: String,
    pub prompt: String,
}

impl Personality {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

/// Prompt texts for each [`PersonalityKind`], overridable from the config file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personalities {
    pub casual: String,
    pub normal: String,
    pub formal: String,
}

impl Default for Personalities {
    fn default() -> Self {
        Self {
            casual: "Você é JASP, assistente de um laboratório de programação e eletrônica. \
                     Fale de um jeito leve e descontraído, como um colega de bancada: frases \
                     curtas, expressões como 'beleza' e 'vamos lá', sem gírias pesadas nem \
                     palavrões. Responda sempre em português do Brasil."
                .to_string(),
            normal: "Você é JASP, assistente de um laboratório de programação e eletrônica. \
                     Fale como um desenvolvedor experiente: educado, direto e tranquilo. \
                     Explique de forma prática, como quem ajuda um colega. Responda sempre \
                     em português do Brasil."
                .to_string(),
            formal: "Você é JASP, um assistente técnico sério, calmo e confiável. Ajude com \
                     programação, eletrônica e dúvidas gerais de forma clara e objetiva, com \
                     linguagem profissional e exemplos simples. Quando a pergunta for confusa, \
                     peça esclarecimento. Responda sempre em português do Brasil."
                .to_string(),
        }
    }
}

impl Personalities {
    /// Builds the [`Personality`] for `kind`.
    pub fn get(&self, kind: PersonalityKind) -> Personality {
        let prompt = match kind {
            PersonalityKind::Casual => &self.casual,
            PersonalityKind::Normal => &self.normal,
            PersonalityKind::Formal => &self.formal,
        };
        Personality::new(kind.name(), prompt.clone())
    }
}

/// Rolling history plus the active personality.
///
/// The system prompt is never stored in the history; it is prepended by
/// [`ConversationContext::window`] when a request is built. Switching
/// personality always clears the history in the same call.
#[derive(Clone, Debug)]
pub struct ConversationContext {
    history: Vec<Message>,
    personality: Personality,
    window: usize,
}

impl ConversationContext {
    pub fn new(personality: Personality) -> Self {
        Self {
            history: Vec::new(),
            personality,
            window: DEFAULT_WINDOW,
        }
    }

    /// Overrides how many history entries [`ConversationContext::window`] keeps.
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window;
        self
    }

    /// Appends a user or assistant message.
    ///
    /// System messages are rejected; the prompt lives in the personality.
    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        if role == Role::System {
            tracing::warn!("ignoring system message appended to history");
            return;
        }
        self.history.push(Message::new(role, content));
    }

    /// Replaces the personality and clears the history.
    pub fn set_personality(&mut self, personality: Personality) {
        tracing::info!(personality = %personality.name, "switching personality");
        self.personality = personality;
        self.history.clear();
    }

    /// Empties the history, keeping the personality.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// `[system] + last N history entries`, ready to send.
    pub fn window(&self) -> Vec<Message> {
        let start = self.history.len().saturating_sub(self.window);
        let mut messages = Vec::with_capacity(self.history.len() - start + 1);
        messages.push(Message::system(self.personality.prompt.clone()));
        messages.extend_from_slice(&self.history[start..]);
        messages
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn personality(&self) -> &Personality {
        &self.personality
    }
}
