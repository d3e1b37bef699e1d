/*
 * @file lib.rs
 * @brief JASP library root
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

//! JASP - a voice assistant for the electronics bench.
//!
//! Recognized speech is either handled locally (lights, temperature sensor,
//! history, personality) through an ordered command table, or forwarded to a
//! local Ollama model, optionally with a web lookup for time-sensitive
//! questions. Replies are spoken back before the next listen starts. The
//! controller board is optional: losing it only disables hardware commands.
//!
//! # Example
//! ```no_run
//! use jasp::assistant::Assistant;
//! use jasp::chat::{OllamaBackend, DEFAULT_MODEL, DEFAULT_OLLAMA_URL, DEFAULT_TIMEOUT};
//! use jasp::conversation::{ConversationContext, Personalities, PersonalityKind};
//! use jasp::device::{DeviceLink, KeywordMatcher};
//! use jasp::handlers::{build_router, Session};
//! use jasp::listener::ConsoleListener;
//! use jasp::speech::CommandSpeaker;
//!
//! #[tokio::main]
//! async fn main() -> jasp::Result<()> {
//!     let mut device = DeviceLink::new();
//!     device.connect(None, 9600, &KeywordMatcher::default());
//!     let context = ConversationContext::new(Personalities::default().get(PersonalityKind::Normal));
//!     let session = Session::new(device, context, Box::new(CommandSpeaker::platform_default()));
//!     let backend = OllamaBackend::new(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, 0.7, DEFAULT_TIMEOUT)?;
//!     Assistant::new(session, build_router(&[])?, Box::new(backend), Box::new(ConsoleListener::stdin()))
//!         .run(Box::pin(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         }))
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod assistant;
#[cfg(feature = "voice")]
pub mod audio;
pub mod chat;
pub mod commands;
pub mod config;
pub mod conversation;
pub mod device;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod retrieval;
pub mod speech;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
