/*
 * @file error.rs
 * @brief Error types for JASP
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

//! Error types for the JASP runtime.
//!
//! Most of these never reach the caller of the voice loop: device errors
//! degrade the link to disconnected, backend errors become a spoken apology.
//! They exist so each layer can report *why* before it degrades.

use thiserror::Error;

/// Result type alias for JASP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the assistant.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No controller board matched the discovery keywords
    #[error("no matching serial device found")]
    NoDevice,

    /// Serial port error
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error (includes timeouts)
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Completion endpoint answered with a non-success status
    #[error("backend returned status {0}")]
    BackendStatus(u16),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid command pattern
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Microphone or speech-recognition error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech output error
    #[error("speech error: {0}")]
    Speech(String),
}
