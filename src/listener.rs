/*
 * @file listener.rs
 * @brief Utterance sources for JASP
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

//! Utterance acquisition.
//!
//! Speech recognition is an external capability; the loop only needs
//! something that produces one decoded utterance per call.

use std::io::Write;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::error::Result;

/// What a single listen call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Heard {
    /// Recognized text for one turn.
    Utterance(String),
    /// Nothing recognizable (silence, noise); listen again.
    Nothing,
    /// The input source is gone; the loop should shut down.
    Closed,
}

/// Source of utterances.
#[async_trait]
pub trait Listener: Send {
    /// Waits for the next utterance.
    ///
    /// # Errors
    /// Returns an error when capture or recognition fails for this turn.
    async fn listen(&mut self) -> Result<Heard>;

    /// Releases the underlying recognizer resources.
    fn stop(&mut self) {}
}

/// Reads one utterance per line, e.g. typed on stdin.
pub struct ConsoleListener<R> {
    lines: Lines<R>,
    prompt: bool,
}

impl ConsoleListener<BufReader<Stdin>> {
    /// Listens on the process's standard input, printing a `> ` prompt.
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
            prompt: true,
        }
    }
}

impl<R> ConsoleListener<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    /// Listens on an arbitrary line source without prompting.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            prompt: false,
        }
    }
}

#[async_trait]
impl<R> Listener for ConsoleListener<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn listen(&mut self) -> Result<Heard> {
        if self.prompt {
            print!("> ");
            std::io::stdout().flush()?;
        }
        Ok(match self.lines.next_line().await? {
            Some(line) => Heard::Utterance(line),
            None => Heard::Closed,
        })
    }
}
